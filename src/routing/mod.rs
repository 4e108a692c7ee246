//! Request routing.
//!
//! Maps each complete request to the handler that answers it.

pub mod dispatcher;

pub use dispatcher::{resolve, Dispatcher, RouteKey};
