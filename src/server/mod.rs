//! Server startup: listeners, accept tasks and TLS.
//!
//! ```text
//!   plaintext port ──> acceptor tasks ──┐
//!                                       ├──> one task per connection
//!   TLS port ───────> acceptor tasks ───┘    (shared worker runtime)
//! ```

pub mod listener;
pub mod tls;

pub use listener::{bind, spawn_listener};
pub use tls::{acceptor_from_parts, load_tls_acceptor, self_signed_acceptor, self_signed_identity};
