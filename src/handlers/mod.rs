//! API Handlers
//!
//! A handler is the pluggable unit that implements one API. Every handler goes
//! through the same fixed lifecycle, run by [`executor::execute`]:
//!
//! ```text
//!  ┌──────────────┐ ok  ┌─────────────┐      ┌──────────────┐
//!  │  validate()  │────>│  execute()  │─────>│  ApiResult   │
//!  └──────┬───────┘     └──────┬──────┘      └──────────────┘
//!         │ Err                │ Err                 ▲
//!         └─> resultCode 405   └─> resultCode 501 ───┘
//! ```
//!
//! Handlers implement two small capability traits:
//!
//! - [`Validate`]: checks the request fields the handler needs (defaults to
//!   accepting everything)
//! - [`Execute`]: the business logic, writing fields into the result
//!
//! Instances are built per request by the [`registry::HandlerRegistry`],
//! bound to that request's context, and dropped once the response is written.
//!
//! ## Handlers
//!
//! | Id | Route | Required fields |
//! |---|---|---|
//! | `tokenIssue` | `POST /tokens` | `userNo`, `password` |
//! | `tokenVerify` | `GET /tokens` | `token` |
//! | `tokenExpire` | `DELETE /tokens` | `token` |
//! | `users` | `* /users` | `email` |
//! | `notFound` | everything else | none |

pub mod executor;
pub mod not_found;
pub mod registry;
pub mod result;
pub mod tokens;
pub mod users;

use thiserror::Error;

pub use executor::execute;
pub use registry::{HandlerFactory, HandlerId, HandlerInstance, HandlerRegistry, RegistryError};
pub use result::{result_code, ApiResult, MESSAGE, RESULT_CODE};

/// A required request field is missing or malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid request parameter: {0}")]
pub struct RequestParamError(pub String);

impl RequestParamError {
    pub fn missing(field: &str) -> Self {
        Self(format!("'{}' is required", field))
    }
}

/// A handler's business logic could not complete.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("service failed: {0}")]
pub struct ServiceError(pub String);

/// Parameter validation capability.
pub trait Validate {
    /// Checks the request fields this handler depends on.
    fn validate(&self) -> Result<(), RequestParamError> {
        Ok(())
    }
}

/// Business logic capability.
pub trait Execute {
    /// Runs the handler, writing its output into `result`.
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError>;
}

/// A complete handler: validation plus business logic.
pub trait ApiHandler: Validate + Execute + Send {}

impl<T: Validate + Execute + Send> ApiHandler for T {}
