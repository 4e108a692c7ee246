//! Handler Registry
//!
//! Static table from [`HandlerId`] to a constructor function. The table is
//! filled once at startup and only read afterwards, so one `Arc` of it is
//! shared by every connection without locking.

use crate::handlers::not_found::NotFound;
use crate::handlers::tokens::{TokenExpire, TokenIssue, TokenVerify};
use crate::handlers::users::UserInfo;
use crate::handlers::ApiHandler;
use crate::request::RequestContext;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifies one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerId {
    TokenIssue,
    TokenExpire,
    TokenVerify,
    Users,
    NotFound,
}

impl HandlerId {
    pub const ALL: [HandlerId; 5] = [
        HandlerId::TokenIssue,
        HandlerId::TokenExpire,
        HandlerId::TokenVerify,
        HandlerId::Users,
        HandlerId::NotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerId::TokenIssue => "tokenIssue",
            HandlerId::TokenExpire => "tokenExpire",
            HandlerId::TokenVerify => "tokenVerify",
            HandlerId::Users => "users",
            HandlerId::NotFound => "notFound",
        }
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a handler bound to one request's context.
pub type HandlerFactory = fn(RequestContext) -> Box<dyn ApiHandler>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no handler registered for '{0}'")]
    Unregistered(HandlerId),
}

/// A handler constructed for exactly one request.
pub struct HandlerInstance {
    id: HandlerId,
    handler: Box<dyn ApiHandler>,
}

impl HandlerInstance {
    pub fn new(id: HandlerId, handler: Box<dyn ApiHandler>) -> Self {
        Self { id, handler }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn handler(&self) -> &dyn ApiHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance").field("id", &self.id).finish()
    }
}

/// Route identifier to constructor table.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<HandlerId, HandlerFactory>,
}

impl HandlerRegistry {
    /// An empty registry. Every lookup falls back to `notFound`.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in handler.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(HandlerId::TokenIssue, TokenIssue::boxed)
            .register(HandlerId::TokenExpire, TokenExpire::boxed)
            .register(HandlerId::TokenVerify, TokenVerify::boxed)
            .register(HandlerId::Users, UserInfo::boxed)
            .register(HandlerId::NotFound, NotFound::boxed);
        registry
    }

    /// Registers (or replaces) the constructor for `id`.
    pub fn register(&mut self, id: HandlerId, factory: HandlerFactory) -> &mut Self {
        self.factories.insert(id, factory);
        self
    }

    pub fn lookup(&self, id: HandlerId) -> Result<HandlerFactory, RegistryError> {
        self.factories
            .get(&id)
            .copied()
            .ok_or(RegistryError::Unregistered(id))
    }

    /// Constructs the not-found handler. Never fails: without a registered
    /// constructor the built-in one is used.
    pub fn not_found(&self, context: RequestContext) -> HandlerInstance {
        let factory = self
            .lookup(HandlerId::NotFound)
            .unwrap_or(NotFound::boxed as HandlerFactory);
        HandlerInstance::new(HandlerId::NotFound, factory(context))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
