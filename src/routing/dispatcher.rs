//! Route Dispatcher
//!
//! Resolves a [`RequestContext`] to a handler id and constructs the handler.
//!
//! ## Route Table
//!
//! Rules are checked in order; the first whose prefix matches wins.
//!
//! | Prefix | Method | Handler |
//! |---|---|---|
//! | `/tokens` | `POST` | `tokenIssue` |
//! | `/tokens` | `DELETE` | `tokenExpire` |
//! | `/tokens` | `GET` | `tokenVerify` |
//! | `/tokens` | other | `notFound` |
//! | `/users` | any | `users` |
//! | anything else | | `notFound` |
//!
//! Prefix matching is a plain string prefix test on the raw request target,
//! query string included. Methods are matched case-sensitively.

use crate::handlers::{HandlerId, HandlerInstance, HandlerRegistry};
use crate::request::RequestContext;
use std::sync::Arc;
use tracing::{debug, warn};

/// The `(method, path)` pair a request is routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteKey<'a> {
    pub method: Option<&'a str>,
    pub path: &'a str,
}

impl<'a> RouteKey<'a> {
    /// Builds the key from a context. `None` if the request target is absent.
    pub fn from_context(context: &'a RequestContext) -> Option<Self> {
        Some(Self {
            method: context.method(),
            path: context.uri()?,
        })
    }
}

/// How a matched prefix picks its handler.
enum Target {
    /// Any method.
    Any(HandlerId),
    /// By exact method; anything unlisted is `notFound`.
    ByMethod(&'static [(&'static str, HandlerId)]),
}

struct Rule {
    prefix: &'static str,
    target: Target,
}

const ROUTES: &[Rule] = &[
    Rule {
        prefix: "/tokens",
        target: Target::ByMethod(&[
            ("POST", HandlerId::TokenIssue),
            ("DELETE", HandlerId::TokenExpire),
            ("GET", HandlerId::TokenVerify),
        ]),
    },
    Rule {
        prefix: "/users",
        target: Target::Any(HandlerId::Users),
    },
];

/// Maps a route key to a handler id. Total: every key resolves.
pub fn resolve(key: Option<RouteKey<'_>>) -> HandlerId {
    let Some(key) = key else {
        return HandlerId::NotFound;
    };

    let Some(rule) = ROUTES.iter().find(|rule| key.path.starts_with(rule.prefix)) else {
        return HandlerId::NotFound;
    };

    match &rule.target {
        Target::Any(id) => *id,
        Target::ByMethod(methods) => key
            .method
            .and_then(|method| methods.iter().find(|(m, _)| *m == method))
            .map(|(_, id)| *id)
            .unwrap_or(HandlerId::NotFound),
    }
}

/// Routes complete requests to freshly constructed handlers.
///
/// Cheap to clone; every connection holds its own copy sharing one registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Resolves and constructs the handler for `context`.
    ///
    /// Never fails: a handler id without a registered constructor falls back
    /// to `notFound`.
    pub fn dispatch(&self, context: RequestContext) -> HandlerInstance {
        let id = resolve(RouteKey::from_context(&context));
        debug!(
            handler = %id,
            method = context.method().unwrap_or("-"),
            uri = context.uri().unwrap_or("-"),
            fields = context.len(),
            "Dispatching request"
        );

        match self.registry.lookup(id) {
            Ok(factory) => HandlerInstance::new(id, factory(context)),
            Err(e) => {
                warn!(error = %e, "Falling back to notFound");
                self.registry.not_found(context)
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(HandlerRegistry::with_defaults()))
    }
}
