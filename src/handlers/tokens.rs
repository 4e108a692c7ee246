//! Token APIs
//!
//! - `tokenIssue` (`POST /tokens`): issues a new token for `userNo`
//! - `tokenVerify` (`GET /tokens`): checks that `token` is well formed
//! - `tokenExpire` (`DELETE /tokens`): expires `token`
//!
//! Tokens are random v4 UUIDs. No token state is kept between requests, so
//! verification and expiry only check the token's shape.

use crate::handlers::{
    result_code, ApiHandler, ApiResult, Execute, RequestParamError, ServiceError, Validate,
    MESSAGE,
};
use crate::request::RequestContext;
use tracing::debug;
use uuid::Uuid;

fn require<'a>(context: &'a RequestContext, field: &str) -> Result<&'a str, RequestParamError> {
    context
        .non_empty(field)
        .ok_or_else(|| RequestParamError::missing(field))
}

fn require_token(context: &RequestContext) -> Result<Uuid, RequestParamError> {
    let token = require(context, "token")?;
    Uuid::parse_str(token)
        .map_err(|e| RequestParamError(format!("malformed token '{}': {}", token, e)))
}

fn succeed(result: &mut ApiResult) {
    result.set_result_code(result_code::SUCCESS);
    result.set(MESSAGE, "Success");
}

// ============================================================================
// tokenIssue
// ============================================================================

pub struct TokenIssue {
    context: RequestContext,
}

impl TokenIssue {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn boxed(context: RequestContext) -> Box<dyn ApiHandler> {
        Box::new(Self::new(context))
    }
}

impl Validate for TokenIssue {
    fn validate(&self) -> Result<(), RequestParamError> {
        require(&self.context, "userNo")?;
        require(&self.context, "password")?;
        Ok(())
    }
}

impl Execute for TokenIssue {
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
        let user_no = self.context.get("userNo").unwrap_or_default();
        let token = Uuid::new_v4().to_string();
        debug!(user_no, "Issued token");

        succeed(result);
        result.set("token", token);
        result.set("userNo", user_no);
        Ok(())
    }
}

// ============================================================================
// tokenVerify
// ============================================================================

pub struct TokenVerify {
    context: RequestContext,
}

impl TokenVerify {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn boxed(context: RequestContext) -> Box<dyn ApiHandler> {
        Box::new(Self::new(context))
    }
}

impl Validate for TokenVerify {
    fn validate(&self) -> Result<(), RequestParamError> {
        require_token(&self.context).map(|_| ())
    }
}

impl Execute for TokenVerify {
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
        let token = require_token(&self.context).map_err(|e| ServiceError(e.to_string()))?;
        succeed(result);
        result.set("token", token.hyphenated().to_string());
        Ok(())
    }
}

// ============================================================================
// tokenExpire
// ============================================================================

pub struct TokenExpire {
    context: RequestContext,
}

impl TokenExpire {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn boxed(context: RequestContext) -> Box<dyn ApiHandler> {
        Box::new(Self::new(context))
    }
}

impl Validate for TokenExpire {
    fn validate(&self) -> Result<(), RequestParamError> {
        require_token(&self.context).map(|_| ())
    }
}

impl Execute for TokenExpire {
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
        let token = require_token(&self.context).map_err(|e| ServiceError(e.to_string()))?;
        debug!(%token, "Expired token");
        succeed(result);
        Ok(())
    }
}
