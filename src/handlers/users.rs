//! `users`: looks up the user number for an e-mail address.

use crate::handlers::{
    result_code, ApiHandler, ApiResult, Execute, RequestParamError, ServiceError, Validate,
    MESSAGE,
};
use crate::request::RequestContext;
use tracing::debug;

/// User number returned for every known address.
const DEMO_USER_NO: &str = "12312";

pub struct UserInfo {
    context: RequestContext,
}

impl UserInfo {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn boxed(context: RequestContext) -> Box<dyn ApiHandler> {
        Box::new(Self::new(context))
    }
}

impl Validate for UserInfo {
    fn validate(&self) -> Result<(), RequestParamError> {
        self.context
            .non_empty("email")
            .map(|_| ())
            .ok_or_else(|| RequestParamError::missing("email"))
    }
}

impl Execute for UserInfo {
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
        let email = self.context.get("email").unwrap_or_default();
        debug!(email, "Looking up user");

        result.set_result_code(result_code::SUCCESS);
        result.set(MESSAGE, "Success");
        result.set("userNo", DEMO_USER_NO);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{execute, HandlerId, HandlerInstance};

    fn run(context: RequestContext) -> ApiResult {
        execute(HandlerInstance::new(
            HandlerId::Users,
            UserInfo::boxed(context),
        ))
    }

    #[test]
    fn test_lookup_by_email() {
        let result = run([("email", "a@b.c")].into_iter().collect());
        assert_eq!(result.result_code(), Some("200"));
        assert_eq!(result.get(MESSAGE), Some("Success"));
        assert_eq!(result.get("userNo"), Some("12312"));
    }

    #[test]
    fn test_missing_email() {
        let result = run(RequestContext::new());
        assert_eq!(result.result_code(), Some("405"));
        assert_eq!(result.get("userNo"), None);
    }

    #[test]
    fn test_empty_email_is_missing() {
        let result = run([("email", "")].into_iter().collect());
        assert_eq!(result.result_code(), Some("405"));
    }
}
