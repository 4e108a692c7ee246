//! Handler Lifecycle Executor
//!
//! Runs the fixed validate → execute sequence for one handler instance and
//! always hands back a usable [`ApiResult`]. Handler failures are logged here
//! and turned into result codes; nothing propagates past this function.

use crate::handlers::registry::HandlerInstance;
use crate::handlers::result::{result_code, ApiResult};
use tracing::error;

/// Runs `instance` to completion and returns its result.
///
/// - validation failure: `resultCode` = 405, business logic is skipped
/// - business failure: `resultCode` = 501, fields already written are kept
///
/// The instance is consumed; it does not outlive the call.
pub fn execute(instance: HandlerInstance) -> ApiResult {
    let id = instance.id();
    let handler = instance.handler();
    let mut result = ApiResult::new();

    if let Err(e) = handler.validate() {
        error!(handler = %id, error = ?e, "Request parameter validation failed");
        result.set_result_code(result_code::BAD_PARAMETER);
        return result;
    }

    if let Err(e) = handler.execute(&mut result) {
        error!(handler = %id, error = ?e, "Service execution failed");
        result.set_result_code(result_code::SERVICE_ERROR);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::registry::HandlerId;
    use crate::handlers::{Execute, RequestParamError, ServiceError, Validate, MESSAGE};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<&'static str>>>;

    /// Records which lifecycle steps ran.
    struct Recording {
        calls: Calls,
        fail_validation: bool,
        fail_service: bool,
    }

    impl Validate for Recording {
        fn validate(&self) -> Result<(), RequestParamError> {
            self.calls.lock().unwrap().push("validate");
            if self.fail_validation {
                return Err(RequestParamError::missing("email"));
            }
            Ok(())
        }
    }

    impl Execute for Recording {
        fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push("execute");
            result.set(MESSAGE, "working");
            if self.fail_service {
                return Err(ServiceError("backend unavailable".to_string()));
            }
            result.set_result_code(result_code::SUCCESS);
            Ok(())
        }
    }

    /// Relies on the default validation policy.
    struct NoValidation;

    impl Validate for NoValidation {}

    impl Execute for NoValidation {
        fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
            result.set_result_code(result_code::SUCCESS);
            Ok(())
        }
    }

    fn run(fail_validation: bool, fail_service: bool) -> (ApiResult, Vec<&'static str>) {
        let calls = Calls::default();
        let handler = Recording {
            calls: Arc::clone(&calls),
            fail_validation,
            fail_service,
        };
        let result = execute(HandlerInstance::new(HandlerId::Users, Box::new(handler)));
        let calls = calls.lock().unwrap().clone();
        (result, calls)
    }

    #[test]
    fn test_success_runs_validate_then_execute() {
        let (result, calls) = run(false, false);
        assert_eq!(calls, vec!["validate", "execute"]);
        assert_eq!(result.result_code(), Some(result_code::SUCCESS));
        assert_eq!(result.get(MESSAGE), Some("working"));
    }

    #[test]
    fn test_validation_failure_skips_business_logic() {
        let (result, calls) = run(true, false);
        assert_eq!(calls, vec!["validate"]);
        assert_eq!(result.result_code(), Some(result_code::BAD_PARAMETER));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_service_failure_sets_service_error() {
        let (result, calls) = run(false, true);
        assert_eq!(calls, vec!["validate", "execute"]);
        assert_eq!(result.result_code(), Some(result_code::SERVICE_ERROR));
        assert_eq!(result.get(MESSAGE), Some("working"));
    }

    #[test]
    fn test_default_validation_passes() {
        let result = execute(HandlerInstance::new(
            HandlerId::NotFound,
            Box::new(NoValidation),
        ));
        assert_eq!(result.result_code(), Some(result_code::SUCCESS));
    }
}
