//! `notFound`: answers every request no route matched.

use crate::handlers::{result_code, ApiHandler, ApiResult, Execute, ServiceError, Validate, MESSAGE};
use crate::request::RequestContext;
use tracing::debug;

pub struct NotFound {
    context: RequestContext,
}

impl NotFound {
    pub fn new(context: RequestContext) -> Self {
        Self { context }
    }

    pub fn boxed(context: RequestContext) -> Box<dyn ApiHandler> {
        Box::new(Self::new(context))
    }
}

impl Validate for NotFound {}

impl Execute for NotFound {
    fn execute(&self, result: &mut ApiResult) -> Result<(), ServiceError> {
        debug!(
            method = self.context.method().unwrap_or("-"),
            uri = self.context.uri().unwrap_or("-"),
            "No route matched"
        );
        result.set_result_code(result_code::NOT_FOUND);
        result.set(MESSAGE, "Not Found");
        Ok(())
    }
}
