use async_trait::async_trait;

use crate::models::{ExecutionResult, Language};

/// Executes session code on behalf of the server.
///
/// Implementations must isolate the code they run (no ambient filesystem or
/// network access) and bound its running time. Failures, including timeouts,
/// are reported through [`ExecutionResult::error`]; `run` itself never fails.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str, language: Language) -> ExecutionResult;
}

/// Runner used when browsers execute code themselves. Performs no work and
/// answers with a fixed placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClientSideRunner;

pub const CLIENT_SIDE_OUTPUT: &str = "Code execution handled client-side";

#[async_trait]
impl CodeRunner for ClientSideRunner {
    async fn run(&self, _code: &str, language: Language) -> ExecutionResult {
        ExecutionResult {
            output: CLIENT_SIDE_OUTPUT.to_string(),
            error: None,
            execution_time: 0.0,
            language,
        }
    }
}
