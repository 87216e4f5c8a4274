use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{decoder::Argument, domain::EvaluationLimits};

/// One round trip into an isolated worker: everything goes in by value,
/// everything comes back as a single message.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Sandbox: std::fmt::Debug + Send + Sync {
    async fn execute(
        &self,
        request: &SandboxRequest,
        limits: &EvaluationLimits,
    ) -> Result<SandboxResponse, SandboxError>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SandboxRequest {
    /// Expression evaluating to the function under test.
    pub unit: String,
    pub cases: Vec<CaseInvocation>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CaseInvocation {
    pub args: Vec<Argument>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SandboxResponse {
    /// One outcome per requested case, same order.
    Results { outcomes: Vec<CaseOutcome> },
    CompileError { message: String },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    Returned {
        result: ReturnValue,
        /// First argument as it looked after the call, sent when it is an array.
        #[serde(default)]
        first_arg: Option<ReturnValue>,
    },
    Threw {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnValue {
    Undefined,
    Json { value: Value },
    /// Values JSON cannot carry (NaN, functions, symbols...) in their string form.
    Opaque { text: String },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("Failed to start worker: {msg}")]
    Spawn { msg: String },
    #[error("Worker crashed with status {status:?}: {stderr}")]
    Crashed { status: Option<i32>, stderr: String },
    #[error("Worker output exceeded {limit_bytes} bytes")]
    OutputLimitExceeded { limit_bytes: u64 },
    #[error("Malformed worker message: {msg}")]
    Protocol { msg: String },
    #[error("Test execution failed: {msg}")]
    Worker { msg: String },
}
