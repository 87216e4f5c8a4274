use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::core::{
    domain::EvaluationLimits,
    traits::sandbox::{Sandbox, SandboxError, SandboxRequest, SandboxResponse},
};

/// Answers every request with a fixed response after `delay`.
#[derive(Debug, Clone)]
pub struct SandboxStub {
    result: Result<SandboxResponse, SandboxError>,
    delay: Duration,
    completions: Arc<AtomicUsize>,
}

impl SandboxStub {
    pub fn new(result: Result<SandboxResponse, SandboxError>, delay: Duration) -> Self {
        Self {
            result,
            delay,
            completions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counts requests that ran to the end of their delay.
    pub fn completions(&self) -> Arc<AtomicUsize> {
        self.completions.clone()
    }
}

#[async_trait::async_trait]
impl Sandbox for SandboxStub {
    #[tracing::instrument(skip(request))]
    async fn execute(
        &self,
        request: &SandboxRequest,
        limits: &EvaluationLimits,
    ) -> Result<SandboxResponse, SandboxError> {
        tracing::debug!("Start execution: cases={}", request.cases.len());
        tokio::time::sleep(self.delay).await;
        self.completions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Execution result: {:?}", self.result);

        self.result.clone()
    }
}
