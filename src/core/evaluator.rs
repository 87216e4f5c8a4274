use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::{
    decoder::{Argument, decode_argument_list, decode_expected, format_value},
    domain::{EvaluationLimits, Language, TestCase, UnsupportedLanguage, Verdict},
    traits::sandbox::{
        CaseInvocation, CaseOutcome, ReturnValue, Sandbox, SandboxError, SandboxRequest,
        SandboxResponse,
    },
    wrapping::prepare_unit,
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvaluateError {
    #[error(transparent)]
    UnsupportedLanguage(#[from] UnsupportedLanguage),
    #[error("Evaluation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("Worker answered {actual} cases, {expected} were submitted")]
    CaseCountMismatch { expected: usize, actual: usize },
    #[error("Evaluation was cancelled")]
    Cancelled,
    #[error("Evaluation task failed: {msg}")]
    Internal { msg: String },
}

#[derive(Clone, Debug)]
pub struct Evaluator {
    sandbox: Arc<dyn Sandbox>,
    limits: EvaluationLimits,
}

impl Evaluator {
    pub fn new(sandbox: Arc<dyn Sandbox>, limits: EvaluationLimits) -> Self {
        Self { sandbox, limits }
    }

    /// Grades `source` against every case, returning one verdict per case
    /// in submission order.
    ///
    /// A compile failure fails every case with the same diagnostic. A timeout
    /// or a broken worker fails the whole call.
    #[tracing::instrument(
        skip(self, source, test_cases),
        fields(evaluation_id = %Uuid::new_v4(), cases = test_cases.len())
    )]
    pub async fn evaluate(
        &self,
        source: &str,
        language: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<Verdict>, EvaluateError> {
        let language: Language = language.parse()?;
        if test_cases.is_empty() {
            return Ok(Vec::new());
        }

        let unit = prepare_unit(source, &language);
        tracing::debug!("Prepared unit, entry point: {:?}", unit.entry_point);

        let arguments: Vec<Vec<Argument>> = test_cases
            .iter()
            .map(|case| decode_argument_list(&case.input))
            .collect();
        let request = SandboxRequest {
            unit: unit.text,
            cases: arguments
                .iter()
                .map(|args| CaseInvocation { args: args.clone() })
                .collect(),
        };

        let response =
            tokio::time::timeout(self.limits.wall_time, self.sandbox.execute(&request, &self.limits))
                .await
                .map_err(|_| {
                    tracing::info!("Evaluation exceeded {:?}", self.limits.wall_time);
                    EvaluateError::Timeout(self.limits.wall_time)
                })??;

        let verdicts = match response {
            SandboxResponse::CompileError { message } => {
                tracing::info!("Compilation failed: {}", message);
                test_cases
                    .iter()
                    .map(|case| Verdict::failed(case, &message))
                    .collect()
            }
            SandboxResponse::Results { outcomes } => {
                if outcomes.len() != test_cases.len() {
                    return Err(EvaluateError::CaseCountMismatch {
                        expected: test_cases.len(),
                        actual: outcomes.len(),
                    });
                }
                test_cases
                    .iter()
                    .zip_eq(arguments.iter())
                    .zip_eq(outcomes)
                    .map(|((case, args), outcome)| grade(case, args, outcome))
                    .collect::<Vec<_>>()
            }
        };

        tracing::info!(
            "Evaluation finished: {}/{} passed",
            verdicts.iter().filter(|verdict| verdict.passed).count(),
            verdicts.len()
        );
        Ok(verdicts)
    }

    /// Runs [`Evaluator::evaluate`] on its own task so the caller can walk away.
    pub fn spawn(
        &self,
        source: String,
        language: String,
        test_cases: Vec<TestCase>,
    ) -> EvaluationHandle {
        let evaluator = self.clone();
        let task =
            tokio::spawn(async move { evaluator.evaluate(&source, &language, &test_cases).await });

        EvaluationHandle { task }
    }
}

/// Pending evaluation. Cancelling or dropping it tears the worker down.
#[derive(Debug)]
pub struct EvaluationHandle {
    task: JoinHandle<Result<Vec<Verdict>, EvaluateError>>,
}

impl EvaluationHandle {
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub async fn wait(mut self) -> Result<Vec<Verdict>, EvaluateError> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Err(EvaluateError::Cancelled),
            Err(err) => {
                tracing::error!("Evaluation task panicked: {}", err);
                Err(EvaluateError::Internal {
                    msg: err.to_string(),
                })
            }
        }
    }
}

impl Drop for EvaluationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn grade(case: &TestCase, args: &[Argument], outcome: CaseOutcome) -> Verdict {
    match outcome {
        CaseOutcome::Threw { message } => {
            tracing::debug!("Case {:?} threw: {}", case.input, message);
            Verdict::failed(case, &message)
        }
        CaseOutcome::Returned { result, first_arg } => {
            let mutated_in_place = matches!(args.first(), Some(Argument::Value(Value::Array(_))))
                && result == ReturnValue::Undefined;

            let output = match first_arg {
                Some(first_arg) if mutated_in_place => render(&first_arg),
                _ => render(&result),
            };
            let expected = decode_expected(&case.expected);
            tracing::debug!("Case {:?}: output={} expected={}", case.input, output, expected);

            Verdict::returned(case, output, &expected)
        }
    }
}

fn render(value: &ReturnValue) -> String {
    match value {
        ReturnValue::Undefined => "undefined".to_string(),
        ReturnValue::Json { value } => format_value(value),
        ReturnValue::Opaque { text } => text.clone(),
    }
}
