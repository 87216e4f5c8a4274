use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{
    catalog::ChallengeCatalog,
    domain::Verdict,
    evaluator::{EvaluateError, Evaluator},
};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Challenge with ID {0} not found")]
    ChallengeNotFound(String),
    #[error("Challenge {challenge_id} is not offered in {language}")]
    LanguageNotOffered {
        challenge_id: String,
        language: String,
    },
    #[error(transparent)]
    Evaluation(#[from] EvaluateError),
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingReport {
    pub challenge_id: String,
    pub language: String,
    pub verdicts: Vec<Verdict>,
    pub passed: usize,
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl GradingReport {
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }
}

/// Looks challenges up and hands them to the evaluator.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    catalog: Arc<ChallengeCatalog>,
    evaluator: Evaluator,
}

impl Dispatcher {
    pub fn new(catalog: Arc<ChallengeCatalog>, evaluator: Evaluator) -> Self {
        Self { catalog, evaluator }
    }

    pub fn catalog(&self) -> &ChallengeCatalog {
        &self.catalog
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn run_tests(
        &self,
        challenge_id: &str,
        code: &str,
        language: &str,
    ) -> Result<GradingReport, DispatchError> {
        let challenge = self
            .catalog
            .get(challenge_id)
            .ok_or_else(|| DispatchError::ChallengeNotFound(challenge_id.to_string()))?;
        if !challenge.offers_language(language) {
            return Err(DispatchError::LanguageNotOffered {
                challenge_id: challenge_id.to_string(),
                language: language.to_string(),
            });
        }

        let started_at = Utc::now();
        let verdicts = self
            .evaluator
            .evaluate(code, language, &challenge.test_cases)
            .await?;
        let passed = verdicts.iter().filter(|verdict| verdict.passed).count();

        let report = GradingReport {
            challenge_id: challenge.id.clone(),
            language: language.to_string(),
            total: verdicts.len(),
            passed,
            verdicts,
            started_at,
            finished_at: Utc::now(),
        };
        if report.all_passed() {
            tracing::info!("All tests passed");
        } else {
            tracing::info!("{}/{} tests passed", report.passed, report.total);
        }

        Ok(report)
    }
}
