use std::collections::HashSet;

use crate::core::domain::Challenge;

const BUILTIN_CHALLENGES: &str = include_str!("../../data/challenges.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid challenge catalog: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Duplicate challenge id: {0}")]
    DuplicateId(String),
    #[error("Challenge {0} has no test cases")]
    NoTestCases(String),
}

/// Read-only set of challenges, kept in load order.
#[derive(Clone, Debug)]
pub struct ChallengeCatalog {
    challenges: Vec<Challenge>,
}

impl ChallengeCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CHALLENGES)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let challenges: Vec<Challenge> = serde_json::from_str(json)?;
        Self::new(challenges)
    }

    pub fn new(challenges: Vec<Challenge>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for challenge in &challenges {
            if !seen.insert(challenge.id.as_str()) {
                return Err(CatalogError::DuplicateId(challenge.id.clone()));
            }
            if challenge.test_cases.is_empty() {
                return Err(CatalogError::NoTestCases(challenge.id.clone()));
            }
        }

        tracing::debug!("Loaded {} challenges", challenges.len());
        Ok(Self { challenges })
    }

    pub fn get(&self, id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|challenge| challenge.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.iter()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    pub fn starter_code(&self, id: &str, language: &str) -> Option<&str> {
        self.get(id)?
            .starter_code
            .iter()
            .find(|(tag, _)| tag.eq_ignore_ascii_case(language.trim()))
            .map(|(_, code)| code.as_str())
    }
}
