use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub topics: BTreeSet<String>,
    pub supported_languages: BTreeSet<String>,
    pub starter_code: BTreeMap<String, String>,
    pub test_cases: Vec<TestCase>,
    pub example: String,
}

impl Challenge {
    /// Language tags are compared case-insensitively, `JavaScript` == `javascript`.
    pub fn offers_language(&self, language: &str) -> bool {
        self.supported_languages
            .iter()
            .any(|offered| offered.eq_ignore_ascii_case(language.trim()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.pad(name)
    }
}

/// One graded case: `input` is a comma-joined list of `name = value`
/// assignments, `expected` a JSON-ish literal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected: String,
}

impl TestCase {
    pub fn new(input: &str, expected: &str) -> Self {
        TestCase {
            input: input.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub passed: bool,
    pub input: String,
    pub expected: String,
    pub output: String,
    pub actual_output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verdict {
    pub fn returned(case: &TestCase, output: String, expected: &str) -> Self {
        Verdict {
            passed: output == expected,
            input: case.input.clone(),
            expected: case.expected.clone(),
            actual_output: format!("Function returned: {output}"),
            output,
            error: None,
        }
    }

    pub fn failed(case: &TestCase, message: &str) -> Self {
        Verdict {
            passed: false,
            input: case.input.clone(),
            expected: case.expected.clone(),
            output: message.to_string(),
            actual_output: format!("Error: {message}"),
            error: Some(message.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    JavaScript,
}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            _ => Err(UnsupportedLanguage(tag.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => f.write_str("javascript"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported language: {0}")]
pub struct UnsupportedLanguage(pub String);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvaluationLimits {
    /// Bound on the whole evaluation, every case included.
    pub wall_time: Duration,
    pub memory_bytes: Option<u64>,
    pub output_bytes: u64,
}
