//! Clauses extracted and classified by the backend. Read-only on the client.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Clause numbering is an integer in analysis results and a string in the
/// model serializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClauseNumber {
    Int(i64),
    Text(String),
}

impl fmt::Display for ClauseNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MlAnalysis {
    pub is_abusive: bool,
    #[serde(default)]
    pub abuse_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GptAnalysis {
    #[serde(default)]
    pub is_valid_clause: Option<bool>,
    #[serde(default)]
    pub is_abusive: Option<bool>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub suggested_fix: Option<String>,
}

/// Named entity found inside a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    /// `entity_type` on the clause endpoints.
    #[serde(alias = "entity_type")]
    pub label: String,
    #[serde(default)]
    pub start_char: Option<u32>,
    #[serde(default)]
    pub end_char: Option<u32>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub id: String,
    pub text: String,
    pub clause_number: ClauseNumber,
    #[serde(default)]
    pub clause_type: Option<String>,
    #[serde(default)]
    pub ml_analysis: Option<MlAnalysis>,
    #[serde(default)]
    pub gpt_analysis: Option<GptAnalysis>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Raw wire value; see [`RiskScale`](crate::RiskScale).
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Clause {
    /// A clause is flagged when either classifier calls it abusive.
    pub fn is_flagged(&self) -> bool {
        let ml = self.ml_analysis.as_ref().is_some_and(|m| m.is_abusive);
        let gpt = self
            .gpt_analysis
            .as_ref()
            .and_then(|g| g.is_abusive)
            .unwrap_or(false);
        ml || gpt
    }
}
