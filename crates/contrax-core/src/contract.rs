//! Contract resources as exchanged with the analysis backend.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Analysis lifecycle of a contract.
///
/// Created `pending`, moved to `analyzing` by an analyze request, and settled
/// asynchronously by the backend into `completed` or `error`. A forced
/// reanalysis moves a settled contract back to `analyzing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    #[default]
    Pending,
    Analyzing,
    Completed,
    Error,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Only `completed` and `error` are terminal. `analyzing` never is.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether a plain (non-forced) analyze request makes sense.
    pub fn can_analyze(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether a forced reanalysis makes sense.
    pub fn can_reanalyze(&self) -> bool {
        self.is_terminal()
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "analyzing" => Ok(Self::Analyzing),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown contract status: {other}")),
        }
    }
}

/// Static reference data describing a kind of contract (lease, employment, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractType {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The list serializer sends the type as a bare id, the detail serializer
/// as a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractTypeRef {
    Id(i64),
    Full(ContractType),
}

impl ContractTypeRef {
    pub fn id(&self) -> i64 {
        match self {
            Self::Id(id) => *id,
            Self::Full(t) => t.id,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Full(t) => Some(&t.name),
        }
    }
}

/// A contract as returned by `/api/contracts/` and `/api/contracts/{id}/`.
///
/// List responses omit `original_text` and the summary fields, so those
/// default to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub title: String,
    pub contract_type: ContractTypeRef,
    #[serde(default)]
    pub contract_type_name: Option<String>,
    #[serde(default)]
    pub original_text: String,
    #[serde(default)]
    pub status: ContractStatus,
    #[serde(default)]
    pub total_clauses: u32,
    #[serde(default)]
    pub abusive_clauses_count: u32,
    /// Raw wire value; convert with [`RiskScale::normalize`](crate::RiskScale::normalize).
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub executive_summary: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uploaded_by_username: Option<String>,
}

impl Contract {
    /// Display name of the contract type, from whichever field carries it.
    pub fn type_name(&self) -> Option<&str> {
        self.contract_type
            .name()
            .or(self.contract_type_name.as_deref())
    }
}

/// Body of `POST /api/contracts/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContract {
    pub title: String,
    pub original_text: String,
    pub contract_type: i64,
}

/// Body of `POST /api/contracts/{id}/analyze/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub force_reanalysis: bool,
}

/// Acknowledgement returned by the analyze endpoint.
///
/// 202 when a task was queued, 200 when the contract was already analyzed
/// and no force flag was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub contract_id: Option<serde_json::Value>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub status: Option<ContractStatus>,
}

/// Aggregate counts from `/api/contracts/dashboard_stats/`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_contracts: u64,
    pub pending_analysis: u64,
    pub analyzing: u64,
    pub completed: u64,
    #[serde(default)]
    pub high_risk: u64,
    #[serde(default)]
    pub medium_risk: u64,
    #[serde(default)]
    pub low_risk: u64,
    #[serde(default)]
    pub recent_contracts: Vec<Contract>,
}

/// Filters accepted by the contract list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ContractFilters {
    pub status: Option<ContractStatus>,
    pub contract_type: Option<i64>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ContractFilters {
    /// Query pairs in the order the backend documents them; unset fields are omitted.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut q = Vec::new();
        if let Some(status) = self.status {
            q.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(ct) = self.contract_type {
            q.push(("contract_type".to_string(), ct.to_string()));
        }
        if let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty()) {
            q.push(("search".to_string(), search.to_string()));
        }
        if let Some(page) = self.page {
            q.push(("page".to_string(), page.to_string()));
        }
        if let Some(size) = self.page_size {
            q.push(("page_size".to_string(), size.to_string()));
        }
        q
    }
}

/// DRF page envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Page number encoded in the `next` link, if any.
    pub fn next_page(&self) -> Option<u32> {
        let next = self.next.as_deref()?;
        let query = next.split_once('?')?.1;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(k, _)| *k == "page")
            .and_then(|(_, v)| v.parse().ok())
    }
}

/// Some endpoints return a page, others (depending on backend revision) a
/// bare array. Accept both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Listing<T> {
    Page(Page<T>),
    Items(Vec<T>),
}

impl<T> Listing<T> {
    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Page(p) => p.results,
            Self::Items(items) => items,
        }
    }
}
