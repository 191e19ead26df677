//! Contract, clause and dashboard endpoints.

use contrax_core::{
    AnalyzeRequest, AnalyzeResponse, Clause, Contract, ContractFilters, ContractType,
    DashboardStats, Listing, NewContract, Page,
};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderName};
use tracing::info;

use crate::error::ApiError;
use crate::http::{ApiClient, ApiRequest};

/// A downloaded analysis report.
#[derive(Debug, Clone)]
pub struct Report {
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Report formats the backend can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Docx,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

impl std::str::FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Reject ids that would escape the `/api/contracts/{id}/` path segment.
pub fn check_id(id: &str) -> Result<&str, ApiError> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(id)
    } else {
        let mut errors = contrax_core::ValidationErrors::default();
        errors.add("id", format!("invalid contract id: {id:?}"));
        Err(ApiError::Invalid(errors))
    }
}

fn contract_path(id: &str, suffix: &str) -> Result<String, ApiError> {
    Ok(format!("/api/contracts/{}/{suffix}", check_id(id)?))
}

/// Filename from a `Content-Disposition` header, if present.
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|part| {
        let value = part.strip_prefix("filename=")?;
        Some(value.trim_matches('"').to_string())
    })
}

impl ApiClient {
    pub async fn list_contracts(
        &self,
        filters: &ContractFilters,
    ) -> Result<Page<Contract>, ApiError> {
        let req = ApiRequest::get("/api/contracts/").query(filters.to_query());
        match self.fetch::<Listing<Contract>>(&req).await? {
            Listing::Page(page) => Ok(page),
            Listing::Items(items) => Ok(Page {
                count: items.len() as u64,
                next: None,
                previous: None,
                results: items,
            }),
        }
    }

    pub async fn get_contract(&self, id: &str) -> Result<Contract, ApiError> {
        self.fetch(&ApiRequest::get(contract_path(id, "")?)).await
    }

    /// Validate locally, then `POST /api/contracts/`.
    pub async fn create_contract(&self, new: &NewContract) -> Result<Contract, ApiError> {
        new.validate().map_err(ApiError::Invalid)?;
        let req = ApiRequest::post("/api/contracts/").json(new)?;
        let created: Contract = self.fetch(&req).await?;
        info!(id = %created.id, title = %created.title, "contract created");
        Ok(created)
    }

    pub async fn analyze_contract(
        &self,
        id: &str,
        force: bool,
    ) -> Result<AnalyzeResponse, ApiError> {
        let req = ApiRequest::post(contract_path(id, "analyze/")?).json(&AnalyzeRequest {
            force_reanalysis: force,
        })?;
        let resp: AnalyzeResponse = self.fetch(&req).await?;
        info!(id, force, task_id = ?resp.task_id, "analysis requested");
        Ok(resp)
    }

    pub async fn delete_contract(&self, id: &str) -> Result<(), ApiError> {
        self.send(&ApiRequest::delete(contract_path(id, "")?)).await?;
        info!(id, "contract deleted");
        Ok(())
    }

    pub async fn export_report(
        &self,
        id: &str,
        format: Option<ReportFormat>,
    ) -> Result<Report, ApiError> {
        let mut req = ApiRequest::get(contract_path(id, "export_report/")?);
        if let Some(format) = format {
            req = req.query(vec![("format".to_string(), format.as_str().to_string())]);
        }
        let resp = self.send_with_retry(&req).await?;
        let header = |name: HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type =
            header(CONTENT_TYPE).unwrap_or_else(|| "application/octet-stream".to_string());
        let content_disposition = header(CONTENT_DISPOSITION);
        let filename = content_disposition.as_deref().and_then(disposition_filename);
        let bytes = resp.bytes().await?.to_vec();
        Ok(Report {
            content_type,
            content_disposition,
            filename,
            bytes,
        })
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.fetch(&ApiRequest::get("/api/contracts/dashboard_stats/"))
            .await
    }

    pub async fn contract_types(&self) -> Result<Vec<ContractType>, ApiError> {
        let listing: Listing<ContractType> =
            self.fetch(&ApiRequest::get("/api/contract-types/")).await?;
        Ok(listing.into_items())
    }

    pub async fn clauses(&self, contract_id: &str) -> Result<Vec<Clause>, ApiError> {
        let req = ApiRequest::get("/api/clauses/")
            .query(vec![("contract".to_string(), check_id(contract_id)?.to_string())]);
        let listing: Listing<Clause> = self.fetch(&req).await?;
        Ok(listing.into_items())
    }
}
