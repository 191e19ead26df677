//! User actions that mutate backend state: analyze, reanalyze, create,
//! delete. Each one reports through the [`Notifier`] and invalidates the
//! cached queries it affects. Nothing is invalidated on failure.

use std::sync::Arc;

use contrax_core::{AnalyzeResponse, Contract, NewContract};
use tracing::info;

use crate::cache::{KeyFamily, QueryCache, QueryKey, Reason};
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::notify::{Notification, Notifier};
use crate::watch::WatchRegistry;

/// Where the front end should go after an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    ContractList,
}

#[derive(Clone)]
pub struct Actions {
    client: ApiClient,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn Notifier>,
    watches: Option<Arc<WatchRegistry>>,
}

impl Actions {
    pub fn new(client: ApiClient, cache: Arc<QueryCache>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            client,
            cache,
            notifier,
            watches: None,
        }
    }

    pub fn with_watches(mut self, watches: Arc<WatchRegistry>) -> Self {
        self.watches = Some(watches);
        self
    }

    fn report<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(e) = &result {
            self.notifier.notify(Notification::error(e.user_message()));
        }
        result
    }

    pub async fn analyze(&self, id: &str) -> Result<AnalyzeResponse, ApiError> {
        self.request_analysis(id, false).await
    }

    pub async fn reanalyze(&self, id: &str) -> Result<AnalyzeResponse, ApiError> {
        self.request_analysis(id, true).await
    }

    async fn request_analysis(&self, id: &str, force: bool) -> Result<AnalyzeResponse, ApiError> {
        let resp = self.report(self.client.analyze_contract(id, force).await)?;
        self.cache
            .invalidate(QueryKey::Contract(id.to_string()), Reason::AnalysisRequested);
        self.cache
            .invalidate(KeyFamily::Contracts, Reason::AnalysisRequested);
        let message = if resp.message.is_empty() {
            "Analysis started".to_string()
        } else {
            resp.message.clone()
        };
        self.notifier.notify(Notification::success(message));
        Ok(resp)
    }

    pub async fn create(&self, new: &NewContract) -> Result<Contract, ApiError> {
        let created = self.report(self.client.create_contract(new).await)?;
        self.cache.invalidate(KeyFamily::Contracts, Reason::Mutation);
        self.cache
            .invalidate(KeyFamily::DashboardStats, Reason::Mutation);
        self.notifier.notify(Notification::success(format!(
            "Contract \"{}\" created",
            created.title
        )));
        Ok(created)
    }

    pub async fn delete(&self, id: &str) -> Result<Navigation, ApiError> {
        self.report(self.client.delete_contract(id).await)?;
        // Stop first so the watcher does not refetch a deleted contract.
        if let Some(watches) = &self.watches {
            if watches.stop(id) {
                info!(id, "stopped watcher for deleted contract");
            }
        }
        self.cache.invalidate(KeyFamily::Contracts, Reason::Mutation);
        self.cache
            .invalidate(KeyFamily::DashboardStats, Reason::Mutation);
        self.cache
            .invalidate(QueryKey::Contract(id.to_string()), Reason::Mutation);
        self.cache
            .invalidate(QueryKey::Clauses(id.to_string()), Reason::Mutation);
        self.notifier
            .notify(Notification::success("Contract deleted"));
        Ok(Navigation::ContractList)
    }
}
