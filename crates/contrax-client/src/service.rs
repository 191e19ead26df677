//! Read-through access to backend resources via the [`QueryCache`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use contrax_core::{Clause, Contract, ContractFilters, ContractType, DashboardStats, Page};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::cache::{QueryCache, QueryKey};
use crate::error::ApiError;
use crate::http::ApiClient;
use crate::watch::ContractSource;

#[derive(Clone)]
pub struct ContractService {
    client: ApiClient,
    cache: Arc<QueryCache>,
}

impl ContractService {
    pub fn new(client: ApiClient, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    async fn cached<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<T, ApiError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if let Some(hit) = self.cache.get(&key) {
            trace!(?key, "cache hit");
            return Ok(hit);
        }
        let value = fetch().await?;
        self.cache.put(key, &value);
        Ok(value)
    }

    pub async fn contracts(&self, filters: &ContractFilters) -> Result<Page<Contract>, ApiError> {
        self.cached(QueryKey::Contracts(filters.clone()), || {
            self.client.list_contracts(filters)
        })
        .await
    }

    pub async fn contract(&self, id: &str) -> Result<Contract, ApiError> {
        self.cached(QueryKey::Contract(id.to_string()), || self.client.get_contract(id))
            .await
    }

    pub async fn clauses(&self, contract_id: &str) -> Result<Vec<Clause>, ApiError> {
        self.cached(QueryKey::Clauses(contract_id.to_string()), || {
            self.client.clauses(contract_id)
        })
        .await
    }

    /// Contract and its clauses, fetched concurrently.
    pub async fn contract_with_clauses(
        &self,
        id: &str,
    ) -> Result<(Contract, Vec<Clause>), ApiError> {
        futures::try_join!(self.contract(id), self.clauses(id))
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.cached(QueryKey::DashboardStats, || self.client.dashboard_stats())
            .await
    }

    pub async fn contract_types(&self) -> Result<Vec<ContractType>, ApiError> {
        self.cached(QueryKey::ContractTypes, || self.client.contract_types())
            .await
    }
}

#[async_trait]
impl ContractSource for ContractService {
    async fn fetch_contract(&self, id: &str) -> Result<Contract, ApiError> {
        self.contract(id).await
    }
}
