//! Sweep Store - Triple store client
//!
//! Dispatches built statements to every registered endpoint that supports
//! direct query/update, and normalizes the raw bindings they return.
//!
//! Author: hephaex@gmail.com

pub mod http;
pub mod memory;
pub mod normalize;

pub use http::HttpEndpoint;
pub use memory::MemoryEndpoint;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sweep_core::{
    CredentialStore, DirectEndpoint, QueryDescriptor, RawRow, Result, ResultSet, ResultShape,
    StoreConfig, StoreEndpoint, SweepError,
};

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to a statement on one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Applied { endpoint: String, response: String },
    Failed { endpoint: String, error: String },
}

impl ExecutionOutcome {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Applied { endpoint, .. } | Self::Failed { endpoint, .. } => endpoint,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// A read endpoint that could not deliver results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub error: String,
}

/// Merged read results plus the endpoints that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Results concatenated in endpoint registration order
    pub results: ResultSet,

    /// Endpoints whose call failed; their rows are absent from `results`
    pub failures: Vec<EndpointFailure>,

    /// Number of endpoints the statement was sent to
    pub endpoints_queried: usize,
}

impl QueryOutput {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate update outcomes into a single success flag
pub fn all_applied(outcomes: &[ExecutionOutcome]) -> bool {
    outcomes.iter().all(ExecutionOutcome::is_success)
}

// ============================================================================
// Store Client
// ============================================================================

/// Fan-out client over the registered endpoints
#[derive(Clone)]
pub struct StoreClient {
    endpoints: Vec<Arc<dyn StoreEndpoint>>,
    timeout: Duration,
}

impl StoreClient {
    /// Create a client over explicit endpoint handles
    pub fn new(endpoints: Vec<Arc<dyn StoreEndpoint>>) -> Self {
        Self {
            endpoints,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create HTTP endpoints for every configured store
    pub fn from_config(config: &StoreConfig, credentials: &dyn CredentialStore) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let endpoints = config
            .endpoints
            .iter()
            .map(|endpoint| {
                HttpEndpoint::new(endpoint, timeout)
                    .map(|http| Arc::new(http.with_credentials(credentials)) as Arc<dyn StoreEndpoint>)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(endpoints).with_timeout(timeout))
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registered endpoint names in registration order
    pub fn endpoint_names(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.name()).collect()
    }

    fn direct_endpoints(&self) -> Vec<(&str, &dyn DirectEndpoint)> {
        self.endpoints
            .iter()
            .filter_map(|endpoint| match endpoint.direct() {
                Some(direct) => Some((endpoint.name(), direct)),
                None => {
                    tracing::debug!(endpoint = endpoint.name(), "skipping endpoint without direct access");
                    None
                }
            })
            .collect()
    }

    /// Run a read statement on every direct endpoint.
    ///
    /// Endpoints are queried concurrently; results are concatenated in
    /// registration order without deduplication. A failing endpoint is
    /// reported in `failures` and does not affect the others.
    pub async fn execute(&self, descriptor: &QueryDescriptor, shape: ResultShape) -> QueryOutput {
        let endpoints = self.direct_endpoints();
        let calls = endpoints
            .iter()
            .map(|(name, direct)| self.timed_query(name, *direct, &descriptor.statement));
        let responses = join_all(calls).await;

        let mut results = ResultSet::empty(shape);
        let mut failures = Vec::new();
        for ((name, _), response) in endpoints.iter().zip(responses) {
            match response {
                Ok(rows) => {
                    if let Some(variables) = &descriptor.variables {
                        normalize::normalize_into(&mut results, &rows, variables);
                    }
                }
                Err(e) => {
                    tracing::warn!(endpoint = *name, error = %e, "query failed");
                    failures.push(EndpointFailure {
                        endpoint: name.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        QueryOutput {
            results,
            failures,
            endpoints_queried: endpoints.len(),
        }
    }

    /// Apply an update statement on every direct endpoint, collecting one
    /// outcome per endpoint. Never fails as a whole.
    pub async fn execute_update(&self, descriptor: &QueryDescriptor) -> Vec<ExecutionOutcome> {
        let endpoints = self.direct_endpoints();
        let calls = endpoints
            .iter()
            .map(|(name, direct)| self.timed_update(name, *direct, &descriptor.statement));
        let responses = join_all(calls).await;

        endpoints
            .iter()
            .zip(responses)
            .map(|((name, _), response)| match response {
                Ok(response) => ExecutionOutcome::Applied {
                    endpoint: name.to_string(),
                    response,
                },
                Err(e) => {
                    tracing::warn!(endpoint = *name, error = %e, "update failed");
                    ExecutionOutcome::Failed {
                        endpoint: name.to_string(),
                        error: e.to_string(),
                    }
                }
            })
            .collect()
    }

    async fn timed_query(
        &self,
        name: &str,
        direct: &dyn DirectEndpoint,
        statement: &str,
    ) -> Result<Vec<RawRow>> {
        let started = Instant::now();
        let rows = tokio::time::timeout(self.timeout, direct.direct_query(statement))
            .await
            .map_err(|_| self.timeout_error(name))??;
        tracing::debug!(
            endpoint = name,
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query completed"
        );
        Ok(rows)
    }

    async fn timed_update(
        &self,
        name: &str,
        direct: &dyn DirectEndpoint,
        statement: &str,
    ) -> Result<String> {
        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, direct.direct_update(statement))
            .await
            .map_err(|_| self.timeout_error(name))??;
        tracing::debug!(
            endpoint = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "update applied"
        );
        Ok(response)
    }

    fn timeout_error(&self, name: &str) -> SweepError {
        SweepError::endpoint(
            name,
            format!("timed out after {}s", self.timeout.as_secs_f64()),
        )
    }
}

impl std::fmt::Debug for StoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreClient")
            .field("endpoints", &self.endpoint_names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
