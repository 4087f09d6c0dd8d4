//! Copy-of link maintenance
//!
//! Links record that a local entity duplicates an entity of another
//! installation. They live in the merge graph of the ontology mapping.

use serde::{Deserialize, Serialize};
use sweep_core::{Binding, Result, ResultShape};
use sweep_query::{LinkPair, StatementBuilder};
use sweep_store::{EndpointFailure, ExecutionOutcome, StoreClient};

use crate::Listing;

/// Link count summed over all endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCount {
    pub total: u64,
    pub failures: Vec<EndpointFailure>,
}

/// Inserts, counts, lists and deletes copy-of links
#[derive(Debug, Clone)]
pub struct LinkManager {
    store: StoreClient,
    builder: StatementBuilder,
}

impl LinkManager {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self { store, builder }
    }

    /// Insert one link per pair on every endpoint
    pub async fn insert(&self, pairs: &[LinkPair]) -> Result<Vec<ExecutionOutcome>> {
        let descriptor = self.builder.insert_links_query(pairs)?;
        let outcomes = self.store.execute_update(&descriptor).await;
        tracing::info!(links = pairs.len(), endpoints = outcomes.len(), "links inserted");
        Ok(outcomes)
    }

    /// Count links, optionally only those pointing below `prefix`.
    ///
    /// Counts from several endpoints are added up; a link present on two
    /// endpoints is counted twice.
    pub async fn count(&self, prefix: Option<&str>) -> Result<LinkCount> {
        let descriptor = self.builder.count_links_query(prefix)?;
        let output = self.store.execute(&descriptor, ResultShape::Column).await;

        let total = output
            .results
            .column("cnt")
            .unwrap_or_default()
            .iter()
            .filter_map(Binding::as_literal)
            .filter_map(|count| count.trim().parse::<u64>().ok())
            .sum();

        Ok(LinkCount {
            total,
            failures: output.failures,
        })
    }

    /// List links, optionally only those pointing below `prefix`
    pub async fn list(&self, prefix: Option<&str>) -> Result<Listing<LinkPair>> {
        let descriptor = self.builder.linked_entities_query(prefix)?;
        let output = self.store.execute(&descriptor, ResultShape::Row).await;

        let items = output
            .results
            .rows()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| {
                let local = row.get("s").and_then(Binding::as_reference)?;
                let external = row.get("o").and_then(Binding::as_reference)?;
                Some(LinkPair::new(local.clone(), external.clone()))
            })
            .collect();

        Ok(Listing {
            items,
            failures: output.failures,
        })
    }

    /// Delete links, optionally only those pointing below `prefix`
    pub async fn delete(&self, prefix: Option<&str>) -> Result<Vec<ExecutionOutcome>> {
        let descriptor = self.builder.delete_copy_of_query(prefix)?;
        let outcomes = self.store.execute_update(&descriptor).await;
        tracing::info!(prefix = prefix.unwrap_or(""), endpoints = outcomes.len(), "links deleted");
        Ok(outcomes)
    }
}
