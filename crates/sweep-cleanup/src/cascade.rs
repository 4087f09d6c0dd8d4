//! Cascading deletion
//!
//! Starting from confirmed roots, every layer of referenced nodes is
//! discovered one hop at a time. Only when discovery has finished are the
//! layers deleted, deepest first, so that no layer loses its outgoing
//! statements before everything below it has been removed.
//!
//! Nodes already scheduled are not scheduled again, which makes cyclic
//! reference chains terminate. A chain deeper than the configured bound
//! fails with [`SweepError::CascadeTooDeep`] before any statement is
//! issued.
//!
//! When an endpoint fails while looking for a layer's references, that
//! layer and every shallower one are left in place. Their outgoing
//! statements are the only path to the undiscovered nodes, so a re-run
//! can still find them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use sweep_core::{Binding, CascadeConfig, NodeRef, Result, ResultShape, SweepError};
use sweep_query::StatementBuilder;
use sweep_store::{all_applied, EndpointFailure, ExecutionOutcome, StoreClient};

use crate::scan::ConfirmedSelection;

// ============================================================================
// Reports
// ============================================================================

/// What happened to one layer of the cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerReport {
    /// Hops from the roots; roots are depth 0
    pub depth: usize,
    pub nodes: BTreeSet<NodeRef>,

    /// Endpoints that failed while looking for this layer's references
    pub discovery_failures: Vec<EndpointFailure>,

    /// One outcome per endpoint for this layer's delete statement
    pub outcomes: Vec<ExecutionOutcome>,

    /// Set when the delete was not issued because discovery at or below
    /// this layer is incomplete
    #[serde(default)]
    pub skipped: bool,
}

impl LayerReport {
    fn new(depth: usize, nodes: BTreeSet<NodeRef>) -> Self {
        Self {
            depth,
            nodes,
            discovery_failures: Vec::new(),
            outcomes: Vec::new(),
            skipped: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.skipped && self.discovery_failures.is_empty() && all_applied(&self.outcomes)
    }
}

/// Per-layer record of one cascade run, ordered by depth
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CascadeReport {
    pub layers: Vec<LayerReport>,
}

impl CascadeReport {
    /// True when every discovery and every delete succeeded on every endpoint
    pub fn is_complete(&self) -> bool {
        self.layers.iter().all(LayerReport::is_complete)
    }

    /// Number of nodes whose delete statement was issued
    pub fn node_count(&self) -> usize {
        self.layers
            .iter()
            .filter(|l| !l.skipped)
            .map(|l| l.nodes.len())
            .sum()
    }

    /// Layers left in place because discovery did not finish
    pub fn skipped_layers(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers.iter().filter(|l| l.skipped)
    }

    pub fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    /// Layers with at least one failure, for operator follow-up
    pub fn incomplete_layers(&self) -> impl Iterator<Item = &LayerReport> {
        self.layers.iter().filter(|l| !l.is_complete())
    }
}

// ============================================================================
// Deleter
// ============================================================================

/// Deletes confirmed nodes and everything they transitively reference
#[derive(Debug, Clone)]
pub struct CascadeDeleter {
    store: StoreClient,
    builder: StatementBuilder,
    max_depth: usize,
}

impl CascadeDeleter {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self {
            store,
            builder,
            max_depth: CascadeConfig::default().max_depth,
        }
    }

    pub fn with_config(mut self, config: &CascadeConfig) -> Self {
        self.max_depth = config.max_depth;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Delete the nodes an operator confirmed after a scan
    pub async fn delete_selection(&self, selection: &ConfirmedSelection) -> Result<CascadeReport> {
        tracing::info!(
            scan = %selection.scan_id,
            graph = %selection.graph,
            roots = selection.len(),
            "deleting confirmed selection"
        );
        self.delete(&selection.nodes).await
    }

    /// Delete `roots` and their descendants. An empty root set is a no-op.
    ///
    /// Layers at or above the deepest layer whose discovery failed are
    /// reported as skipped and keep their statements.
    pub async fn delete(&self, roots: &BTreeSet<NodeRef>) -> Result<CascadeReport> {
        let mut layers = self.discover(roots).await?;

        let held_back = layers
            .iter()
            .filter(|l| !l.discovery_failures.is_empty())
            .map(|l| l.depth)
            .max();

        for layer in layers.iter_mut().rev() {
            if held_back.is_some_and(|depth| layer.depth <= depth) {
                tracing::warn!(depth = layer.depth, nodes = layer.nodes.len(), "layer skipped, discovery incomplete");
                layer.skipped = true;
                continue;
            }
            let descriptor = self.builder.delete_nodes_query(&layer.nodes)?;
            tracing::debug!(depth = layer.depth, statement = %descriptor.statement, "delete layer");
            layer.outcomes = self.store.execute_update(&descriptor).await;
            tracing::info!(
                depth = layer.depth,
                nodes = layer.nodes.len(),
                applied = all_applied(&layer.outcomes),
                "layer deleted"
            );
        }

        Ok(CascadeReport { layers })
    }

    /// Find every layer below `roots` without deleting anything
    pub async fn discover(&self, roots: &BTreeSet<NodeRef>) -> Result<Vec<LayerReport>> {
        if roots.is_empty() {
            return Ok(Vec::new());
        }

        let mut visited = roots.clone();
        let mut layers = vec![LayerReport::new(0, roots.clone())];

        loop {
            let Some(current) = layers.last_mut() else {
                break;
            };
            let descriptor = self.builder.linked_nodes_query(&current.nodes)?;
            let output = self.store.execute(&descriptor, ResultShape::Column).await;
            current.discovery_failures = output.failures;

            let next: BTreeSet<NodeRef> = output
                .results
                .column("o")
                .unwrap_or_default()
                .iter()
                .filter_map(Binding::as_reference)
                .filter(|node| !visited.contains(*node))
                .cloned()
                .collect();

            if next.is_empty() {
                break;
            }

            let depth = layers.len();
            if depth > self.max_depth {
                tracing::warn!(max_depth = self.max_depth, pending = next.len(), "cascade too deep");
                return Err(SweepError::CascadeTooDeep {
                    max_depth: self.max_depth,
                    pending: next.len(),
                });
            }

            tracing::debug!(depth, nodes = next.len(), "discovered layer");
            visited.extend(next.iter().cloned());
            layers.push(LayerReport::new(depth, next));
        }

        Ok(layers)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use sweep_core::{Ontology, StoreEndpoint};
    use sweep_store::MemoryEndpoint;

    fn node(iri: &str) -> NodeRef {
        NodeRef::new(format!("http://ex.org/{iri}")).unwrap()
    }

    async fn store_with(triples: &str) -> StoreClient {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        sweep_core::DirectEndpoint::direct_update(
            &endpoint,
            &format!("INSERT DATA {{ GRAPH <http://ex.org/g> {{ {triples} }} }}"),
        )
        .await
        .unwrap();
        StoreClient::new(vec![Arc::new(endpoint) as Arc<dyn StoreEndpoint>])
    }

    fn deleter(store: StoreClient) -> CascadeDeleter {
        let builder = StatementBuilder::new(Arc::new(Ontology::default()))
            .with_graph_mode(sweep_core::GraphMode::Quads);
        CascadeDeleter::new(store, builder)
    }

    #[tokio::test]
    async fn test_empty_roots_are_a_no_op() {
        let store = store_with("<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> .").await;
        let report = deleter(store).delete(&BTreeSet::new()).await.unwrap();
        assert!(report.layers.is_empty());
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_discover_layers_by_hop() {
        let store = store_with(
            "<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> . \
             <http://ex.org/a> <http://ex.org/p> <http://ex.org/c> . \
             <http://ex.org/b> <http://ex.org/p> <http://ex.org/d> . \
             <http://ex.org/b> <http://ex.org/name> \"literal\" .",
        )
        .await;

        let layers = deleter(store)
            .discover(&BTreeSet::from([node("a")]))
            .await
            .unwrap();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[1].nodes, BTreeSet::from([node("b"), node("c")]));
        assert_eq!(layers[2].nodes, BTreeSet::from([node("d")]));
        assert!(layers.iter().all(|l| l.outcomes.is_empty()));
    }

    #[tokio::test]
    async fn test_shared_descendant_is_scheduled_once() {
        let store = store_with(
            "<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> . \
             <http://ex.org/a> <http://ex.org/p> <http://ex.org/c> . \
             <http://ex.org/b> <http://ex.org/p> <http://ex.org/c> .",
        )
        .await;

        let layers = deleter(store)
            .discover(&BTreeSet::from([node("a")]))
            .await
            .unwrap();

        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].nodes, BTreeSet::from([node("b"), node("c")]));
    }

    #[tokio::test]
    async fn test_report_summaries() {
        let store = store_with(
            "<http://ex.org/a> <http://ex.org/p> <http://ex.org/b> . \
             <http://ex.org/b> <http://ex.org/p> <http://ex.org/c> .",
        )
        .await;

        let report = deleter(store)
            .delete(&BTreeSet::from([node("a")]))
            .await
            .unwrap();

        assert_eq!(report.node_count(), 3);
        assert_eq!(report.depth(), 2);
        assert!(report.is_complete());
        assert_eq!(report.incomplete_layers().count(), 0);
        assert!(report.layers.iter().all(|l| l.outcomes.len() == 1));
    }
}
