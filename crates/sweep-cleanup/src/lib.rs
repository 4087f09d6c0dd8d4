//! Sweep Cleanup - Store hygiene operations
//!
//! Finds isolated nodes, removes confirmed nodes together with everything
//! they reference, looks up duplicate entities and maintains the copy-of
//! links between installations.
//!
//! Author: hephaex@gmail.com

pub mod cascade;
pub mod catalog;
pub mod duplicates;
pub mod links;
pub mod scan;

pub use cascade::{CascadeDeleter, CascadeReport, LayerReport};
pub use catalog::{Catalog, PeerInstallation};
pub use duplicates::{DuplicateFinder, DuplicateReport, StoreResolver};
pub use links::{LinkCount, LinkManager};
pub use scan::{ConfirmedSelection, IsolationRecord, IsolationScanner, ScanPhase, ScanReport};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use sweep_core::{AppConfig, CascadeConfig, EntityResolver, Ontology, Result};
use sweep_query::StatementBuilder;
use sweep_store::{EndpointFailure, StoreClient};

/// Items read from the store plus the endpoints that failed to answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub failures: Vec<EndpointFailure>,
}

impl<T> Listing<T> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

// ============================================================================
// Sweeper
// ============================================================================

/// Entry point bundling the store client and statement builder shared by
/// every operation
#[derive(Debug, Clone)]
pub struct Sweeper {
    store: StoreClient,
    builder: StatementBuilder,
    cascade: CascadeConfig,
}

impl Sweeper {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self {
            store,
            builder,
            cascade: CascadeConfig::default(),
        }
    }

    /// Build HTTP endpoints and the statement builder from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = StoreClient::from_config(&config.store, &config.credential_store())?;
        let builder = StatementBuilder::new(Arc::new(config.ontology.clone()))
            .with_graph_mode(config.store.graph_mode);
        tracing::debug!(endpoints = ?store.endpoint_names(), "store client ready");
        Ok(Self::new(store, builder).with_cascade(config.cascade.clone()))
    }

    pub fn with_cascade(mut self, cascade: CascadeConfig) -> Self {
        self.cascade = cascade;
        self
    }

    pub fn store(&self) -> &StoreClient {
        &self.store
    }

    pub fn ontology(&self) -> &Ontology {
        self.builder.ontology()
    }

    pub fn scanner(&self) -> IsolationScanner {
        IsolationScanner::new(self.store.clone(), self.builder.clone())
    }

    pub fn deleter(&self) -> CascadeDeleter {
        CascadeDeleter::new(self.store.clone(), self.builder.clone()).with_config(&self.cascade)
    }

    pub fn links(&self) -> LinkManager {
        LinkManager::new(self.store.clone(), self.builder.clone())
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(self.store.clone(), self.builder.clone())
    }

    /// Duplicate lookup through `resolver`
    pub fn duplicates(&self, resolver: Arc<dyn EntityResolver>) -> DuplicateFinder {
        DuplicateFinder::new(self.store.clone(), self.builder.clone(), resolver)
    }

    /// Duplicate lookup that describes entities from the store itself
    pub fn store_duplicates(&self) -> DuplicateFinder {
        let resolver = StoreResolver::new(self.store.clone(), self.builder.clone());
        self.duplicates(Arc::new(resolver))
    }
}
