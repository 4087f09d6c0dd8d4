//! Store catalog: graphs, peer installations and CRM classes

use serde::{Deserialize, Serialize};
use sweep_core::{Binding, NodeRef, Result, ResultShape};
use sweep_query::StatementBuilder;
use sweep_store::StoreClient;

use crate::Listing;

/// Another installation sharing the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInstallation {
    pub name: String,
    pub uri: NodeRef,
    pub url: String,
    pub prefix: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    store: StoreClient,
    builder: StatementBuilder,
}

impl Catalog {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self { store, builder }
    }

    /// Named graphs that hold data and can be scanned
    pub async fn graphs(&self) -> Result<Listing<NodeRef>> {
        let descriptor = self.builder.graphs_query();
        Ok(self.references(&descriptor, "g").await)
    }

    /// Classes declared in the CRM graph
    pub async fn crm_classes(&self) -> Result<Listing<NodeRef>> {
        let descriptor = self.builder.crm_classes_query()?;
        Ok(self.references(&descriptor, "class").await)
    }

    pub async fn peers(&self) -> Result<Listing<PeerInstallation>> {
        let descriptor = self.builder.peer_info_query()?;
        let output = self.store.execute(&descriptor, ResultShape::Row).await;

        let items = output
            .results
            .rows()
            .unwrap_or_default()
            .iter()
            .filter_map(|row| {
                let text = |key: &str| row.get(key).and_then(Binding::as_literal).map(str::to_string);
                Some(PeerInstallation {
                    name: text("name")?,
                    uri: row.get("uri").and_then(Binding::as_reference)?.clone(),
                    url: text("url").unwrap_or_default(),
                    prefix: text("prefix").unwrap_or_default(),
                })
            })
            .collect();

        Ok(Listing {
            items,
            failures: output.failures,
        })
    }

    async fn references(&self, descriptor: &sweep_core::QueryDescriptor, variable: &str) -> Listing<NodeRef> {
        let output = self.store.execute(descriptor, ResultShape::Column).await;
        let mut items: Vec<NodeRef> = output
            .results
            .column(variable)
            .unwrap_or_default()
            .iter()
            .filter_map(Binding::as_reference)
            .cloned()
            .collect();
        items.sort();
        items.dedup();

        Listing {
            items,
            failures: output.failures,
        }
    }
}
