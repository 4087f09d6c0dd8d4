//! Embedded in-memory triple store
//!
//! Wraps an `oxigraph` store behind the direct query/update capability.
//! Queries see the union of all graphs as their default graph, matching
//! the behavior of the deployed remote stores.

use async_trait::async_trait;
use oxigraph::model::Term;
use oxigraph::sparql::{Query, QueryResults};
use oxigraph::store::Store;
use sweep_core::{DirectEndpoint, RawRow, RawTerm, Result, StoreEndpoint, SweepError};

/// In-memory store for dry runs, demos and tests
#[derive(Clone)]
pub struct MemoryEndpoint {
    name: String,
    store: Store,
}

impl MemoryEndpoint {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let store = Store::new()
            .map_err(|e| SweepError::endpoint(&name, format!("store init failed: {e}")))?;
        Ok(Self { name, store })
    }

    /// Number of quads currently held
    pub fn len(&self) -> Result<usize> {
        self.store
            .len()
            .map_err(|e| SweepError::endpoint(&self.name, e.to_string()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn raw_term(term: &Term) -> RawTerm {
    match term {
        Term::NamedNode(node) => RawTerm::iri(node.as_str()),
        Term::BlankNode(node) => RawTerm::blank(node.as_str()),
        Term::Literal(literal) => RawTerm {
            kind: Some("literal".to_string()),
            value: Some(literal.value().to_string()),
            datatype: Some(literal.datatype().as_str().to_string()),
            lang: literal.language().map(str::to_string),
        },
        #[allow(unreachable_patterns)]
        _ => RawTerm::default(),
    }
}

#[async_trait]
impl DirectEndpoint for MemoryEndpoint {
    async fn direct_query(&self, statement: &str) -> Result<Vec<RawRow>> {
        let mut query = Query::parse(statement, None)
            .map_err(|e| SweepError::endpoint(&self.name, format!("invalid query: {e}")))?;
        query.dataset_mut().set_default_graph_as_union();

        let results = self
            .store
            .query(query)
            .map_err(|e| SweepError::endpoint(&self.name, format!("evaluation failed: {e}")))?;

        match results {
            QueryResults::Solutions(solutions) => solutions
                .map(|solution| {
                    let solution = solution
                        .map_err(|e| SweepError::endpoint(&self.name, e.to_string()))?;
                    Ok(solution
                        .iter()
                        .map(|(variable, term)| (variable.as_str().to_string(), raw_term(term)))
                        .collect::<RawRow>())
                })
                .collect(),
            QueryResults::Boolean(_) | QueryResults::Graph(_) => Ok(Vec::new()),
        }
    }

    async fn direct_update(&self, statement: &str) -> Result<String> {
        self.store
            .update(statement)
            .map_err(|e| SweepError::endpoint(&self.name, format!("update failed: {e}")))?;
        Ok(String::new())
    }
}

impl StoreEndpoint for MemoryEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn direct(&self) -> Option<&dyn DirectEndpoint> {
        Some(self)
    }
}
