//! Duplicate entity lookup
//!
//! Entities of one class hierarchy are grouped by their appellation value.
//! Each entity is resolved and rendered through an [`EntityResolver`];
//! entities that fail either step are left out of the groups.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use sweep_core::{Binding, EntityResolver, NodeRef, Result, ResultShape};
use sweep_query::{FilterOptions, StatementBuilder};
use sweep_store::{EndpointFailure, StoreClient};

/// Entities grouped by appellation value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// appellation value → entity → rendered display form
    pub groups: BTreeMap<String, BTreeMap<NodeRef, String>>,

    /// Entities that could not be resolved or rendered
    pub unresolved: Vec<NodeRef>,

    pub failures: Vec<EndpointFailure>,
}

impl DuplicateReport {
    /// Groups holding more than one entity
    pub fn duplicates(&self) -> impl Iterator<Item = (&String, &BTreeMap<NodeRef, String>)> {
        self.groups.iter().filter(|(_, entities)| entities.len() > 1)
    }

    pub fn entity_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }
}

/// Looks up entities sharing an appellation
#[derive(Clone)]
pub struct DuplicateFinder {
    store: StoreClient,
    builder: StatementBuilder,
    resolver: Arc<dyn EntityResolver>,
}

impl DuplicateFinder {
    pub fn new(store: StoreClient, builder: StatementBuilder, resolver: Arc<dyn EntityResolver>) -> Self {
        Self {
            store,
            builder,
            resolver,
        }
    }

    /// Entities under `class` matching `filters`, grouped by appellation
    pub async fn find(
        &self,
        class: &NodeRef,
        filters: &BTreeMap<String, Vec<String>>,
    ) -> Result<DuplicateReport> {
        self.find_with(class, filters, &FilterOptions::default()).await
    }

    pub async fn find_with(
        &self,
        class: &NodeRef,
        filters: &BTreeMap<String, Vec<String>>,
        options: &FilterOptions,
    ) -> Result<DuplicateReport> {
        let descriptor = self.builder.appellation_query_with(class, filters, options)?;
        let output = self.store.execute(&descriptor, ResultShape::Row).await;

        let mut report = DuplicateReport {
            failures: output.failures,
            ..Default::default()
        };

        for row in output.results.rows().unwrap_or_default() {
            let Some(entity) = row.get("o").and_then(Binding::as_reference) else {
                continue;
            };
            let leaf = match row.get("leaf") {
                Some(Binding::Literal(value)) => value.clone(),
                Some(Binding::Reference(node)) => node.iri().to_string(),
                _ => continue,
            };

            match self.display(entity).await {
                Some(display) => {
                    report
                        .groups
                        .entry(leaf)
                        .or_default()
                        .insert(entity.clone(), display);
                }
                None => {
                    if !report.unresolved.contains(entity) {
                        report.unresolved.push(entity.clone());
                    }
                }
            }
        }

        tracing::info!(
            class = %class,
            groups = report.groups.len(),
            duplicates = report.duplicates().count(),
            unresolved = report.unresolved.len(),
            "duplicate lookup finished"
        );
        Ok(report)
    }

    async fn display(&self, entity: &NodeRef) -> Option<String> {
        let record = match self.resolver.resolve(entity).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(entity = %entity, error = %e, "resolve failed");
                return None;
            }
        };
        match self.resolver.render(&record).await {
            Ok(display) => display,
            Err(e) => {
                tracing::debug!(entity = %entity, error = %e, "render failed");
                None
            }
        }
    }
}

impl std::fmt::Debug for DuplicateFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateFinder")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Store-backed resolver
// ============================================================================

/// Resolves a node into the statements it is the subject of
///
/// Records are JSON objects keyed by predicate IRI, each holding the list of
/// object values. Rendering joins them into one `predicate: values` line per
/// predicate.
#[derive(Debug, Clone)]
pub struct StoreResolver {
    store: StoreClient,
    builder: StatementBuilder,
}

impl StoreResolver {
    pub fn new(store: StoreClient, builder: StatementBuilder) -> Self {
        Self { store, builder }
    }
}

#[async_trait]
impl EntityResolver for StoreResolver {
    async fn resolve(&self, node: &NodeRef) -> Result<Option<Value>> {
        let descriptor = self.builder.outgoing_statements_query(node);
        let output = self.store.execute(&descriptor, ResultShape::Row).await;

        let mut record = Map::new();
        for row in output.results.rows().unwrap_or_default() {
            let Some(predicate) = row.get("p").and_then(Binding::as_reference) else {
                continue;
            };
            let value = match row.get("o") {
                Some(Binding::Missing) | None => continue,
                Some(other) => Value::String(other.to_string()),
            };
            if let Value::Array(values) = record
                .entry(predicate.iri().to_string())
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                values.push(value);
            }
        }

        if record.is_empty() {
            return Ok(None);
        }
        record.insert("@id".to_string(), Value::String(node.iri().to_string()));
        Ok(Some(Value::Object(record)))
    }

    async fn render(&self, record: &Value) -> Result<Option<String>> {
        let Some(object) = record.as_object() else {
            return Ok(None);
        };
        let lines = object
            .iter()
            .filter(|(key, _)| key.as_str() != "@id")
            .map(|(predicate, values)| {
                let values = match values {
                    Value::Array(items) => items
                        .iter()
                        .filter_map(Value::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                    other => other.to_string(),
                };
                format!("{predicate}: {values}")
            })
            .collect::<Vec<_>>();
        Ok(Some(lines.join("\n")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::{DirectEndpoint, Ontology, OntologyKey, StoreEndpoint, SweepError};
    use sweep_store::MemoryEndpoint;

    const DATA: &str = "\
        <http://ex.org/Writer> <http://ex.org/subClassOf> <http://ex.org/Person> . \
        <http://ex.org/identifiedBy> a <http://ex.org/Property> . \
        <http://ex.org/Name> a <http://ex.org/Class> . \
        <http://ex.org/hasValue> a <http://ex.org/DatatypeProperty> . \
        <http://ex.org/p1> a <http://ex.org/Person> . \
        <http://ex.org/p1> <http://ex.org/identifiedBy> <http://ex.org/n1> . \
        <http://ex.org/n1> a <http://ex.org/Name> . \
        <http://ex.org/n1> <http://ex.org/hasValue> \"Goethe\" . \
        <http://ex.org/p2> a <http://ex.org/Writer> . \
        <http://ex.org/p2> <http://ex.org/identifiedBy> <http://ex.org/n2> . \
        <http://ex.org/n2> a <http://ex.org/Name> . \
        <http://ex.org/n2> <http://ex.org/hasValue> \"Goethe\" . \
        <http://ex.org/p3> a <http://ex.org/Person> . \
        <http://ex.org/p3> <http://ex.org/identifiedBy> <http://ex.org/n3> . \
        <http://ex.org/n3> a <http://ex.org/Name> . \
        <http://ex.org/n3> <http://ex.org/hasValue> \"Schiller\" . ";

    fn builder() -> StatementBuilder {
        let ontology = Ontology::default()
            .with(OntologyKey::SubClassOf, "http://ex.org/subClassOf")
            .and_then(|o| o.with(OntologyKey::SubPropertyOf, "http://ex.org/subPropertyOf"))
            .and_then(|o| o.with(OntologyKey::IsIdentifiedBy, "http://ex.org/identifiedBy"))
            .and_then(|o| o.with(OntologyKey::Appellation, "http://ex.org/Name"))
            .and_then(|o| o.with(OntologyKey::DatatypeProperty, "http://ex.org/DatatypeProperty"))
            .unwrap();
        StatementBuilder::new(Arc::new(ontology))
    }

    async fn store() -> StoreClient {
        let endpoint = MemoryEndpoint::new("mem").unwrap();
        endpoint
            .direct_update(&format!("INSERT DATA {{ GRAPH <http://ex.org/g> {{ {DATA} }} }}"))
            .await
            .unwrap();
        StoreClient::new(vec![Arc::new(endpoint) as Arc<dyn StoreEndpoint>])
    }

    /// Resolves every node except the listed ones
    struct Picky {
        refuse: Vec<NodeRef>,
    }

    #[async_trait]
    impl EntityResolver for Picky {
        async fn resolve(&self, node: &NodeRef) -> Result<Option<Value>> {
            if self.refuse.contains(node) {
                return Err(SweepError::InvalidArgument("not found".to_string()));
            }
            Ok(Some(Value::String(node.iri().to_string())))
        }

        async fn render(&self, record: &Value) -> Result<Option<String>> {
            Ok(record.as_str().map(|s| format!("<a href=\"{s}\">{s}</a>")))
        }
    }

    fn node(iri: &str) -> NodeRef {
        NodeRef::new(iri).unwrap()
    }

    #[tokio::test]
    async fn test_groups_by_appellation_across_subclasses() {
        let store = store().await;
        let finder = DuplicateFinder::new(store, builder(), Arc::new(Picky { refuse: Vec::new() }));

        let report = finder
            .find(&node("http://ex.org/Person"), &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.groups["Goethe"].len(), 2);
        assert!(report.groups["Goethe"].contains_key(&node("http://ex.org/p2")));
        assert_eq!(report.duplicates().count(), 1);
        assert_eq!(report.entity_count(), 3);
    }

    #[tokio::test]
    async fn test_filters_restrict_values() {
        let store = store().await;
        let finder = DuplicateFinder::new(store, builder(), Arc::new(Picky { refuse: Vec::new() }));

        let filters = BTreeMap::from([("leaf".to_string(), vec!["Schiller".to_string()])]);
        let report = finder.find(&node("http://ex.org/Person"), &filters).await.unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(
            report.groups["Schiller"][&node("http://ex.org/p3")],
            "<a href=\"http://ex.org/p3\">http://ex.org/p3</a>"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_entities_are_omitted() {
        let store = store().await;
        let resolver = Picky {
            refuse: vec![node("http://ex.org/p1")],
        };
        let finder = DuplicateFinder::new(store, builder(), Arc::new(resolver));

        let report = finder
            .find(&node("http://ex.org/Person"), &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(report.groups["Goethe"].len(), 1);
        assert_eq!(report.unresolved, vec![node("http://ex.org/p1")]);
        assert_eq!(report.duplicates().count(), 0);
    }

    #[tokio::test]
    async fn test_store_resolver_describes_node() {
        let store = store().await;
        let resolver = StoreResolver::new(store, builder());

        let record = resolver.resolve(&node("http://ex.org/n3")).await.unwrap().unwrap();
        assert_eq!(record["@id"], "http://ex.org/n3");
        assert_eq!(record["http://ex.org/hasValue"][0], "Schiller");

        let display = resolver.render(&record).await.unwrap().unwrap();
        assert!(display.contains("http://ex.org/hasValue: Schiller"));
        assert!(!display.contains("@id"));

        assert!(resolver.resolve(&node("http://ex.org/nothing")).await.unwrap().is_none());
    }
}
