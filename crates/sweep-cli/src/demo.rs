//! In-memory demo store
//!
//! Seeds an embedded store with a few books so every command can be tried
//! without a running triple store.

use std::collections::BTreeMap;
use std::sync::Arc;
use sweep_cleanup::Sweeper;
use sweep_core::{AppConfig, DirectEndpoint, GraphMode, Ontology, StoreEndpoint};
use sweep_query::StatementBuilder;
use sweep_store::{MemoryEndpoint, StoreClient};

pub const DEMO_GRAPH: &str = "http://demo-data.org/";

const ECRM: &str = "http://erlangen-crm.org/170309/";

const SEED: &str = r#"
PREFIX ecrm: <http://erlangen-crm.org/170309/>
PREFIX demo: <http://demo-ontology.org/>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX owl: <http://www.w3.org/2002/07/owl#>
INSERT DATA {
  GRAPH <http://demo-data.org/> {
    <http://demo-data.org/book1> a ecrm:E1_CRM_Entity .
    <http://demo-data.org/book2> a ecrm:E1_CRM_Entity .
    <http://demo-data.org/book3> a ecrm:E1_CRM_Entity .
    <http://demo-data.org/book4> a ecrm:E1_CRM_Entity .
    <http://demo-data.org/book5> a ecrm:E1_CRM_Entity .
    <http://demo-data.org/book6> a ecrm:E1_CRM_Entity .

    <http://demo-data.org/book1> demo:P01_copy_of <http://demo-data.org/book2> .
    <http://demo-data.org/book2> demo:P01_copy_of <http://demo-data.org/book3> .

    <http://demo-data.org/book1> ecrm:P3_has_note "Book 1" .
    <http://demo-data.org/book2> ecrm:P3_has_note "Book 2" .
    <http://demo-data.org/book3> ecrm:P3_has_note "Book 3" .
    <http://demo-data.org/book4> ecrm:P3_has_note "Book 4" .
    <http://demo-data.org/book5> ecrm:P3_has_note "Book 5" .
    <http://demo-data.org/book6> ecrm:P3_has_note "Book 6" .

    <http://demo-data.org/book4> ecrm:P1_is_identified_by <http://demo-data.org/title4> .
    <http://demo-data.org/title4> a ecrm:E35_Title .
    <http://demo-data.org/title4> demo:has_value "Faust" .
    <http://demo-data.org/book5> ecrm:P1_is_identified_by <http://demo-data.org/title5> .
    <http://demo-data.org/title5> a ecrm:E35_Title .
    <http://demo-data.org/title5> demo:has_value "Faust" .
  }
  GRAPH <http://erlangen-crm.org/170309/> {
    <http://erlangen-crm.org/170309/> a owl:Ontology .
    ecrm:E1_CRM_Entity a owl:Class .
    ecrm:E41_Appellation a owl:Class .
    ecrm:E35_Title a owl:Class .
    ecrm:E35_Title rdfs:subClassOf ecrm:E41_Appellation .
    demo:has_value a owl:DatatypeProperty .
  }
  GRAPH <http://demo-ontology.org/peers> {
    <http://peer.demo-data.org/> a demo:Installation ;
      ecrm:P3_has_note "Peer archive" ;
      demo:has_url "https://peer.demo-data.org" ;
      demo:has_uri_prefix "http://peer.demo-data.org/" .
  }
}
"#;

/// Ontology matching the seeded data
fn demo_ontology() -> sweep_core::Result<Ontology> {
    let terms = [
        ("subClassOf", "http://www.w3.org/2000/01/rdf-schema#subClassOf".to_string()),
        ("subPropertyOf", "http://www.w3.org/2000/01/rdf-schema#subPropertyOf".to_string()),
        ("is_identified_by", format!("{ECRM}P1_is_identified_by")),
        ("appellation", format!("{ECRM}E41_Appellation")),
        ("datatypeProperty", "http://www.w3.org/2002/07/owl#DatatypeProperty".to_string()),
        ("copy_of", "http://demo-ontology.org/P01_copy_of".to_string()),
        ("graph", "http://demo-ontology.org/links".to_string()),
        ("class", "http://www.w3.org/2002/07/owl#Class".to_string()),
        ("crm", ECRM.to_string()),
        ("wisski", "http://demo-ontology.org/Installation".to_string()),
        ("has_note", format!("{ECRM}P3_has_note")),
        ("has_url", "http://demo-ontology.org/has_url".to_string()),
        ("has_uri_prefix", "http://demo-ontology.org/has_uri_prefix".to_string()),
    ];
    Ontology::from_map(
        terms
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// A sweeper over a freshly seeded in-memory store
pub async fn sweeper(config: &AppConfig) -> anyhow::Result<Sweeper> {
    let endpoint = MemoryEndpoint::new("demo")?;
    endpoint.direct_update(SEED).await?;
    tracing::info!(quads = endpoint.len()?, graph = DEMO_GRAPH, "demo store seeded");

    let ontology = if config.ontology.is_empty() {
        demo_ontology()?
    } else {
        config.ontology.clone()
    };
    let builder = StatementBuilder::new(Arc::new(ontology)).with_graph_mode(GraphMode::Quads);
    let store = StoreClient::new(vec![Arc::new(endpoint) as Arc<dyn StoreEndpoint>]);

    Ok(Sweeper::new(store, builder).with_cascade(config.cascade.clone()))
}
