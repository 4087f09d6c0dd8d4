//! SPARQL 1.1 Protocol endpoint over HTTP
//!
//! Reads are posted as `query=` form bodies and answered in the SPARQL JSON
//! results format; updates are posted as `update=` form bodies.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use sweep_core::{
    CredentialStore, Credentials, DirectEndpoint, EndpointConfig, RawRow, Result, StoreEndpoint,
    SweepError,
};

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Remote triple store reachable through the SPARQL protocol
pub struct HttpEndpoint {
    name: String,
    query_url: Url,
    update_url: Url,
    client: Client,
    credentials: Option<Credentials>,
    direct: bool,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    results: Option<SparqlBindings>,
}

#[derive(Debug, Deserialize)]
struct SparqlBindings {
    #[serde(default)]
    bindings: Vec<RawRow>,
}

impl HttpEndpoint {
    /// Create an endpoint from its configuration
    pub fn new(config: &EndpointConfig, timeout: Duration) -> Result<Self> {
        let query_url = parse_url(&config.name, &config.query_url)?;
        let update_url = parse_url(&config.name, config.update_url())?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| SweepError::endpoint(&config.name, format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            name: config.name.clone(),
            query_url,
            update_url,
            client,
            credentials: None,
            direct: config.direct,
        })
    }

    /// Attach credentials for the endpoint's host, if the store has any
    pub fn with_credentials(mut self, store: &dyn CredentialStore) -> Self {
        self.credentials = self
            .query_url
            .host_str()
            .and_then(|host| store.credentials(host));
        if self.credentials.is_some() {
            tracing::debug!(endpoint = %self.name, "using basic auth");
        }
        self
    }

    fn post(&self, url: &Url) -> reqwest::RequestBuilder {
        let request = self.client.post(url.clone());
        match &self.credentials {
            Some(creds) => request.basic_auth(&creds.user, Some(&creds.password)),
            None => request,
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SweepError::endpoint(
            &self.name,
            format!("HTTP {status}: {}", body.trim()),
        ))
    }
}

#[async_trait]
impl DirectEndpoint for HttpEndpoint {
    async fn direct_query(&self, statement: &str) -> Result<Vec<RawRow>> {
        let response = self
            .post(&self.query_url)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .form(&[("query", statement)])
            .send()
            .await
            .map_err(|e| SweepError::endpoint(&self.name, format!("Request failed: {e}")))?;

        let response = self.check(response).await?;
        let parsed: SparqlResults = response
            .json()
            .await
            .map_err(|e| SweepError::endpoint(&self.name, format!("Failed to parse results: {e}")))?;

        Ok(parsed.results.map(|r| r.bindings).unwrap_or_default())
    }

    async fn direct_update(&self, statement: &str) -> Result<String> {
        let response = self
            .post(&self.update_url)
            .form(&[("update", statement)])
            .send()
            .await
            .map_err(|e| SweepError::endpoint(&self.name, format!("Request failed: {e}")))?;

        let response = self.check(response).await?;
        response
            .text()
            .await
            .map_err(|e| SweepError::endpoint(&self.name, format!("Failed to read response: {e}")))
    }
}

impl StoreEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    fn direct(&self) -> Option<&dyn DirectEndpoint> {
        if self.direct {
            Some(self)
        } else {
            None
        }
    }
}

fn parse_url(name: &str, url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| SweepError::Configuration(format!("endpoint {name}: invalid URL {url:?}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use sweep_core::{CredentialEntry, StaticCredentials};

    const RESULTS: &str = r#"{
        "head": { "vars": ["o", "leaf"] },
        "results": { "bindings": [
            { "o": { "type": "uri", "value": "http://ex.org/a" },
              "leaf": { "type": "literal", "value": "Goethe", "xml:lang": "de" } },
            { "o": { "type": "bnode", "value": "b0" } }
        ] }
    }"#;

    fn endpoint(url: &str) -> HttpEndpoint {
        HttpEndpoint::new(
            &EndpointConfig::new("test", format!("{url}/sparql")),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_query_parses_sparql_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sparql")
            .match_header("accept", SPARQL_RESULTS_JSON)
            .match_body(Matcher::UrlEncoded(
                "query".to_string(),
                "SELECT ?o ?leaf WHERE { ?o ?p ?leaf }".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", SPARQL_RESULTS_JSON)
            .with_body(RESULTS)
            .create_async()
            .await;

        let rows = endpoint(&server.url())
            .direct_query("SELECT ?o ?leaf WHERE { ?o ?p ?leaf }")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["o"].identity(), Some("http://ex.org/a"));
        assert_eq!(rows[0]["leaf"].lang.as_deref(), Some("de"));
        assert!(rows[1].get("leaf").is_none());
        assert_eq!(rows[1]["o"].scalar().as_deref(), Some("_:b0"));
    }

    #[tokio::test]
    async fn test_ask_result_yields_no_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sparql")
            .with_status(200)
            .with_body(r#"{ "head": {}, "boolean": true }"#)
            .create_async()
            .await;

        let rows = endpoint(&server.url()).direct_query("ASK {}").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_error_status_becomes_endpoint_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sparql")
            .with_status(500)
            .with_body("parse error at line 1")
            .create_async()
            .await;

        let err = endpoint(&server.url())
            .direct_update("DELETE WHERE { ?s ?p ?o }")
            .await
            .unwrap_err();
        match err {
            SweepError::Endpoint { endpoint, message } => {
                assert_eq!(endpoint, "test");
                assert!(message.contains("500"));
                assert!(message.contains("parse error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_posts_form_and_uses_update_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/update")
            .match_body(Matcher::UrlEncoded(
                "update".to_string(),
                "CLEAR ALL".to_string(),
            ))
            .with_status(200)
            .with_body("done")
            .create_async()
            .await;

        let config = EndpointConfig {
            name: "split".to_string(),
            query_url: format!("{}/sparql", server.url()),
            update_url: Some(format!("{}/update", server.url())),
            direct: true,
        };
        let endpoint = HttpEndpoint::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(endpoint.direct_update("CLEAR ALL").await.unwrap(), "done");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_basic_auth_from_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/sparql")
            // admin:secret
            .match_header("authorization", "Basic YWRtaW46c2VjcmV0")
            .with_status(200)
            .with_body(r#"{ "results": { "bindings": [] } }"#)
            .create_async()
            .await;

        let creds = StaticCredentials::new(vec![CredentialEntry {
            host: "127.0.0.1".to_string(),
            user: "admin".to_string(),
            password: "secret".to_string(),
        }]);
        let endpoint = endpoint(&server.url()).with_credentials(&creds);
        endpoint.direct_query("SELECT * {}").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let result = HttpEndpoint::new(
            &EndpointConfig::new("bad", "not a url"),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(SweepError::Configuration(_))));
    }

    #[test]
    fn test_endpoint_without_direct_capability() {
        let mut config = EndpointConfig::new("archive", "http://localhost:1/sparql");
        config.direct = false;
        let endpoint = HttpEndpoint::new(&config, Duration::from_secs(1)).unwrap();
        assert!(endpoint.direct().is_none());
        assert_eq!(endpoint.name(), "archive");
    }
}
