//! Byte-fetch collaborator
//!
//! The engine only needs "give me the bytes of this identifier". The
//! [`ByteFetcher`] trait is that seam; [`HttpFetcher`] is the production
//! implementation against an origin that serves objects under a base URL.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{Result, RetrievalError};
use crate::retrieval::config::RetrievalConfig;

/// Default query parameter carrying the owner/session qualifier
pub const DEFAULT_OWNER_PARAM: &str = "owner";

/// Trait for anything that can produce the raw bytes of one object
///
/// Any error is treated as a transient, retryable failure by the engine.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    async fn fetch(&self, identifier: &str, owner: Option<&str>) -> Result<Vec<u8>>;
}

/// HTTP implementation fetching `<base_url>/<identifier>`
pub struct HttpFetcher {
    client: Client,
    base_url: Url,
    owner_param: String,
}

impl HttpFetcher {
    /// Create a fetcher using the timeout and user agent from the configuration
    pub fn from_config(base_url: &str, config: &RetrievalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| RetrievalError::HttpRequest {
                url: base_url.to_string(),
                source: e,
            })?;

        Self::with_client(base_url, client)
    }

    /// Create a fetcher around an existing client
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        let mut base_url = Url::parse(base_url).map_err(|source| RetrievalError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RetrievalError::Configuration {
                message: format!("'{}' cannot be used as a base URL", base_url),
                field: Some("base_url".to_string()),
            });
        }
        // Identifiers are appended as a final segment, drop any trailing slash first
        if let Ok(mut segments) = base_url.path_segments_mut() {
            segments.pop_if_empty();
        }

        Ok(Self {
            client,
            base_url,
            owner_param: DEFAULT_OWNER_PARAM.to_string(),
        })
    }

    /// Override the query parameter name used for the owner qualifier
    pub fn with_owner_param<S: Into<String>>(mut self, name: S) -> Self {
        self.owner_param = name.into();
        self
    }

    /// Build the URL for one identifier, percent-encoding it as a single segment
    pub fn object_url(&self, identifier: &str, owner: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(identifier);
        }
        if let Some(owner) = owner {
            url.query_pairs_mut().append_pair(&self.owner_param, owner);
        }
        url
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch(&self, identifier: &str, owner: Option<&str>) -> Result<Vec<u8>> {
        let url = self.object_url(identifier, owner);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RetrievalError::HttpRequest {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| RetrievalError::HttpRequest {
            url: url.to_string(),
            source: e,
        })?;

        debug!("Fetched {} bytes for '{}'", body.len(), identifier);
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn fetcher(base: &str) -> HttpFetcher {
        HttpFetcher::from_config(base, &RetrievalConfig::default()).unwrap()
    }

    #[test]
    fn object_url_encodes_identifier_and_owner() {
        let fetcher = fetcher("https://media.example.com/api/objects/");
        let url = fetcher.object_url("a b/c", Some("session 1"));
        assert_eq!(
            url.as_str(),
            "https://media.example.com/api/objects/a%20b%2Fc?owner=session+1"
        );
    }

    #[test]
    fn owner_param_can_be_renamed() {
        let fetcher = fetcher("https://media.example.com/download").with_owner_param("user");
        let url = fetcher.object_url("42", Some("alice"));
        assert_eq!(url.as_str(), "https://media.example.com/download/42?user=alice");
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = HttpFetcher::from_config("not a url", &RetrievalConfig::default());
        assert!(matches!(result, Err(RetrievalError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn fetches_bytes_with_owner_qualifier() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objects/photo-1"))
            .and(query_param("owner", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg bytes".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher(&format!("{}/objects", server.uri()));
        let bytes = fetcher.fetch("photo-1", Some("alice")).await.unwrap();
        assert_eq!(bytes, b"jpeg bytes");
    }

    #[tokio::test]
    async fn non_success_status_becomes_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/objects/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = fetcher(&format!("{}/objects", server.uri()));
        match fetcher.fetch("missing", None).await {
            Err(RetrievalError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got {other:?}"),
        }
    }
}
