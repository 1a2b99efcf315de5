//! Medipim API client
//!
//! Fetches catalog pages from the provider's v4 query endpoints. Request
//! bodies come from the core request builder so a redelivered task always
//! issues the identical request; authentication is HTTP basic with the API
//! key pair.

use std::time::Duration;

use async_trait::async_trait;
use pimsync_core::sync::request;
use pimsync_core::{CatalogFetcher, SortingFormatSupport};
use pimsync_domain::{
    CatalogPage, EntityType, PimSyncError, ProviderConfig, Result, SortingFormat, SyncTask,
};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::http::HttpClient;

const USER_AGENT: &str = concat!("pimsync/", env!("CARGO_PKG_VERSION"));

/// Configuration for the Medipim client.
#[derive(Debug, Clone)]
pub struct MedipimClientConfig {
    /// Base URL of the provider API, e.g. `https://api.au.medipim.com`
    pub base_url: String,
    /// API key identifier (basic auth username)
    pub api_key_id: String,
    /// API key secret (basic auth password)
    pub api_key_secret: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Total attempts per request (initial try + retries)
    pub max_attempts: usize,
}

impl Default for MedipimClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.au.medipim.com".to_string(),
            api_key_id: String::new(),
            api_key_secret: String::new(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl From<&ProviderConfig> for MedipimClientConfig {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key_id: config.api_key_id.clone(),
            api_key_secret: config.api_key_secret.clone(),
            ..Self::default()
        }
    }
}

/// HTTP client for the Medipim catalog API.
pub struct MedipimClient {
    http: HttpClient,
    config: MedipimClientConfig,
}

/// One page of a provider query response.
#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    meta: Option<QueryMeta>,
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct QueryMeta {
    #[serde(default)]
    total: Option<u64>,
}

impl MedipimClient {
    /// Create a client with its own HTTP stack.
    pub fn new(config: MedipimClientConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.timeout)
            .max_attempts(config.max_attempts)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create a client over an existing HTTP client.
    pub fn with_http_client(config: MedipimClientConfig, http: HttpClient) -> Self {
        Self { http, config }
    }

    /// Probe which sorting formats the provider accepts for an entity type
    /// by issuing a first-page query per candidate format.
    pub async fn probe_sorting_formats(
        &self,
        entity_type: EntityType,
    ) -> Result<SortingFormatSupport> {
        let mut support = SortingFormatSupport {
            entity_type,
            simple_format_works: false,
            nested_format_works: false,
        };

        for format in [SortingFormat::Simple, SortingFormat::Nested] {
            if !request::supports_format(entity_type, format) {
                continue;
            }
            let task = SyncTask { entity_type, page: 0, sorting_format: format };
            let works = match self.query(&task).await {
                Ok(_) => true,
                Err(PimSyncError::InvalidInput(_)) => false,
                Err(other) => return Err(other),
            };
            match format {
                SortingFormat::Simple => support.simple_format_works = works,
                SortingFormat::Nested => support.nested_format_works = works,
            }
        }

        Ok(support)
    }

    #[instrument(skip(self), fields(entity_type = %task.entity_type, page = task.page))]
    async fn query(&self, task: &SyncTask) -> Result<QueryResponse> {
        let body = request::build_request_body(task)?;
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            request::endpoint(task.entity_type)
        );

        let builder = self
            .http
            .request(Method::POST, &url)
            .basic_auth(&self.config.api_key_id, Some(&self.config.api_key_secret))
            .json(&body);

        let response = self.http.send(builder).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(map_status_error(status, task));
        }

        let parsed: QueryResponse = response.json().await.map_err(|e| {
            PimSyncError::Provider(format!("failed to decode query response: {e}"))
        })?;

        debug!(
            results = parsed.results.len(),
            total = ?parsed.meta.as_ref().and_then(|m| m.total),
            "provider page fetched"
        );
        Ok(parsed)
    }
}

#[async_trait]
impl CatalogFetcher for MedipimClient {
    async fn fetch_page(&self, task: &SyncTask) -> Result<CatalogPage> {
        let parsed = self.query(task).await?;
        let total = parsed.meta.and_then(|m| m.total);
        let page_size = u64::from(request::page_size(task.entity_type));
        let fetched_so_far = (task.page as u64 + 1) * page_size;

        let has_more = match total {
            Some(total) => fetched_so_far < total,
            // no total reported: a full page means there is probably more
            None => parsed.results.len() as u64 == page_size,
        };

        Ok(CatalogPage { items: parsed.results, total, has_more })
    }
}

fn map_status_error(status: StatusCode, task: &SyncTask) -> PimSyncError {
    let context = format!("{} page {}", task.entity_type, task.page);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PimSyncError::Provider(format!("authentication rejected ({status}) for {context}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            PimSyncError::Provider(format!("rate limited ({status}) for {context}"))
        }
        s if s.is_server_error() => {
            PimSyncError::Provider(format!("server error ({status}) for {context}"))
        }
        s => PimSyncError::InvalidInput(format!("query rejected ({s}) for {context}")),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> MedipimClient {
        let config = MedipimClientConfig {
            base_url: server.uri(),
            api_key_id: "key-id".into(),
            api_key_secret: "key-secret".into(),
            timeout: Duration::from_secs(5),
            max_attempts: 1,
        };
        MedipimClient::new(config).expect("client")
    }

    fn task(entity_type: EntityType, page: i64) -> SyncTask {
        SyncTask { entity_type, page, sorting_format: SortingFormat::Simple }
    }

    #[tokio::test]
    async fn fetches_a_page_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/brands/query"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({"page": {"no": 2, "size": 250}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"total": 1000},
                "results": [{"id": 1, "name": "brand"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client.fetch_page(&task(EntityType::Brand, 2)).await.expect("page");

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.total, Some(1000));
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn final_page_reports_no_more() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"total": 501},
                "results": [{"id": 501}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        // page 2 of 250 covers items 501..750, past the total of 501
        let page = client.fetch_page(&task(EntityType::Brand, 2)).await.expect("page");
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn missing_total_falls_back_to_page_fill() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"id": 1}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let page = client.fetch_page(&task(EntityType::Brand, 0)).await.expect("page");
        assert_eq!(page.total, None);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn auth_rejection_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_page(&task(EntityType::Brand, 0)).await.unwrap_err();
        assert!(matches!(err, PimSyncError::Provider(_)));
    }

    #[tokio::test]
    async fn bad_request_is_invalid_input() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.fetch_page(&task(EntityType::Brand, 0)).await.unwrap_err();
        assert!(matches!(err, PimSyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unsupported_format_never_reaches_the_network() {
        let server = MockServer::start().await;
        // no mocks mounted: any request would 404 and fail the test below
        let client = client_for(&server);
        let err = client
            .fetch_page(&SyncTask {
                entity_type: EntityType::Media,
                page: 0,
                sorting_format: SortingFormat::Simple,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PimSyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn probes_formats_per_entity_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/media/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"total": 0},
                "results": []
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let support = client.probe_sorting_formats(EntityType::Media).await.expect("probe");
        assert!(!support.simple_format_works);
        assert!(support.nested_format_works);
    }
}
