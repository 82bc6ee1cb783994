//! Third-party rendering APIs used when the direct fetch looks blocked.
//!
//! Both providers return a `(status, body)` pair; the rest of the pipeline
//! treats it exactly like a direct response.

use std::sync::Arc;
use std::time::Duration;

use archiver_core::{EvasionConfig, OxylabsCredentials, ZenRowsCredentials};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};

use crate::decode::decode_body;
use crate::fetch::map_reqwest_error;
use crate::{FailureKind, StageError};

pub const ZENROWS_ENDPOINT: &str = "https://api.zenrows.com/v1/";
pub const OXYLABS_ENDPOINT: &str = "https://realtime.oxylabs.io/v1/queries";
pub const DEFAULT_EVASION_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvasionResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait::async_trait]
pub trait EvasionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, url: &str) -> Result<EvasionResponse, StageError>;
}

/// Instantiate the configured provider, if any.
pub fn build_provider(
    config: &EvasionConfig,
    timeout: Duration,
) -> Result<Option<Arc<dyn EvasionProvider>>, StageError> {
    let provider: Arc<dyn EvasionProvider> = match config {
        EvasionConfig::Disabled => return Ok(None),
        EvasionConfig::ZenRows(creds) => Arc::new(ZenRowsProvider::new(creds.clone(), timeout)?),
        EvasionConfig::Oxylabs(creds) => Arc::new(OxylabsProvider::new(creds.clone(), timeout)?),
    };
    Ok(Some(provider))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, StageError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| StageError::new(FailureKind::Evasion, err.to_string()))
}

/// GET-based rendering proxy with premium-proxy routing and JS rendering.
#[derive(Debug, Clone)]
pub struct ZenRowsProvider {
    credentials: ZenRowsCredentials,
    endpoint: String,
    client: reqwest::Client,
}

impl ZenRowsProvider {
    pub fn new(credentials: ZenRowsCredentials, timeout: Duration) -> Result<Self, StageError> {
        Ok(Self {
            credentials,
            endpoint: ZENROWS_ENDPOINT.to_string(),
            client: build_client(timeout)?,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait::async_trait]
impl EvasionProvider for ZenRowsProvider {
    fn name(&self) -> &'static str {
        "zenrows"
    }

    async fn fetch(&self, url: &str) -> Result<EvasionResponse, StageError> {
        let request_url = url::Url::parse_with_params(
            &self.endpoint,
            &[
                ("url", url),
                ("apikey", self.credentials.api_key.as_str()),
                ("premium_proxy", "true"),
                ("js_render", "true"),
            ],
        )
        .map_err(|err| StageError::new(FailureKind::Evasion, format!("bad endpoint: {err}")))?;

        let response = self
            .client
            .get(request_url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = decode_body(&bytes, content_type.as_deref()).text;

        engine_logging::engine_debug!("zenrows returned status {} for {}", status, url);
        Ok(EvasionResponse { status, body })
    }
}

#[derive(Debug, Serialize)]
struct OxylabsQuery<'a> {
    source: &'a str,
    url: &'a str,
    render: &'a str,
}

#[derive(Debug, Deserialize)]
struct OxylabsReply {
    #[serde(default)]
    results: Vec<OxylabsResult>,
}

#[derive(Debug, Deserialize)]
struct OxylabsResult {
    #[serde(default)]
    content: String,
    status_code: u16,
}

/// POST-based scraping API. Non-2xx outcomes become a descriptive body instead
/// of an error, so callers always see a `(status, body)` pair.
#[derive(Debug, Clone)]
pub struct OxylabsProvider {
    credentials: OxylabsCredentials,
    endpoint: String,
    client: reqwest::Client,
}

impl OxylabsProvider {
    pub fn new(credentials: OxylabsCredentials, timeout: Duration) -> Result<Self, StageError> {
        Ok(Self {
            credentials,
            endpoint: OXYLABS_ENDPOINT.to_string(),
            client: build_client(timeout)?,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait::async_trait]
impl EvasionProvider for OxylabsProvider {
    fn name(&self) -> &'static str {
        "oxylabs"
    }

    async fn fetch(&self, url: &str) -> Result<EvasionResponse, StageError> {
        let query = OxylabsQuery {
            source: "universal",
            url,
            render: "html",
        };
        let payload = serde_json::to_vec(&query)
            .map_err(|err| StageError::new(FailureKind::Internal, err.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let outer_status = response.status();
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        if !outer_status.is_success() {
            engine_logging::engine_warn!(
                "oxylabs request for {} failed with status {}",
                url,
                outer_status
            );
            return Ok(failure_response(self.name(), outer_status.as_u16(), url));
        }

        let reply: OxylabsReply = serde_json::from_slice(&bytes).map_err(|err| {
            StageError::new(
                FailureKind::Evasion,
                format!("malformed oxylabs reply: {err}"),
            )
        })?;
        let result = reply.results.into_iter().next().ok_or_else(|| {
            StageError::new(FailureKind::Evasion, "oxylabs reply contained no results")
        })?;

        if !(200..300).contains(&result.status_code) {
            return Ok(failure_response(self.name(), result.status_code, url));
        }
        Ok(EvasionResponse {
            status: result.status_code,
            body: result.content,
        })
    }
}

fn failure_response(provider: &str, status: u16, url: &str) -> EvasionResponse {
    EvasionResponse {
        status,
        body: format!(
            "<html><head><title>Evasion provider error</title></head><body><p>{provider} returned status {status} for {url}</p></body></html>"
        ),
    }
}
