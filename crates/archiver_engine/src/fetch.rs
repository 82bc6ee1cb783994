use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};

use crate::decode::decode_body;
use crate::{FailureKind, StageError};

/// A desktop Chrome user agent shared by the direct fetcher and the browser.
pub const STEALTH_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            redirect_limit: 10,
            max_bytes: 50 * 1024 * 1024,
            user_agent: STEALTH_USER_AGENT.to_string(),
        }
    }
}

/// A fetched document whose status and body are inspected before the browser sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub final_url: String,
    pub content_type: Option<String>,
    pub redirect_count: usize,
    /// Response headers in arrival order; repeated names such as `set-cookie` stay separate.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let mime = ct.split(';').next().unwrap_or(ct).trim();
                mime.eq_ignore_ascii_case("text/html")
                    || mime.eq_ignore_ascii_case("application/xhtml+xml")
            })
            .unwrap_or(true)
    }
}

/// Plain HTTP fetch of the top-level document, with browser-like headers.
///
/// Unlike a typical client, non-2xx responses are returned, not raised: the
/// block detector needs their status and body.
#[derive(Debug, Clone)]
pub struct DirectFetcher {
    settings: FetchSettings,
}

impl DirectFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self, redirect_counter: Arc<AtomicUsize>) -> Result<reqwest::Client, StageError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            let count = attempt.previous().len();
            redirect_counter.store(count, Ordering::Relaxed);
            if count >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy)
            .default_headers(self.stealth_headers())
            .build()
            .map_err(|err| StageError::new(FailureKind::Network, err.to_string()))
    }

    fn stealth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&self.settings.user_agent) {
            headers.insert(USER_AGENT, agent);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers
    }

    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, StageError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|err| StageError::new(FailureKind::InvalidUrl, err.to_string()))?;
        let redirect_counter = Arc::new(AtomicUsize::new(0));
        let client = self.build_client(redirect_counter.clone())?;

        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, content_len));
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(too_large(self.settings.max_bytes, next_len));
            }
            bytes.extend_from_slice(&chunk);
        }

        let decoded = decode_body(&bytes, content_type.as_deref());
        if decoded.lossy {
            engine_logging::engine_debug!(
                "lossy {} decode of {} ({} bytes)",
                decoded.encoding_label,
                url,
                bytes.len()
            );
        }

        Ok(FetchedPage {
            status,
            final_url,
            content_type,
            redirect_count: redirect_counter.load(Ordering::Relaxed),
            headers,
            body: decoded.text,
        })
    }
}

fn too_large(max_bytes: u64, actual: u64) -> StageError {
    StageError::new(
        FailureKind::Network,
        format!("response too large (max {max_bytes}, actual {actual})"),
    )
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> StageError {
    if err.is_timeout() {
        return StageError::new(FailureKind::Timeout, err.to_string());
    }
    StageError::new(FailureKind::Network, err.to_string())
}
