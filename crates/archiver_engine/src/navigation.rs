//! What the browser is served for the top-level document, and the retry policy
//! that wraps whole render attempts when a page stays blocked.

use std::future::Future;
use std::sync::Arc;

use archiver_core::{BlockDetector, Stage};

use crate::cache::{CacheStage, StageCache};
use crate::evasion::{EvasionProvider, EvasionResponse};
use crate::fetch::{DirectFetcher, FetchedPage};
use crate::progress::ProgressSink;
use crate::{ArchiveEvent, FailureKind, RenderSource, RenderedHtml, StageError};

/// Headers that describe the original transfer rather than the document; the
/// body is re-encoded as UTF-8 before the browser sees it.
const TRANSFER_HEADERS: &[&str] = &[
    "content-type",
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "connection",
    "keep-alive",
];

/// A response to fulfill the paused top-level request with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub source: RenderSource,
}

impl NavigationResponse {
    fn direct(page: FetchedPage) -> Self {
        let mut headers = vec![html_content_type()];
        headers.extend(
            page.headers
                .into_iter()
                .filter(|(name, _)| !TRANSFER_HEADERS.contains(&name.to_ascii_lowercase().as_str())),
        );
        Self {
            status: page.status,
            headers,
            body: page.body,
            source: RenderSource::Direct,
        }
    }

    fn evaded(provider: &str, response: EvasionResponse) -> Self {
        Self {
            status: response.status,
            headers: vec![html_content_type()],
            body: response.body,
            source: RenderSource::Evasion {
                provider: provider.to_string(),
            },
        }
    }
}

fn html_content_type() -> (String, String) {
    ("Content-Type".to_string(), "text/html; charset=utf-8".to_string())
}

/// Decides, per navigation, between the direct response, the evasion
/// provider's response, or letting the browser load the page itself.
#[derive(Clone)]
pub struct NavigationPlanner {
    fetcher: DirectFetcher,
    detector: BlockDetector,
    evasion: Option<Arc<dyn EvasionProvider>>,
    cache: Arc<StageCache>,
}

impl NavigationPlanner {
    pub fn new(
        fetcher: DirectFetcher,
        detector: BlockDetector,
        evasion: Option<Arc<dyn EvasionProvider>>,
        cache: Arc<StageCache>,
    ) -> Self {
        Self {
            fetcher,
            detector,
            evasion,
            cache,
        }
    }

    pub fn detector(&self) -> &BlockDetector {
        &self.detector
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.evasion.as_ref().map(|provider| provider.name())
    }

    /// `None` lets the browser load `url` itself.
    pub async fn respond(&self, url: &str, force_evasion: bool) -> Option<NavigationResponse> {
        if force_evasion {
            if let Some(provider) = &self.evasion {
                return match self.evade(provider, url).await {
                    Ok(response) => Some(NavigationResponse::evaded(provider.name(), response)),
                    Err(err) => {
                        engine_logging::engine_warn!("{} failed for {}: {}", provider.name(), url, err);
                        None
                    }
                };
            }
        }

        let fetched = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(err) => {
                engine_logging::engine_warn!(
                    "direct fetch of {} failed, letting the browser load it: {}",
                    url,
                    err
                );
                return None;
            }
        };
        if !fetched.is_html() {
            return None;
        }

        if self.detector.is_blocked(fetched.status, &fetched.body) {
            engine_logging::engine_info!("{} looks blocked (status {})", url, fetched.status);
            if let Some(provider) = &self.evasion {
                match self.evade(provider, url).await {
                    Ok(response) => {
                        return Some(NavigationResponse::evaded(provider.name(), response))
                    }
                    Err(err) => engine_logging::engine_warn!(
                        "{} failed for {}, serving the original response: {}",
                        provider.name(),
                        url,
                        err
                    ),
                }
            }
        } else if fetched.redirect_count > 0 {
            // Served at the requested URL, relative links would resolve against the wrong base.
            engine_logging::engine_debug!(
                "{} redirected to {}, letting the browser follow it",
                url,
                fetched.final_url
            );
            return None;
        }
        Some(NavigationResponse::direct(fetched))
    }

    async fn evade(
        &self,
        provider: &Arc<dyn EvasionProvider>,
        url: &str,
    ) -> Result<EvasionResponse, StageError> {
        let provider = provider.clone();
        let target = url.to_string();
        self.cache
            .get_or_compute(CacheStage::Evade, &[provider.name(), url], move || async move {
                provider.fetch(&target).await
            })
            .await
    }
}

/// Outcome of one browser session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Rendered(RenderedHtml),
    /// The page still showed a challenge after the clearance wait.
    Blocked { source: RenderSource },
}

/// Run `attempt` until it renders, retrying once through the evasion provider
/// when a directly served page stays blocked. `attempt` receives whether the
/// provider's response must be served regardless of the direct response.
pub async fn render_with_retry<F, Fut>(
    url: &str,
    provider: Option<&str>,
    sink: &dyn ProgressSink,
    mut attempt: F,
) -> Result<RenderedHtml, StageError>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = Result<Attempt, StageError>>,
{
    let mut force_evasion = false;
    loop {
        sink.emit(ArchiveEvent::run(Stage::Rendering, "Rendering URL with browser"));
        match attempt(force_evasion).await? {
            Attempt::Blocked { source } => {
                let retry = match (provider, &source) {
                    (Some(provider), RenderSource::Direct) if !force_evasion => Some(provider),
                    _ => None,
                };
                let Some(provider) = retry else {
                    return Err(StageError::new(
                        FailureKind::Blocked,
                        format!("{url} kept serving a challenge page"),
                    ));
                };
                sink.emit(ArchiveEvent::run(
                    Stage::Evading,
                    format!("Page is blocked, fetching through {provider}"),
                ));
                force_evasion = true;
            }
            Attempt::Rendered(rendered) => {
                if let RenderSource::Evasion { provider } = &rendered.source {
                    if !force_evasion {
                        sink.emit(ArchiveEvent::run(
                            Stage::Evading,
                            format!("Direct response looked blocked, used {provider}"),
                        ));
                    }
                }
                if rendered.status >= 400 {
                    return Err(StageError::new(
                        FailureKind::HttpStatus(rendered.status),
                        format!("{url} answered with status {}", rendered.status),
                    ));
                }
                if rendered.html.trim().is_empty() {
                    return Err(StageError::new(
                        FailureKind::EmptyContent,
                        format!("{url} rendered to an empty document"),
                    ));
                }
                sink.emit(ArchiveEvent::run(Stage::Rendered, "Page rendered"));
                return Ok(rendered);
            }
        }
    }
}
