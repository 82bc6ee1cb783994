//! Headless Chromium rendering and PDF printing.
//!
//! Every call launches its own browser with a throwaway profile. The top-level
//! document request is paused and fetched directly so the block detector can
//! inspect it before the browser commits; when it looks blocked and an evasion
//! provider is configured, the provider's response is served instead.

use std::collections::HashSet;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use archiver_core::BlockDetector;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetEmulatedMediaParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, FulfillRequestParams,
    HeaderEntry, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, PrintToPdfParams,
};
use chromiumoxide::Page;
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::StageCache;
use crate::convert::strip_lazy_loading;
use crate::evasion::EvasionProvider;
use crate::fetch::{DirectFetcher, FetchSettings};
use crate::navigation::{render_with_retry, Attempt, NavigationPlanner, NavigationResponse};
use crate::progress::ProgressSink;
use crate::settings::BrowserSettings;
use crate::{FailureKind, RenderSource, RenderedHtml, StageError};

/// Produces the DOM-rendered HTML of a URL.
#[async_trait::async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str, sink: &dyn ProgressSink) -> Result<RenderedHtml, StageError>;
}

/// Prints a self-contained HTML document to PDF.
#[async_trait::async_trait]
pub trait PdfPrinter: Send + Sync {
    async fn print_pdf(&self, html: &str) -> Result<Vec<u8>, StageError>;
}

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
window.chrome = window.chrome || { runtime: {} };
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
  window.navigator.permissions.query = (parameters) =>
    parameters.name === 'notifications'
      ? Promise.resolve({ state: Notification.permission })
      : originalQuery(parameters);
}
"#;

/// How long a closed browser gets to exit before its profile is removed anyway.
const BROWSER_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ChromiumBrowser {
    settings: BrowserSettings,
    planner: NavigationPlanner,
}

impl ChromiumBrowser {
    pub fn new(
        settings: BrowserSettings,
        fetch: FetchSettings,
        detector: BlockDetector,
        evasion: Option<Arc<dyn EvasionProvider>>,
        cache: Arc<StageCache>,
    ) -> Self {
        Self {
            settings,
            planner: NavigationPlanner::new(DirectFetcher::new(fetch), detector, evasion, cache),
        }
    }

    async fn render_timed(&self, url: &str, force_evasion: bool) -> Result<Attempt, StageError> {
        tokio::time::timeout(
            self.settings.context_timeout,
            self.render_once(url, force_evasion),
        )
        .await
        .map_err(|_| {
            StageError::new(
                FailureKind::Timeout,
                format!(
                    "browser session exceeded {}s",
                    self.settings.context_timeout.as_secs()
                ),
            )
        })?
    }

    async fn render_once(&self, url: &str, force_evasion: bool) -> Result<Attempt, StageError> {
        let session = Session::launch(&self.settings).await?;
        let outcome = self.drive(&session, url, force_evasion).await;
        session.shutdown().await;
        outcome
    }

    async fn drive(
        &self,
        session: &Session,
        url: &str,
        force_evasion: bool,
    ) -> Result<Attempt, StageError> {
        let page = session.new_page().await?;
        let mut tasks = TaskSet::default();

        page.execute(network::EnableParams::default())
            .await
            .map_err(browser_error("enable network domain"))?;
        let activity = Arc::new(Mutex::new(NetworkActivity::default()));
        tasks.push(track_activity(&page, activity.clone()).await?);

        let documents = Arc::new(Mutex::new(Vec::new()));
        tasks.push(track_document_status(&page, documents.clone()).await?);

        let interceptor = Interceptor {
            planner: self.planner.clone(),
            force_evasion,
            navigation: Arc::new(Mutex::new(NavigationState::default())),
        };
        let navigation = interceptor.navigation.clone();
        tasks.push(interceptor.install(&page).await?);

        page.goto(url)
            .await
            .map_err(browser_error("navigation failed"))?;
        wait_for_network_idle(
            &activity,
            self.settings.network_idle,
            self.settings.network_idle_timeout,
        )
        .await;

        let detector = self.planner.detector();
        let mut html = page.content().await.map_err(browser_error("read content"))?;
        if detector.has_challenge_marker(&html) {
            engine_logging::engine_info!("challenge page detected for {}, waiting for it to clear", url);
            let deadline = Instant::now() + self.settings.challenge_wait;
            while detector.has_challenge_marker(&html) && Instant::now() < deadline {
                tokio::time::sleep(self.settings.challenge_poll_interval).await;
                html = page.content().await.map_err(browser_error("read content"))?;
            }
        }
        let blocked = detector.has_challenge_marker(&html);

        tasks.abort_all();
        if let Err(err) = page.close().await {
            engine_logging::engine_warn!("failed to close page for {}: {}", url, err);
        }

        let navigation = std::mem::take(&mut *lock(&navigation));
        let source = navigation
            .served
            .as_ref()
            .map(|served| served.source.clone())
            .unwrap_or(RenderSource::Direct);
        if blocked {
            return Ok(Attempt::Blocked { source });
        }
        let observed = last_document_status(&lock(&documents), navigation.main_frame.as_deref());
        let status = navigation_status(
            navigation.served.map(|served| served.status),
            navigation.reloaded,
            observed,
        );
        Ok(Attempt::Rendered(RenderedHtml {
            html,
            status,
            source,
        }))
    }

    async fn print_once(&self, file_url: &str) -> Result<Vec<u8>, StageError> {
        let session = Session::launch(&self.settings).await?;
        let outcome: Result<Vec<u8>, StageError> = async {
            let page = session.new_page().await?;
            page.execute(SetEmulatedMediaParams::builder().media("print").build())
                .await
                .map_err(browser_error("emulate print media"))?;
            page.goto(file_url)
                .await
                .map_err(browser_error("load document"))?;
            let pdf = page
                .pdf(PrintToPdfParams::builder().print_background(true).build())
                .await
                .map_err(browser_error("print to pdf"))?;
            if let Err(err) = page.close().await {
                engine_logging::engine_warn!("failed to close pdf page: {}", err);
            }
            Ok(pdf)
        }
        .await;
        session.shutdown().await;
        outcome
    }
}

#[async_trait::async_trait]
impl PageRenderer for ChromiumBrowser {
    async fn render(&self, url: &str, sink: &dyn ProgressSink) -> Result<RenderedHtml, StageError> {
        let parsed = url::Url::parse(url)
            .map_err(|err| StageError::new(FailureKind::InvalidUrl, format!("{url}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(StageError::new(
                FailureKind::InvalidUrl,
                format!("unsupported scheme `{}`", parsed.scheme()),
            ));
        }

        render_with_retry(url, self.planner.provider_name(), sink, |force_evasion| {
            self.render_timed(url, force_evasion)
        })
        .await
    }
}

#[async_trait::async_trait]
impl PdfPrinter for ChromiumBrowser {
    async fn print_pdf(&self, html: &str) -> Result<Vec<u8>, StageError> {
        let html = strip_lazy_loading(html)?;
        // Removed when dropped, whichever way this function exits.
        let file = tempfile::Builder::new()
            .prefix("archiver-")
            .suffix(".html")
            .tempfile()
            .map_err(|err| StageError::new(FailureKind::Internal, err.to_string()))?;
        tokio::fs::write(file.path(), html.as_bytes())
            .await
            .map_err(|err| StageError::new(FailureKind::Internal, err.to_string()))?;
        let file_url = url::Url::from_file_path(file.path()).map_err(|_| {
            StageError::new(
                FailureKind::Internal,
                format!("temporary path {} is not absolute", file.path().display()),
            )
        })?;

        tokio::time::timeout(self.settings.context_timeout, self.print_once(file_url.as_str()))
            .await
            .map_err(|_| StageError::new(FailureKind::Timeout, "pdf printing timed out"))?
    }
}

/// A launched browser plus its event-loop task and profile directory.
struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: Option<TempDir>,
}

impl Session {
    async fn launch(settings: &BrowserSettings) -> Result<Self, StageError> {
        let mut profile = tempfile::Builder::new();
        profile.prefix("archiver-profile-");
        let profile = match &settings.profile_root {
            Some(root) => profile.tempdir_in(root),
            None => profile.tempdir(),
        }
        .map_err(|err| StageError::new(FailureKind::Browser, err.to_string()))?;

        let mut builder = BrowserConfig::builder()
            .request_timeout(settings.context_timeout)
            .user_data_dir(profile.path())
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-popup-blocking")
            .arg("--mute-audio")
            .arg("--window-size=1920,1080")
            .arg(format!("--user-agent={}", settings.user_agent));

        if settings.extensions.is_empty() {
            builder = builder.arg("--disable-extensions");
            if !settings.headless {
                builder = builder.with_head();
            }
        } else {
            let joined = settings
                .extensions
                .iter()
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(",");
            // Extensions only load in headful or new-headless mode.
            builder = builder
                .with_head()
                .arg(format!("--disable-extensions-except={joined}"))
                .arg(format!("--load-extension={joined}"));
            if settings.headless {
                builder = builder.arg("--headless=new");
            }
        }
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(|err| {
            StageError::new(FailureKind::Browser, format!("browser config: {err}"))
        })?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(browser_error("launch browser"))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    engine_logging::engine_trace!("browser handler error: {}", err);
                }
            }
        });
        Ok(Self {
            browser,
            handler,
            profile: Some(profile),
        })
    }

    async fn new_page(&self) -> Result<Page, StageError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_error("open page"))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(browser_error("install stealth script"))?;
        Ok(page)
    }

    /// Close the browser and wait for the process to exit before its profile is removed.
    async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            engine_logging::engine_warn!("failed to close browser: {}", err);
        }
        match tokio::time::timeout(BROWSER_EXIT_TIMEOUT, self.browser.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => engine_logging::engine_warn!("failed to wait for browser exit: {}", err),
            Err(_) => engine_logging::engine_warn!(
                "browser did not exit within {}s",
                BROWSER_EXIT_TIMEOUT.as_secs()
            ),
        }
        self.handler.abort();
        if let Some(profile) = self.profile.take() {
            let path: PathBuf = profile.path().to_path_buf();
            if let Err(err) = profile.close() {
                engine_logging::engine_warn!("failed to remove browser profile {:?}: {}", path, err);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

/// Background listeners scoped to one page.
#[derive(Default)]
struct TaskSet(Vec<JoinHandle<()>>);

impl TaskSet {
    fn push(&mut self, task: JoinHandle<()>) {
        self.0.push(task);
    }

    fn abort_all(&mut self) {
        for task in self.0.drain(..) {
            task.abort();
        }
    }
}

impl Drop for TaskSet {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// What the interceptor learned about top-level navigations of one page.
#[derive(Default)]
struct NavigationState {
    main_frame: Option<String>,
    /// Set when the first navigation was fulfilled from outside the browser.
    served: Option<ServedNavigation>,
    /// The main frame navigated again, e.g. a challenge page reloading itself.
    reloaded: bool,
}

struct ServedNavigation {
    status: u16,
    source: RenderSource,
}

#[derive(Clone)]
struct Interceptor {
    planner: NavigationPlanner,
    force_evasion: bool,
    navigation: Arc<Mutex<NavigationState>>,
}

impl Interceptor {
    async fn install(self, page: &Page) -> Result<JoinHandle<()>, StageError> {
        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(browser_error("subscribe to paused requests"))?;
        let pattern = RequestPattern {
            url_pattern: Some("*".to_string()),
            resource_type: None,
            request_stage: Some(RequestStage::Request),
        };
        page.execute(fetch::EnableParams {
            patterns: Some(vec![pattern]),
            handle_auth_requests: None,
        })
        .await
        .map_err(browser_error("enable request interception"))?;

        let page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                if let Err(err) = self.handle(&page, &event).await {
                    engine_logging::engine_debug!(
                        "interception of {} failed: {}",
                        event.request.url,
                        err
                    );
                }
            }
        }))
    }

    async fn handle(&self, page: &Page, event: &EventRequestPaused) -> Result<(), StageError> {
        let id = event.request_id.clone();
        match event.resource_type {
            ResourceType::Image | ResourceType::Media | ResourceType::Font => {
                page.execute(FailRequestParams::new(id, ErrorReason::BlockedByClient))
                    .await
                    .map_err(browser_error("abort request"))?;
            }
            ResourceType::Document if self.claim_navigation(event.frame_id.inner()) => {
                match self.planner.respond(&event.request.url, self.force_evasion).await {
                    Some(response) => {
                        let fulfill = fulfill_params(id, &response)?;
                        lock(&self.navigation).served = Some(ServedNavigation {
                            status: response.status,
                            source: response.source,
                        });
                        page.execute(fulfill)
                            .await
                            .map_err(browser_error("fulfill navigation"))?;
                    }
                    None => {
                        page.execute(ContinueRequestParams::new(id))
                            .await
                            .map_err(browser_error("continue navigation"))?;
                    }
                }
            }
            _ => {
                page.execute(ContinueRequestParams::new(id))
                    .await
                    .map_err(browser_error("continue request"))?;
            }
        }
        Ok(())
    }

    /// `true` for the first document request, which defines the main frame.
    /// Later documents in that frame are recorded as reloads and left to the browser.
    fn claim_navigation(&self, frame: &str) -> bool {
        let mut navigation = lock(&self.navigation);
        match navigation.main_frame.as_deref() {
            None => {
                navigation.main_frame = Some(frame.to_string());
                true
            }
            Some(main) => {
                if main == frame {
                    navigation.reloaded = true;
                }
                false
            }
        }
    }
}

fn fulfill_params(
    id: fetch::RequestId,
    response: &NavigationResponse,
) -> Result<FulfillRequestParams, StageError> {
    let mut builder = FulfillRequestParams::builder()
        .request_id(id)
        .response_code(i64::from(response.status));
    for (name, value) in &response.headers {
        builder = builder.response_header(HeaderEntry::new(name.clone(), value.clone()));
    }
    builder
        .body(base64::engine::general_purpose::STANDARD.encode(&response.body))
        .build()
        .map_err(|err| StageError::new(FailureKind::Browser, err))
}

/// Status of the rendered document: the served response unless the main frame
/// navigated again, in which case the browser's own latest response wins.
fn navigation_status(served: Option<u16>, reloaded: bool, observed: Option<u16>) -> u16 {
    match served {
        Some(status) if !reloaded => status,
        _ => observed.or(served).unwrap_or(200),
    }
}

fn last_document_status(
    documents: &[(Option<String>, u16)],
    main_frame: Option<&str>,
) -> Option<u16> {
    documents
        .iter()
        .rev()
        .find(|(frame, _)| main_frame.is_none() || frame.as_deref() == main_frame)
        .map(|(_, status)| *status)
}

#[derive(Default)]
struct NetworkActivity {
    inflight: HashSet<String>,
    last_change: Option<Instant>,
}

enum Activity {
    Started(String),
    Ended(String),
}

async fn track_activity(
    page: &Page,
    activity: Arc<Mutex<NetworkActivity>>,
) -> Result<JoinHandle<()>, StageError> {
    let started = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(browser_error("subscribe to requests"))?
        .map(|event| Activity::Started(event.request_id.inner().clone()));
    let finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(browser_error("subscribe to finished loads"))?
        .map(|event| Activity::Ended(event.request_id.inner().clone()));
    let failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(browser_error("subscribe to failed loads"))?
        .map(|event| Activity::Ended(event.request_id.inner().clone()));

    let mut events = Box::pin(futures_util::stream::select(
        started,
        futures_util::stream::select(finished, failed),
    ));
    Ok(tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let mut state = lock(&activity);
            match event {
                Activity::Started(id) => {
                    state.inflight.insert(id);
                }
                Activity::Ended(id) => {
                    state.inflight.remove(&id);
                }
            }
            state.last_change = Some(Instant::now());
        }
    }))
}

/// `(frame, status)` of every document response, in arrival order.
async fn track_document_status(
    page: &Page,
    documents: Arc<Mutex<Vec<(Option<String>, u16)>>>,
) -> Result<JoinHandle<()>, StageError> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(browser_error("subscribe to responses"))?;
    Ok(tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            if event.r#type != ResourceType::Document {
                continue;
            }
            if let Ok(status) = u16::try_from(event.response.status) {
                let frame = event.frame_id.as_ref().map(|frame| frame.inner().clone());
                lock(&documents).push((frame, status));
            }
        }
    }))
}

async fn wait_for_network_idle(activity: &Mutex<NetworkActivity>, idle: Duration, limit: Duration) {
    let deadline = Instant::now() + limit;
    let poll = idle.clamp(Duration::from_millis(10), Duration::from_millis(100));
    loop {
        let quiet = {
            let state = lock(activity);
            state.inflight.is_empty()
                && state
                    .last_change
                    .map_or(true, |changed| changed.elapsed() >= idle)
        };
        if quiet {
            return;
        }
        if Instant::now() >= deadline {
            engine_logging::engine_debug!("network did not go idle within {}s", limit.as_secs());
            return;
        }
        tokio::time::sleep(poll).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn browser_error<E: Display>(context: &'static str) -> impl Fn(E) -> StageError {
    move |err| StageError::new(FailureKind::Browser, format!("{context}: {err}"))
}
