//! Scripted stand-ins for sources, fetchers, browser engines and feeds.

use crate::{
    browser::{BrowserElement, BrowserEngine, BrowserSession},
    data::{RawRecord, SourceKind},
    error::{FailureReason, HarvestError},
    feed::{FeedClient, FeedQuery, FeedRow},
    fetch::{FetchResponse, Fetcher},
    PageFetchOutcome, Source,
};
use reqwest::header::HeaderMap;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum FakeUnit {
    Listing(RawRecord),
    Broken,
}

#[derive(Debug, Clone)]
pub enum Step {
    /// `n` generated listings titled `job {page}.{i}`.
    Generated(usize),
    Listings(Vec<FakeUnit>),
    Empty,
    TransportError,
    HttpError(u16),
}

impl Step {
    pub fn listings(n: usize) -> Step {
        Step::Generated(n)
    }
}

#[derive(Default)]
struct Counters {
    live: AtomicUsize,
    peak: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Counters {
    fn open(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A source answering each (query, page) from a script. Unscripted pages are empty.
pub struct ScriptedSource {
    kind: SourceKind,
    scripts: Mutex<HashMap<(Option<String>, u32), VecDeque<Step>>>,
    requests: Mutex<Vec<(String, u32)>>,
    counters: Counters,
    failing_opens: AtomicUsize,
    delay: Option<Duration>,
    cancel_on: Option<(u32, CancellationToken)>,
}

impl ScriptedSource {
    pub fn new(kind: SourceKind) -> Self {
        ScriptedSource {
            kind,
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(vec![]),
            counters: Counters::default(),
            failing_opens: AtomicUsize::new(0),
            delay: None,
            cancel_on: None,
        }
    }

    pub fn unit(page: u32, i: usize) -> FakeUnit {
        FakeUnit::Listing(RawRecord {
            title: Some(format!("job {}.{}", page, i)),
            company: Some("Acme".into()),
            location: Some("Dubai".into()),
            url: Some(format!("https://jobs.example/{}/{}", page, i)),
            ..Default::default()
        })
    }

    /// Appends a step for `page` of any query. Repeated calls queue further attempts.
    pub fn page(self, page: u32, step: Step) -> Self {
        self.push(None, page, step)
    }

    pub fn query_page(self, query: &str, page: u32, step: Step) -> Self {
        self.push(Some(query.to_string()), page, step)
    }

    fn push(self, query: Option<String>, page: u32, step: Step) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry((query, page))
            .or_default()
            .push_back(step);
        self
    }

    pub fn failing_open(self) -> Self {
        self.failing_first_opens(usize::MAX)
    }

    pub fn failing_first_opens(self, n: usize) -> Self {
        self.failing_opens.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancels `token` while `page` is being fetched.
    pub fn cancel_on_page(mut self, page: u32, token: CancellationToken) -> Self {
        self.cancel_on = Some((page, token));
        self
    }

    pub fn requests(&self) -> Vec<(String, u32)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requests().into_iter().map(|(_, page)| page).collect()
    }

    pub fn live_sessions(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn peak_sessions(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn opened_sessions(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Steps scripted for any query are replayed from the start for each query.
    fn next_step(&self, query: &str, page: u32) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        let key = (Some(query.to_string()), page);
        if !scripts.contains_key(&key) {
            let shared = scripts.get(&(None, page)).cloned().unwrap_or_default();
            scripts.insert(key.clone(), shared);
        }
        scripts
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Empty)
    }
}

#[async_trait::async_trait]
impl Source for ScriptedSource {
    type Session = ();
    type Unit = FakeUnit;

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn open_session(&self) -> Result<(), HarvestError> {
        let failing = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(HarvestError::BrowserUnavailable("no engine".into()));
        }
        self.counters.open();
        Ok(())
    }

    async fn close_session(&self, _session: ()) {
        self.counters.close();
    }

    async fn fetch_page(&self, _: &mut (), query: &str, page: u32) -> PageFetchOutcome<FakeUnit> {
        self.requests.lock().unwrap().push((query.to_string(), page));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((cancel_page, token)) = &self.cancel_on {
            if *cancel_page == page {
                token.cancel();
            }
        }
        match self.next_step(query, page) {
            Step::Generated(n) => {
                PageFetchOutcome::Success((1..=n).map(|i| ScriptedSource::unit(page, i)).collect())
            }
            Step::Listings(units) => PageFetchOutcome::Success(units),
            Step::Empty => PageFetchOutcome::EmptyPage,
            Step::TransportError => PageFetchOutcome::FetchError(HarvestError::transport(
                format!("https://jobs.example/{}", page),
                "connection reset",
            )),
            Step::HttpError(status) => PageFetchOutcome::FetchError(HarvestError::Http {
                url: format!("https://jobs.example/{}", page),
                status,
            }),
        }
    }

    async fn extract(&self, unit: FakeUnit, _query: &str) -> Result<RawRecord, FailureReason> {
        match unit {
            FakeUnit::Listing(raw) => Ok(raw),
            FakeUnit::Broken => Err(FailureReason::MalformedMarkup("broken listing".into())),
        }
    }
}

/// Serves canned responses by URL; anything else is a 404.
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Result<FetchResponse, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        FakeFetcher::default()
    }

    pub fn page(mut self, url: &str, status: u16, body: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            Ok(FetchResponse {
                status,
                body: body.to_string(),
            }),
        );
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), Err("connection refused".into()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _headers: &HeaderMap) -> Result<FetchResponse, HarvestError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(e)) => Err(HarvestError::transport(url, e.clone())),
            None => Ok(FetchResponse {
                status: 404,
                body: String::new(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    text: Option<String>,
    attributes: HashMap<String, String>,
    ancestor_attributes: HashMap<String, String>,
    children: HashMap<String, FakeElement>,
    broken: bool,
}

impl FakeElement {
    pub fn with_text(text: &str) -> Self {
        FakeElement {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn broken() -> Self {
        FakeElement {
            broken: true,
            ..Default::default()
        }
    }

    pub fn child(mut self, selector: &str, element: FakeElement) -> Self {
        self.children.insert(selector.to_string(), element);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn ancestor_attr(mut self, name: &str, value: &str) -> Self {
        self.ancestor_attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    fn check(&self) -> Result<(), HarvestError> {
        if self.broken {
            Err(HarvestError::Browser("node is detached from document".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl BrowserElement for FakeElement {
    async fn find_one(&self, selector: &str) -> Result<Option<Self>, HarvestError> {
        self.check()?;
        Ok(self.children.get(selector).cloned())
    }

    async fn text(&self) -> Result<Option<String>, HarvestError> {
        self.check()?;
        Ok(self.text.clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, HarvestError> {
        self.check()?;
        Ok(self.attributes.get(name).cloned())
    }

    async fn ancestor_attribute(
        &self,
        _selector: &str,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        self.check()?;
        Ok(self.ancestor_attributes.get(name).cloned())
    }
}

#[derive(Debug, Clone)]
pub enum FakePage {
    Listings(Vec<FakeElement>),
    /// Renders the no-results marker and nothing else.
    NoResults,
    /// Never renders anything the source waits for.
    Blank,
    NavigationError,
    /// Loads, then the page dies while the source waits for listings.
    Crashed,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    pages: Arc<Mutex<HashMap<String, FakePage>>>,
    navigations: Arc<Mutex<Vec<String>>>,
    counters: Arc<Counters>,
    fail_launch: bool,
}

impl FakeEngine {
    pub fn new() -> Self {
        FakeEngine::default()
    }

    pub fn page(self, url: &str, page: FakePage) -> Self {
        self.pages.lock().unwrap().insert(url.to_string(), page);
        self
    }

    pub fn failing_launch(mut self) -> Self {
        self.fail_launch = true;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn live_instances(&self) -> usize {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn peak_instances(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn launched(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }
}

pub struct FakeSession {
    engine: FakeEngine,
    current: FakePage,
}

#[async_trait::async_trait]
impl BrowserEngine for FakeEngine {
    type Session = FakeSession;

    async fn launch(&self) -> Result<FakeSession, HarvestError> {
        if self.fail_launch {
            return Err(HarvestError::BrowserUnavailable("chrome not found".into()));
        }
        self.counters.open();
        Ok(FakeSession {
            engine: self.clone(),
            current: FakePage::Blank,
        })
    }

    async fn shutdown(&self, _session: FakeSession) {
        self.counters.close();
    }
}

#[async_trait::async_trait]
impl BrowserSession for FakeSession {
    type Element = FakeElement;

    async fn navigate(&mut self, url: &str) -> Result<(), HarvestError> {
        self.engine.navigations.lock().unwrap().push(url.to_string());
        let page = self
            .engine
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(FakePage::Blank);
        if let FakePage::NavigationError = page {
            return Err(HarvestError::Browser(format!("net::ERR_CONNECTION_RESET at {}", url)));
        }
        self.current = page;
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<(), HarvestError> {
        match &self.current {
            FakePage::Listings(elements) if !elements.is_empty() => Ok(()),
            FakePage::NoResults => Ok(()),
            FakePage::Crashed => Err(HarvestError::Browser("Target closed".into())),
            _ => Err(HarvestError::ElementNotFound(selector.to_string())),
        }
    }

    async fn find_all(&mut self, _selector: &str) -> Result<Vec<FakeElement>, HarvestError> {
        Ok(match &self.current {
            FakePage::Listings(elements) => elements.clone(),
            _ => vec![],
        })
    }
}

/// Answers feed searches by offset. Offsets without an answer return no rows.
#[derive(Default)]
pub struct FakeFeed {
    responses: HashMap<u32, Result<Vec<FeedRow>, u16>>,
    calls: Mutex<Vec<(String, String, u32)>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        FakeFeed::default()
    }

    pub fn rows(mut self, offset: u32, rows: Vec<FeedRow>) -> Self {
        self.responses.insert(offset, Ok(rows));
        self
    }

    pub fn status(mut self, offset: u32, status: u16) -> Self {
        self.responses.insert(offset, Err(status));
        self
    }

    /// (site, search term, offset) of every search made.
    pub fn calls(&self) -> Vec<(String, String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl FeedClient for FakeFeed {
    async fn search(&self, query: &FeedQuery<'_>) -> Result<Vec<FeedRow>, HarvestError> {
        self.calls.lock().unwrap().push((
            query.site.to_string(),
            query.search_term.to_string(),
            query.offset,
        ));
        match self.responses.get(&query.offset) {
            Some(Ok(rows)) => Ok(rows.clone()),
            Some(Err(status)) => Err(HarvestError::Http {
                url: "http://feed.example/api/v1/search_jobs".into(),
                status: *status,
            }),
            None => Ok(vec![]),
        }
    }
}
