use crate::{
    config::SourcePolicy,
    data::{ExtractionFailure, HarvestResult, HarvestTask},
    error::HarvestError,
    summary::{TaskReport, TaskStats},
    PageFetchOutcome, Source,
};
use std::{ops::RangeInclusive, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum spacing between page requests of one source, shared by all its workers.
pub struct Throttle {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// Waits for the next request slot; `false` when `token` is cancelled first.
    pub async fn wait(&self, token: &CancellationToken) -> bool {
        if self.interval.is_zero() {
            return true;
        }
        let mut last_request = tokio::select! {
            guard = self.last_request.lock() => guard,
            _ = token.cancelled() => return false,
        };
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval - elapsed) => {}
                    _ = token.cancelled() => return false,
                }
            }
        }
        last_request.replace(Instant::now());
        true
    }
}

#[derive(Debug)]
pub enum PageReport<U> {
    Listings { page: u32, units: Vec<U> },
    Empty { page: u32 },
    Skipped {
        page: u32,
        attempts: u32,
        cause: HarvestError,
    },
}

/// Drives the page fetches of one (source, query) pair, in page order.
///
/// Stops for good after an empty page, after the last page of the range, or once the token
/// is cancelled. A page that keeps failing is skipped and the next page is tried.
pub struct Paginator<'a, S: Source> {
    source: &'a S,
    session: &'a mut S::Session,
    policy: &'a SourcePolicy,
    throttle: &'a Throttle,
    token: &'a CancellationToken,
    query: &'a str,
    pages: RangeInclusive<u32>,
    finished: bool,
    cancelled: bool,
    retries: usize,
}

impl<'a, S: Source> Paginator<'a, S> {
    pub fn new(
        source: &'a S,
        session: &'a mut S::Session,
        policy: &'a SourcePolicy,
        throttle: &'a Throttle,
        token: &'a CancellationToken,
        query: &'a str,
        pages: RangeInclusive<u32>,
    ) -> Self {
        Paginator {
            source,
            session,
            policy,
            throttle,
            token,
            query,
            pages,
            finished: false,
            cancelled: false,
            retries: 0,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    pub async fn next(&mut self) -> Option<PageReport<S::Unit>> {
        if self.finished {
            return None;
        }
        // The whole range was requested; a token tripped after that cancels nothing.
        if self.pages.is_empty() {
            self.finished = true;
            return None;
        }
        let token = self.token;
        if token.is_cancelled() {
            self.stop_cancelled();
            return None;
        }
        let page = self.pages.next()?;

        let mut attempts = 0;
        let mut last_cause = None;
        loop {
            if !self.throttle.wait(token).await || token.is_cancelled() {
                self.stop_cancelled();
                return last_cause.map(|cause| PageReport::Skipped {
                    page,
                    attempts,
                    cause,
                });
            }
            if attempts > 0 {
                self.retries += 1;
            }
            attempts += 1;

            let cause = match self
                .source
                .fetch_page(&mut *self.session, self.query, page)
                .await
            {
                PageFetchOutcome::Success(units) if !units.is_empty() => {
                    return Some(PageReport::Listings { page, units });
                }
                PageFetchOutcome::Success(_) | PageFetchOutcome::EmptyPage => {
                    self.finished = true;
                    return Some(PageReport::Empty { page });
                }
                PageFetchOutcome::FetchError(cause) => cause,
            };

            if attempts >= self.policy.attempts() || !cause.is_retryable() {
                return Some(PageReport::Skipped {
                    page,
                    attempts,
                    cause,
                });
            }
            if token.is_cancelled() {
                self.stop_cancelled();
                return Some(PageReport::Skipped {
                    page,
                    attempts,
                    cause,
                });
            }

            warn!(
                "[{}] page {} of {:?} failed (attempt {}/{}): {}",
                self.source.kind(),
                page,
                self.query,
                attempts,
                self.policy.attempts(),
                cause
            );
            tokio::select! {
                _ = tokio::time::sleep(self.policy.retry_backoff()) => {}
                _ = token.cancelled() => {
                    self.stop_cancelled();
                    return Some(PageReport::Skipped { page, attempts, cause });
                }
            }
            last_cause = Some(cause);
        }
    }

    fn stop_cancelled(&mut self) {
        self.cancelled = true;
        self.finished = true;
    }
}

/// Owns a worker's session for the worker's lifetime.
///
/// `release` closes it; a guard dropped without release closes it on the runtime instead.
pub struct SessionGuard<S: Source> {
    source: Arc<S>,
    session: Option<S::Session>,
}

impl<S: Source> SessionGuard<S> {
    pub async fn acquire(source: Arc<S>) -> Result<Self, HarvestError> {
        let session = source.open_session().await?;
        Ok(SessionGuard {
            source,
            session: Some(session),
        })
    }

    pub fn session_mut(&mut self) -> Option<&mut S::Session> {
        self.session.as_mut()
    }

    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            self.source.close_session(session).await;
        }
    }
}

impl<S: Source> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let source = Arc::clone(&self.source);
        warn!("[{}] Session dropped without release, closing", source.kind());
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { source.close_session(session).await });
            }
            Err(_) => warn!("[{}] No runtime left to close session", source.kind()),
        }
    }
}

/// One source together with its policy and throttle.
pub struct SourceHarvester<S: Source> {
    source: Arc<S>,
    policy: SourcePolicy,
    throttle: Throttle,
}

impl<S: Source> SourceHarvester<S> {
    pub fn new(source: S, policy: SourcePolicy) -> Self {
        let throttle = Throttle::new(policy.inter_page_delay());
        SourceHarvester {
            source: Arc::new(source),
            policy,
            throttle,
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn policy(&self) -> &SourcePolicy {
        &self.policy
    }

    /// Harvests every page of `task`, tagging each record with the task's query and platform.
    pub async fn run_task(
        &self,
        session: &mut S::Session,
        task: &HarvestTask,
        token: &CancellationToken,
    ) -> TaskReport {
        let kind = self.source.kind();
        let mut results = vec![];
        let mut stats = TaskStats::default();
        let mut paginator = Paginator::new(
            self.source.as_ref(),
            session,
            &self.policy,
            &self.throttle,
            token,
            &task.query,
            task.pages.clone(),
        );

        while let Some(report) = paginator.next().await {
            match report {
                PageReport::Listings { page, units } => {
                    stats.pages_fetched += 1;
                    debug!(
                        "[{}] {} listings on page {} of {:?}",
                        kind,
                        units.len(),
                        page,
                        task.query
                    );
                    for unit in units {
                        match self.source.extract(unit, &task.query).await {
                            Ok(raw) => {
                                results.push(HarvestResult::Record(raw.tag(&task.query, kind)))
                            }
                            Err(reason) => {
                                warn!(
                                    "[{}] Listing on page {} of {:?} dropped: {}",
                                    kind, page, task.query, reason
                                );
                                stats.count_failure(&reason);
                                results.push(HarvestResult::Failure(ExtractionFailure {
                                    reason,
                                    source_query: task.query.clone(),
                                    page,
                                    platform: kind,
                                }));
                            }
                        }
                    }
                }
                PageReport::Empty { page } => {
                    stats.pages_empty += 1;
                    debug!("[{}] No listings on page {} of {:?}, stopping", kind, page, task.query);
                }
                PageReport::Skipped {
                    page,
                    attempts,
                    cause,
                } => {
                    stats.pages_skipped += 1;
                    warn!(
                        "[{}] Skipping page {} of {:?} after {} attempt(s): {}",
                        kind, page, task.query, attempts, cause
                    );
                }
            }
        }

        stats.retries = paginator.retries();
        stats.cancelled = paginator.was_cancelled();
        if stats.cancelled {
            info!("[{}] {:?} cancelled after {} page(s)", kind, task.query, stats.pages_fetched);
        }

        TaskReport {
            task: task.clone(),
            results,
            stats,
        }
    }
}
