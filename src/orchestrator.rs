use crate::{
    config::SourcePolicy,
    data::{ExtractionFailure, HarvestResult, HarvestTask, JobRecord, SourceKind},
    error::HarvestError,
    harvester::{SessionGuard, SourceHarvester},
    normalize::normalize,
    progress::{NullProgress, Progress, UnitCompleted},
    summary::{RunSummary, TaskReport},
    Source,
};
use itertools::Itertools;
use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type TaskQueue = Arc<Mutex<VecDeque<HarvestTask>>>;

enum WorkerEvent {
    Started(SourceKind),
    Completed(TaskReport),
    Unavailable { kind: SourceKind, cause: HarvestError },
}

/// Object-safe face of a `SourceHarvester`, whatever its session and unit types.
trait SourceWorkers: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn policy(&self) -> &SourcePolicy;
    fn spawn_workers(
        self: Arc<Self>,
        queue: TaskQueue,
        workers: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
        token: CancellationToken,
    ) -> Vec<JoinHandle<()>>;
}

impl<S: Source> SourceWorkers for SourceHarvester<S> {
    fn kind(&self) -> SourceKind {
        self.source().kind()
    }

    fn policy(&self) -> &SourcePolicy {
        SourceHarvester::policy(self)
    }

    fn spawn_workers(
        self: Arc<Self>,
        queue: TaskQueue,
        workers: usize,
        events: mpsc::UnboundedSender<WorkerEvent>,
        token: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|id| {
                tokio::spawn(work(
                    Arc::clone(&self),
                    id,
                    Arc::clone(&queue),
                    events.clone(),
                    token.clone(),
                ))
            })
            .collect()
    }
}

/// One worker: a session for its whole life, tasks pulled from the source queue until it is
/// empty or the run is cancelled.
async fn work<S: Source>(
    harvester: Arc<SourceHarvester<S>>,
    id: usize,
    queue: TaskQueue,
    events: mpsc::UnboundedSender<WorkerEvent>,
    token: CancellationToken,
) {
    let kind = harvester.source().kind();
    if token.is_cancelled() || queue.lock().await.is_empty() {
        return;
    }

    let mut guard = match SessionGuard::acquire(Arc::clone(harvester.source())).await {
        Ok(guard) => guard,
        Err(cause) => {
            // Receiver only goes away once every worker is done.
            let _ = events.send(WorkerEvent::Unavailable { kind, cause });
            return;
        }
    };
    debug!("[{}] Worker {} started", kind, id);
    let _ = events.send(WorkerEvent::Started(kind));

    while !token.is_cancelled() {
        let Some(task) = queue.lock().await.pop_front() else {
            break;
        };
        let Some(session) = guard.session_mut() else {
            break;
        };
        let report = harvester.run_task(session, &task, &token).await;
        if events.send(WorkerEvent::Completed(report)).is_err() {
            break;
        }
    }

    guard.release().await;
    debug!("[{}] Worker {} stopped", kind, id);
}

/// The merged outcome of one run.
#[derive(Debug)]
pub struct Harvest {
    pub records: Vec<JobRecord>,
    pub failures: Vec<ExtractionFailure>,
    pub summary: RunSummary,
}

pub struct Orchestrator {
    sources: Vec<Arc<dyn SourceWorkers>>,
    progress: Arc<dyn Progress>,
    deadline: Option<Duration>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Orchestrator::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Orchestrator {
            sources: vec![],
            progress: Arc::new(NullProgress),
            deadline: None,
        }
    }

    pub fn with_source<S: Source>(mut self, source: S, policy: SourcePolicy) -> Self {
        self.sources
            .push(Arc::new(SourceHarvester::new(source, policy)));
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn sources(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// Harvests every (query, source) pair and merges the results into one table.
    ///
    /// Blank and repeated queries are skipped. Cancelling `token`, or reaching the deadline,
    /// lets in-flight pages finish and keeps everything harvested up to that point.
    pub async fn run(&self, queries: &[String], token: &CancellationToken) -> Harvest {
        let token = token.child_token();
        let timer = self.deadline.map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Deadline of {:?} reached, stopping", deadline);
                token.cancel();
            })
        });

        let queries = queries
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .unique()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut summary = RunSummary::default();
        let (events, mut inbox) = mpsc::unbounded_channel();
        let mut queues = vec![];
        let mut handles = vec![];
        for source in &self.sources {
            let tasks = queries
                .iter()
                .map(|q| HarvestTask::new(q.clone(), source.kind(), source.policy().max_pages))
                .collect::<VecDeque<_>>();
            summary.tasks_total += tasks.len();

            let workers = source.policy().concurrency.max(1).min(tasks.len());
            let queue = Arc::new(Mutex::new(tasks));
            handles.extend(Arc::clone(source).spawn_workers(
                Arc::clone(&queue),
                workers,
                events.clone(),
                token.clone(),
            ));
            queues.push((source.kind(), queue));
        }
        drop(events);
        self.progress.begin(summary.tasks_total);

        let mut raw = vec![];
        let mut failures = vec![];
        let mut started = BTreeSet::new();
        let mut failed_to_start = BTreeSet::new();
        while let Some(event) = inbox.recv().await {
            match event {
                WorkerEvent::Started(kind) => {
                    started.insert(kind);
                }
                WorkerEvent::Completed(report) => {
                    summary.record_task(&report.stats);
                    self.progress.unit_completed(&UnitCompleted {
                        kind: report.task.source,
                        query: report.task.query.clone(),
                        records: report.record_count(),
                        pages: report.stats.pages_fetched,
                        cancelled: report.stats.cancelled,
                    });
                    for result in report.results {
                        match result {
                            HarvestResult::Record(record) => raw.push(record),
                            HarvestResult::Failure(failure) => failures.push(failure),
                        }
                    }
                }
                WorkerEvent::Unavailable { kind, cause } => {
                    error!("[{}] Worker could not start: {}", kind, cause);
                    failed_to_start.insert(kind);
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker failed: {}", e);
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }
        // Unavailable means none of the source's workers got a session.
        summary.sources_unavailable = failed_to_start.difference(&started).copied().collect();

        for (kind, queue) in queues {
            let left = queue.lock().await.len();
            if left == 0 {
                continue;
            }
            if summary.sources_unavailable.contains(&kind) {
                summary.tasks_abandoned += left;
            } else {
                summary.tasks_cancelled += left;
            }
        }

        let normalized = normalize(raw);
        if normalized.discarded > 0 {
            info!("Discarded {} record(s) missing a mandatory field", normalized.discarded);
        }
        summary.discarded = normalized.discarded;
        summary.count_records(&normalized.records);
        self.progress.finish(&summary);

        Harvest {
            records: normalized.records,
            failures,
            summary,
        }
    }
}
