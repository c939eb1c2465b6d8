use crate::{data::SourceKind, summary::RunSummary};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// One finished (query, source) task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitCompleted {
    pub kind: SourceKind,
    pub query: String,
    pub records: usize,
    pub pages: usize,
    pub cancelled: bool,
}

/// Observer of run progress. Called from the merge loop, never from workers.
pub trait Progress: Send + Sync {
    fn begin(&self, _total: usize) {}
    fn unit_completed(&self, _unit: &UnitCompleted) {}
    fn finish(&self, _summary: &RunSummary) {}
}

pub struct NullProgress;

impl Progress for NullProgress {}

#[derive(Default)]
pub struct TracingProgress {
    total: AtomicUsize,
    done: AtomicUsize,
    records: AtomicUsize,
}

impl TracingProgress {
    pub fn new() -> Self {
        TracingProgress::default()
    }
}

impl Progress for TracingProgress {
    fn begin(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        info!("Harvesting {} task(s)", total);
    }

    fn unit_completed(&self, unit: &UnitCompleted) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let records = self.records.fetch_add(unit.records, Ordering::SeqCst) + unit.records;
        info!(
            "[{}] {:?}: {} record(s) from {} page(s){} [{}/{}, {} total]",
            unit.kind,
            unit.query,
            unit.records,
            unit.pages,
            if unit.cancelled { ", cancelled" } else { "" },
            done,
            self.total.load(Ordering::SeqCst),
            records
        );
    }

    fn finish(&self, summary: &RunSummary) {
        info!("Finished: {}", summary);
    }
}
