use crate::{
    data::{HarvestResult, HarvestTask, JobRecord, SourceKind},
    error::FailureReason,
};
use itertools::Itertools;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub pages_fetched: usize,
    pub pages_empty: usize,
    pub pages_skipped: usize,
    pub retries: usize,
    pub missing_required_field: usize,
    pub malformed_markup: usize,
    /// Stopped early by cancellation; whatever was harvested before is still reported.
    pub cancelled: bool,
}

impl TaskStats {
    pub(crate) fn count_failure(&mut self, reason: &FailureReason) {
        match reason {
            FailureReason::MissingRequiredField(_) => self.missing_required_field += 1,
            FailureReason::MalformedMarkup(_) => self.malformed_markup += 1,
        }
    }
}

/// Everything one task produced, sent to the merge step in a single batch.
#[derive(Debug)]
pub struct TaskReport {
    pub task: HarvestTask,
    pub results: Vec<HarvestResult>,
    pub stats: TaskStats,
}

impl TaskReport {
    pub fn record_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, HarvestResult::Record(_)))
            .count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_cancelled: usize,
    /// Never started because their source could not start a worker.
    pub tasks_abandoned: usize,
    pub pages_fetched: usize,
    pub pages_empty: usize,
    pub pages_skipped: usize,
    pub retries: usize,
    pub missing_required_field: usize,
    pub malformed_markup: usize,
    /// Dropped at normalization for a missing mandatory field.
    pub discarded: usize,
    pub sources_unavailable: BTreeSet<SourceKind>,
    pub records_per_platform: BTreeMap<String, usize>,
}

impl RunSummary {
    pub(crate) fn record_task(&mut self, stats: &TaskStats) {
        if stats.cancelled {
            self.tasks_cancelled += 1;
        } else {
            self.tasks_completed += 1;
        }
        self.pages_fetched += stats.pages_fetched;
        self.pages_empty += stats.pages_empty;
        self.pages_skipped += stats.pages_skipped;
        self.retries += stats.retries;
        self.missing_required_field += stats.missing_required_field;
        self.malformed_markup += stats.malformed_markup;
    }

    pub(crate) fn count_records(&mut self, records: &[JobRecord]) {
        self.records_per_platform = records
            .iter()
            .counts_by(|r| r.platform.clone())
            .into_iter()
            .collect();
    }

    pub fn records(&self) -> usize {
        self.records_per_platform.values().sum()
    }

    pub fn extraction_failures(&self) -> usize {
        self.missing_required_field + self.malformed_markup
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records ({}); tasks {}/{} done, {} cancelled, {} abandoned; \
             pages {} fetched, {} empty, {} skipped, {} retries; \
             {} extraction failures ({} missing-required-field, {} malformed-markup); \
             {} discarded",
            self.records(),
            self.records_per_platform
                .iter()
                .map(|(platform, n)| format!("{}: {}", platform, n))
                .join(", "),
            self.tasks_completed,
            self.tasks_total,
            self.tasks_cancelled,
            self.tasks_abandoned,
            self.pages_fetched,
            self.pages_empty,
            self.pages_skipped,
            self.retries,
            self.extraction_failures(),
            self.missing_required_field,
            self.malformed_markup,
            self.discarded,
        )?;
        if !self.sources_unavailable.is_empty() {
            write!(
                f,
                "; unavailable: {}",
                self.sources_unavailable.iter().join(", ")
            )?;
        }
        Ok(())
    }
}
