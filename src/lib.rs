pub mod bayt;
pub mod browser;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod naukrigulf;
pub mod output;
pub mod progress;
pub mod storage;

mod data;
mod error;
mod harvester;
mod normalize;
mod orchestrator;
mod summary;
mod utils;

#[cfg(test)]
mod testing;

pub use data::{
    ExtractionFailure, HarvestResult, HarvestTask, JobRecord, RawRecord, SourceKind, SourceType,
    NOT_AVAILABLE,
};
pub use error::{FailureReason, HarvestError};
pub use harvester::{PageReport, Paginator, SessionGuard, SourceHarvester, Throttle};
pub use normalize::{normalize, normalize_record, Normalized};
pub use orchestrator::{Harvest, Orchestrator};
pub use summary::{RunSummary, TaskReport, TaskStats};

/// What one page fetch produced.
#[derive(Debug)]
pub enum PageFetchOutcome<U> {
    Success(Vec<U>),
    /// A valid page without listings; pagination stops here.
    EmptyPage,
    FetchError(HarvestError),
}

/// A job board the harvester can paginate.
///
/// `Session` is the per-worker resource the source needs to fetch pages (a browser-engine
/// instance for browser-driven sources, `()` for the rest). `Unit` is one listing as handed
/// out by `fetch_page` and consumed by `extract`.
#[async_trait::async_trait]
pub trait Source: Send + Sync + 'static {
    type Session: Send + 'static;
    type Unit: Send + 'static;

    fn kind(&self) -> SourceKind;

    async fn open_session(&self) -> Result<Self::Session, HarvestError>;
    async fn close_session(&self, session: Self::Session);

    async fn fetch_page(
        &self,
        session: &mut Self::Session,
        query: &str,
        page: u32,
    ) -> PageFetchOutcome<Self::Unit>;

    async fn extract(&self, unit: Self::Unit, query: &str) -> Result<RawRecord, FailureReason>;
}
