//! Aggregator feeds (LinkedIn, Indeed) reached through a third-party search API.

mod client;

pub use client::{FeedClient, FeedQuery, FeedRow, JobSpyClient};

use crate::{
    data::{RawRecord, SourceKind},
    error::{FailureReason, HarvestError},
    normalize::check_required,
    utils::clean_text,
    PageFetchOutcome, Source,
};
use std::sync::Arc;

fn site_name(kind: SourceKind) -> Option<&'static str> {
    match kind {
        SourceKind::LinkedIn => Some("linkedin"),
        SourceKind::Indeed => Some("indeed"),
        SourceKind::Bayt | SourceKind::Naukrigulf => None,
    }
}

/// One aggregator platform. Page `n` is the `n`-th slice of `results_per_page` rows.
pub struct FeedSource {
    kind: SourceKind,
    site: &'static str,
    client: Arc<dyn FeedClient>,
    location: String,
    results_per_page: u32,
}

impl FeedSource {
    pub fn new(
        kind: SourceKind,
        client: Arc<dyn FeedClient>,
        location: impl Into<String>,
        results_per_page: u32,
    ) -> Result<Self, HarvestError> {
        let site = site_name(kind)
            .ok_or_else(|| HarvestError::Config(format!("{} is not an aggregator feed", kind)))?;
        if results_per_page == 0 {
            return Err(HarvestError::Config(
                "feed results_per_page must be greater than 0".into(),
            ));
        }
        Ok(FeedSource {
            kind,
            site,
            client,
            location: location.into(),
            results_per_page,
        })
    }

    fn offset(&self, page: u32) -> u32 {
        page.saturating_sub(1).saturating_mul(self.results_per_page)
    }
}

#[async_trait::async_trait]
impl Source for FeedSource {
    type Session = ();
    type Unit = FeedRow;

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn open_session(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn close_session(&self, _session: ()) {}

    async fn fetch_page(&self, _: &mut (), query: &str, page: u32) -> PageFetchOutcome<FeedRow> {
        let search = FeedQuery {
            site: self.site,
            search_term: query,
            location: &self.location,
            results_wanted: self.results_per_page,
            offset: self.offset(page),
        };
        match self.client.search(&search).await {
            Ok(rows) if rows.is_empty() => PageFetchOutcome::EmptyPage,
            Ok(rows) => PageFetchOutcome::Success(rows),
            Err(e) => PageFetchOutcome::FetchError(e),
        }
    }

    async fn extract(&self, row: FeedRow, _query: &str) -> Result<RawRecord, FailureReason> {
        let record = RawRecord {
            title: row.title.and_then(clean_text),
            company: row.company.and_then(clean_text),
            location: row.location.and_then(clean_text),
            url: row.url.and_then(clean_text),
            experience: row.experience.and_then(clean_text),
            description: row.description.and_then(clean_text),
            ..Default::default()
        };
        check_required(&record)?;
        Ok(record)
    }
}
