//! Bayt, a server-rendered job board fetched as plain HTML.

mod extractor;

pub use extractor::{extract_listing, split_listings};

use crate::{
    data::{RawRecord, SourceKind},
    error::{FailureReason, HarvestError},
    fetch::Fetcher,
    utils::slugify,
    PageFetchOutcome, Source,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, USER_AGENT},
    Url,
};
use std::sync::Arc;

pub const BASE_URL: &str = "https://www.bayt.com";

pub struct BaytSource {
    fetcher: Arc<dyn Fetcher>,
    base: Url,
    headers: HeaderMap,
}

impl BaytSource {
    pub fn new(fetcher: Arc<dyn Fetcher>, user_agent: &str) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|e| HarvestError::Config(format!("invalid user agent: {}", e)))?;
        headers.insert(USER_AGENT, user_agent);

        Ok(BaytSource {
            fetcher,
            base: parse_base(BASE_URL)?,
            headers,
        })
    }

    pub fn with_base_url(mut self, base: &str) -> Result<Self, HarvestError> {
        self.base = parse_base(base)?;
        Ok(self)
    }

    pub fn page_url(&self, query: &str, page: u32) -> String {
        format!(
            "{}/en/international/jobs/{}-jobs/?page={}",
            self.base.as_str().trim_end_matches('/'),
            slugify(query),
            page
        )
    }
}

fn parse_base(base: &str) -> Result<Url, HarvestError> {
    Url::parse(base).map_err(|e| HarvestError::Config(format!("invalid base url {}: {}", base, e)))
}

#[async_trait::async_trait]
impl Source for BaytSource {
    type Session = ();
    type Unit = String;

    fn kind(&self) -> SourceKind {
        SourceKind::Bayt
    }

    async fn open_session(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn close_session(&self, _session: ()) {}

    async fn fetch_page(&self, _: &mut (), query: &str, page: u32) -> PageFetchOutcome<String> {
        let url = self.page_url(query, page);
        let response = match self.fetcher.fetch(&url, &self.headers).await {
            Ok(response) => response,
            Err(e) => return PageFetchOutcome::FetchError(e),
        };

        // Past the last result page Bayt answers 404.
        if response.status == 404 {
            return PageFetchOutcome::EmptyPage;
        }
        if !response.is_success() {
            return PageFetchOutcome::FetchError(HarvestError::Http {
                url,
                status: response.status,
            });
        }

        let units = split_listings(&response.body);
        if units.is_empty() {
            PageFetchOutcome::EmptyPage
        } else {
            PageFetchOutcome::Success(units)
        }
    }

    async fn extract(&self, unit: String, _query: &str) -> Result<RawRecord, FailureReason> {
        extract_listing(&unit, &self.base)
    }
}
