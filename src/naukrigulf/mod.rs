//! Naukrigulf, a client-rendered job board driven through a browser engine.

mod extractor;

pub use extractor::extract_listing;

use crate::{
    browser::{BrowserEngine, BrowserSession},
    config::BrowserSettings,
    data::{RawRecord, SourceKind},
    error::{FailureReason, HarvestError},
    utils::slugify,
    PageFetchOutcome, Source,
};
use lazy_static::lazy_static;
use reqwest::Url;
use tracing::debug;

pub const BASE_URL: &str = "https://www.naukrigulf.com";
pub const LISTING: &str = ".ng-box.srp-tuple";

lazy_static! {
    static ref BASE: Url = Url::parse(BASE_URL).expect("Invalid base url");
}

pub struct NaukrigulfSource<E: BrowserEngine> {
    engine: E,
    settings: BrowserSettings,
}

impl<E: BrowserEngine> NaukrigulfSource<E> {
    pub fn new(engine: E, settings: BrowserSettings) -> Self {
        NaukrigulfSource { engine, settings }
    }

    pub fn page_url(&self, query: &str, page: u32) -> String {
        format!("{}/{}-jobs-{}", BASE_URL, slugify(query), page)
    }

    /// Listings, or the no-results marker when one is configured.
    fn awaited_selector(&self) -> String {
        match &self.settings.no_results_selector {
            Some(marker) => format!("{}, {}", LISTING, marker),
            None => LISTING.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl<E: BrowserEngine> Source for NaukrigulfSource<E> {
    type Session = E::Session;
    type Unit = <E::Session as BrowserSession>::Element;

    fn kind(&self) -> SourceKind {
        SourceKind::Naukrigulf
    }

    async fn open_session(&self) -> Result<E::Session, HarvestError> {
        self.engine.launch().await
    }

    async fn close_session(&self, session: E::Session) {
        self.engine.shutdown(session).await
    }

    async fn fetch_page(
        &self,
        session: &mut E::Session,
        query: &str,
        page: u32,
    ) -> PageFetchOutcome<Self::Unit> {
        let url = self.page_url(query, page);
        if let Err(e) = session.navigate(&url).await {
            return PageFetchOutcome::FetchError(e);
        }

        match session
            .wait_for_element(&self.awaited_selector(), self.settings.wait_timeout())
            .await
        {
            Ok(()) => {}
            Err(HarvestError::ElementNotFound(_)) if self.settings.timeout_is_empty => {
                debug!("No listings rendered at {}", url);
                return PageFetchOutcome::EmptyPage;
            }
            Err(HarvestError::ElementNotFound(selector)) => {
                return PageFetchOutcome::FetchError(HarvestError::Browser(format!(
                    "{} did not render {} in time",
                    url, selector
                )));
            }
            Err(e) => return PageFetchOutcome::FetchError(e),
        }

        // Whatever rendered, an empty listing set means the marker did.
        match session.find_all(LISTING).await {
            Ok(listings) if listings.is_empty() => PageFetchOutcome::EmptyPage,
            Ok(listings) => PageFetchOutcome::Success(listings),
            Err(e) => PageFetchOutcome::FetchError(e),
        }
    }

    async fn extract(&self, unit: Self::Unit, _query: &str) -> Result<RawRecord, FailureReason> {
        extract_listing(&unit, &BASE).await
    }
}
