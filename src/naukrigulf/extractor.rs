use crate::{
    browser::BrowserElement,
    data::RawRecord,
    error::{FailureReason, HarvestError},
    normalize::check_required,
    utils::{absolutize, clean_text},
};
use reqwest::Url;
use tracing::debug;

const TITLE: &str = ".designation-title";
const COMPANY: &str = ".info-org";
const LOCATION: &str = ".info-loc";
const EXPERIENCE: &str = ".info-exp";
const DESCRIPTION: &str = ".description";

fn malformed(e: HarvestError) -> FailureReason {
    FailureReason::MalformedMarkup(e.to_string())
}

async fn probe<El: BrowserElement>(
    listing: &El,
    selector: &str,
) -> Result<Option<String>, HarvestError> {
    match listing.find_one(selector).await? {
        Some(el) => Ok(el.text().await?.and_then(clean_text)),
        None => Ok(None),
    }
}

/// A failed optional probe only loses that field.
async fn optional<El: BrowserElement>(listing: &El, selector: &str) -> Option<String> {
    match probe(listing, selector).await {
        Ok(value) => value,
        Err(e) => {
            debug!("Probe {} failed: {}", selector, e);
            None
        }
    }
}

pub async fn extract_listing<El: BrowserElement>(
    listing: &El,
    base: &Url,
) -> Result<RawRecord, FailureReason> {
    let (title, href) = match listing.find_one(TITLE).await.map_err(malformed)? {
        Some(el) => {
            let text = el.text().await.map_err(malformed)?.and_then(clean_text);
            // Some layouts render the title as the link itself.
            let href = match el.attribute("href").await.map_err(malformed)? {
                Some(href) => Some(href),
                None => el.ancestor_attribute("a", "href").await.map_err(malformed)?,
            };
            (text, href)
        }
        None => (None, None),
    };
    let url = href
        .filter(|href| !href.trim().is_empty())
        .map(|href| absolutize(base, &href))
        .transpose()
        .map_err(FailureReason::MalformedMarkup)?;

    let record = RawRecord {
        title,
        company: probe(listing, COMPANY).await.map_err(malformed)?,
        location: probe(listing, LOCATION).await.map_err(malformed)?,
        url,
        experience: optional(listing, EXPERIENCE).await,
        description: optional(listing, DESCRIPTION).await,
        ..Default::default()
    };
    check_required(&record)?;
    Ok(record)
}

/// A listing with title, location and experience; `href` and `company` are optional.
#[cfg(test)]
pub(crate) fn fake_listing(
    href: Option<&str>,
    company: Option<&str>,
) -> crate::testing::FakeElement {
    use crate::testing::FakeElement;

    let mut title = FakeElement::with_text("  Data Scientist ");
    if let Some(href) = href {
        title = title.ancestor_attr("href", href);
    }
    let mut listing = FakeElement::default()
        .child(TITLE, title)
        .child(LOCATION, FakeElement::with_text("Dubai - UAE"))
        .child(EXPERIENCE, FakeElement::with_text("3 - 5 Years"));
    if let Some(company) = company {
        listing = listing.child(COMPANY, FakeElement::with_text(company));
    }
    listing
}
