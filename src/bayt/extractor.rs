use crate::{
    data::RawRecord,
    error::FailureReason,
    normalize::check_required,
    utils::{absolutize, clean_text},
};
use lazy_static::lazy_static;
use reqwest::Url;
use scraper::{Html, Selector};

const E: &str = "Invalid selector";
lazy_static! {
    static ref LISTING: Selector = Selector::parse("li[data-js-job]").expect(E);
    static ref HEADING: Selector = Selector::parse("h2").expect(E);
    static ref HEADING_LINK: Selector = Selector::parse("h2 a[href]").expect(E);
    static ref COMPANY: Selector = Selector::parse("div.t-nowrap.p10l span").expect(E);
    static ref LOCATION: Selector = Selector::parse("div.t-mute.t-small").expect(E);
}

/// Outer HTML of every listing on a results page, in page order.
pub fn split_listings(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&LISTING).map(|el| el.html()).collect()
}

pub fn extract_listing(unit: &str, base: &Url) -> Result<RawRecord, FailureReason> {
    let fragment = Html::parse_fragment(unit);
    let text = |selector: &Selector| {
        fragment
            .select(selector)
            .next()
            .and_then(|el| clean_text(el.text().collect::<String>()))
    };

    let url = match fragment
        .select(&HEADING_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .filter(|href| !href.trim().is_empty())
    {
        Some(href) => Some(absolutize(base, href).map_err(FailureReason::MalformedMarkup)?),
        None => None,
    };

    let record = RawRecord {
        title: text(&HEADING),
        company: text(&COMPANY),
        location: text(&LOCATION),
        url,
        ..Default::default()
    };
    check_required(&record)?;
    Ok(record)
}
