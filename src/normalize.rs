use crate::{
    data::{JobRecord, RawRecord, NOT_AVAILABLE},
    error::FailureReason,
};
use reqwest::Url;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Normalized {
    pub records: Vec<JobRecord>,
    pub discarded: usize,
}

/// Maps raw records onto the unified schema, dropping those without every mandatory field.
///
/// Order is preserved and no deduplication happens. Feeding the output back in returns it
/// unchanged.
pub fn normalize<I, R>(raw: I) -> Normalized
where
    I: IntoIterator<Item = R>,
    R: Into<RawRecord>,
{
    let mut out = Normalized::default();
    for r in raw {
        match normalize_record(r.into()) {
            Some(record) => out.records.push(record),
            None => out.discarded += 1,
        }
    }
    out
}

pub fn normalize_record(raw: RawRecord) -> Option<JobRecord> {
    let url = mandatory(raw.url)?;
    Url::parse(&url).ok()?;

    Some(JobRecord {
        source_query: raw.source_query,
        title: mandatory(raw.title)?,
        company: mandatory(raw.company)?,
        location: mandatory(raw.location)?,
        url,
        experience: optional(raw.experience),
        description: optional(raw.description),
        platform: raw.platform,
    })
}

/// Extractor-side check: the first mandatory field that is missing, if any.
pub(crate) fn check_required(record: &RawRecord) -> Result<(), FailureReason> {
    let fields = [
        ("title", &record.title),
        ("company", &record.company),
        ("location", &record.location),
        ("url", &record.url),
    ];
    for (name, value) in fields {
        if !is_present(value.as_deref()) {
            return Err(FailureReason::MissingRequiredField(name));
        }
    }
    Ok(())
}

fn is_present(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some(v) if !v.is_empty() && v != NOT_AVAILABLE)
}

fn mandatory(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| is_present(Some(v)))
}

fn optional(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
