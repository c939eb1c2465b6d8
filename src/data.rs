use crate::error::FailureReason;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive};

/// Value written into optional fields a source does not provide.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bayt,
    Naukrigulf,
    #[value(name = "linkedin")]
    LinkedIn,
    Indeed,
}

/// How a source is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    StaticHtml,
    Browser,
    Feed,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Bayt,
        SourceKind::Naukrigulf,
        SourceKind::LinkedIn,
        SourceKind::Indeed,
    ];

    pub fn platform(&self) -> &'static str {
        match self {
            SourceKind::Bayt => "Bayt",
            SourceKind::Naukrigulf => "Naukrigulf",
            SourceKind::LinkedIn => "LinkedIn",
            SourceKind::Indeed => "Indeed",
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            SourceKind::Bayt => SourceType::StaticHtml,
            SourceKind::Naukrigulf => SourceType::Browser,
            SourceKind::LinkedIn | SourceKind::Indeed => SourceType::Feed,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform())
    }
}

/// A record as it leaves an extractor. Any field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub source_query: String,
    pub platform: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub experience: Option<String>,
    pub description: Option<String>,
}

impl RawRecord {
    pub(crate) fn tag(mut self, query: &str, kind: SourceKind) -> Self {
        self.source_query = query.to_string();
        self.platform = kind.platform().to_string();
        self
    }
}

impl From<JobRecord> for RawRecord {
    fn from(r: JobRecord) -> Self {
        RawRecord {
            source_query: r.source_query,
            platform: r.platform,
            title: Some(r.title),
            company: Some(r.company),
            location: Some(r.location),
            url: Some(r.url),
            experience: Some(r.experience),
            description: Some(r.description),
        }
    }
}

/// One row of the merged table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "search_query")]
    pub source_query: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub experience: String,
    pub description: String,
    pub platform: String,
}

impl fmt::Display for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Title           : {}", self.title)?;
        writeln!(f, "Company         : {}", self.company)?;
        writeln!(f, "Location        : {}", self.location)?;
        writeln!(f, "Experience      : {}", self.experience)?;
        writeln!(f, "Platform        : {}", self.platform)?;
        writeln!(f, "Query           : {}", self.source_query)?;
        writeln!(f, "Url             : {}", self.url)
    }
}

/// One (query, source, page-range) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestTask {
    pub query: String,
    pub source: SourceKind,
    pub pages: RangeInclusive<u32>,
}

impl HarvestTask {
    pub fn new(query: impl Into<String>, source: SourceKind, max_pages: u32) -> Self {
        HarvestTask {
            query: query.into(),
            source,
            pages: 1..=max_pages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub reason: FailureReason,
    pub source_query: String,
    pub page: u32,
    pub platform: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestResult {
    Record(RawRecord),
    Failure(ExtractionFailure),
}
