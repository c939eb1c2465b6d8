use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("Transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser engine unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid config file")]
    ConfigFile(#[from] serde_json::Error),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),

    #[error("CSV error")]
    Csv(#[from] csv::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    pub fn transport(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        HarvestError::Transport {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Whether a page fetch that failed with this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            HarvestError::Transport { .. } | HarvestError::Browser(_) => true,
            HarvestError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Why a single listing unit did not produce a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingRequiredField(&'static str),
    MalformedMarkup(String),
}

impl FailureReason {
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::MissingRequiredField(_) => "missing-required-field",
            FailureReason::MalformedMarkup(_) => "malformed-markup",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::MissingRequiredField(field) => write!(f, "{} ({})", self.kind(), field),
            FailureReason::MalformedMarkup(detail) => write!(f, "{} ({})", self.kind(), detail),
        }
    }
}
