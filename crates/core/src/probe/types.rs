use std::fmt;

use serde::{Deserialize, Serialize};

/// One logical request against the warmed API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeTarget {
    /// `GET {base}/artist/{id}`
    Artist { id: String },
    /// `GET {base}/search?type=all&query={query}`
    TextSearch { query: String },
    /// `GET {base}/album/{id}`
    ReleaseGroup { id: String },
}

impl ProbeTarget {
    pub fn artist(id: impl Into<String>) -> Self {
        ProbeTarget::Artist { id: id.into() }
    }

    pub fn text_search(query: impl Into<String>) -> Self {
        ProbeTarget::TextSearch {
            query: query.into(),
        }
    }

    pub fn release_group(id: impl Into<String>) -> Self {
        ProbeTarget::ReleaseGroup { id: id.into() }
    }

    /// Full request URL under `base_url`.
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            ProbeTarget::Artist { id } => format!("{}/artist/{}", base, id),
            ProbeTarget::TextSearch { query } => format!(
                "{}/search?type=all&query={}",
                base,
                urlencoding::encode(query)
            ),
            ProbeTarget::ReleaseGroup { id } => format!("{}/album/{}", base, id),
        }
    }
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Artist { id } => write!(f, "artist/{}", id),
            ProbeTarget::TextSearch { query } => write!(f, "search:{:?}", query),
            ProbeTarget::ReleaseGroup { id } => write!(f, "album/{}", id),
        }
    }
}

/// Observed result of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The server answered with this HTTP status.
    Status(u16),
    /// No answer within the request timeout.
    Timeout,
    /// The request failed before a status arrived; holds the failure kind.
    ConnectionError(String),
}

impl ProbeOutcome {
    /// 200 is the only signal that the entity is served from cache.
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Status(200))
    }

    /// Whether this outcome extends the consecutive-failure streak.
    ///
    /// Rate limiting and transport failures point at an unhealthy API; any
    /// other HTTP answer (including 404 and 503) means the API is responding.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            ProbeOutcome::Status(429) | ProbeOutcome::Timeout | ProbeOutcome::ConnectionError(_)
        )
    }

    /// Value persisted in the ledger's `last_status_code` column.
    pub fn code_label(&self) -> String {
        match self {
            ProbeOutcome::Status(code) => code.to_string(),
            ProbeOutcome::Timeout => "TIMEOUT".to_string(),
            ProbeOutcome::ConnectionError(kind) => format!("EXC:{}", kind),
        }
    }

    /// Coarse class for metric labels.
    pub fn class(&self) -> &'static str {
        match self {
            ProbeOutcome::Status(200) => "success",
            ProbeOutcome::Status(429) => "rate_limited",
            ProbeOutcome::Status(_) => "http_error",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::ConnectionError(_) => "connection_error",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code_label())
    }
}

/// Result of probing the API root before a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub available: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}
