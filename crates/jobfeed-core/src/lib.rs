//! Core domain model for the job feed widget.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobfeed-core";

/// Upstream identifiers arrive either as numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(i64),
    Text(String),
}

impl JobId {
    /// Short random token used when upstream omits the identifier.
    pub fn synthetic() -> Self {
        let mut token = Uuid::new_v4().simple().to_string();
        token.truncate(9);
        JobId::Text(token)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Number(n) => write!(f, "{n}"),
            JobId::Text(s) => f.write_str(s),
        }
    }
}

/// Stable record shape consumed by everything downstream of the fetch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalJobRecord {
    pub id: JobId,
    pub title: String,
    /// Assembled HTML: base description followed by the optional sections.
    pub description: String,
    /// Tag-free rendering of the base description only.
    pub summary: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub department: String,
    pub contract_type: Option<String>,
    pub published_at: Option<String>,
    pub apply_url: Option<String>,
    pub remote: bool,
}

impl CanonicalJobRecord {
    /// Publication instant used for ordering. Missing or unparseable dates map to the epoch.
    pub fn published_instant(&self) -> DateTime<Utc> {
        self.published_at
            .as_deref()
            .and_then(parse_upstream_date)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    /// `City - ST` when both parts are known, otherwise just the city.
    pub fn location_label(&self) -> Option<String> {
        let city = self.city.as_deref()?;
        Some(match self.state.as_deref() {
            Some(state) => format!("{city} - {state}"),
            None => city.to_string(),
        })
    }
}

/// Accepts RFC 3339 timestamps plus the bare forms the upstream feed emits.
pub fn parse_upstream_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Failure classes kept for diagnostics once a fetch cycle has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 401/403 from upstream; never retried through a relay.
    Auth,
    /// Transport-level rejection (connect, TLS, CORS-style refusal).
    Network,
    /// Non-success HTTP status other than auth.
    Http,
    /// Success status whose body was not JSON.
    MalformedPayload,
    /// Every strategy failed without a captured error.
    Unreachable,
}
