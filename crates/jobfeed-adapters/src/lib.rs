//! Upstream job-feed adapter: page payload parsing and record normalization.

pub mod html;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jobfeed_core::{CanonicalJobRecord, JobId};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use tracing::warn;

pub use html::{format_description, has_block_tags, repair_plain_text, strip_tags};

pub const CRATE_NAME: &str = "jobfeed-adapters";

pub const UNTITLED_JOB: &str = "Vaga sem título";
pub const DEFAULT_DEPARTMENT: &str = "General";

const TITLE_PREFIX: &str = "vaga para";
const REMOTE_MARKERS: [&str; 2] = ["remote", "remoto"];

/// Optional sections appended to the description, in display order.
const SECTIONS: [(Section, &str); 5] = [
    (Section::Requirements, "Requisitos"),
    (Section::Education, "Escolaridade"),
    (Section::Qualification, "Qualificações"),
    (Section::Benefits, "Benefícios"),
    (Section::WorkSchedule, "Horário de Trabalho"),
];

#[derive(Debug, Clone, Copy)]
enum Section {
    Requirements,
    Education,
    Qualification,
    Benefits,
    WorkSchedule,
}

/// Loosely-typed upstream record. Null, empty and non-text values all read as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUpstreamRecord {
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub requirements: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub education: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub qualification: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub benefits: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub work_schedule: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub contract_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub acting_area: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub occupation: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub publication_date: Option<String>,
    #[serde(default, rename = "created_at", deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub subscription_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub url: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) if !s.is_empty() => Some(s),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl RawUpstreamRecord {
    /// Reads any JSON value; non-object entries become an all-default record.
    pub fn from_value(value: &JsonValue) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    fn section(&self, section: Section) -> Option<&str> {
        let value = match section {
            Section::Requirements => &self.requirements,
            Section::Education => &self.education,
            Section::Qualification => &self.qualification,
            Section::Benefits => &self.benefits,
            Section::WorkSchedule => &self.work_schedule,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Maps the raw record into the canonical shape. Pure; never fails.
    pub fn normalize(&self) -> CanonicalJobRecord {
        let (city, state) = self
            .location
            .as_deref()
            .map(parse_location)
            .unwrap_or((None, None));

        let raw_title = self.title.as_deref().unwrap_or(UNTITLED_JOB);
        let remote = is_remote(raw_title) || self.location.as_deref().is_some_and(is_remote);

        let base = self.description.as_deref().unwrap_or_default();

        CanonicalJobRecord {
            id: normalize_id(self.id.as_ref()),
            title: clean_title(raw_title),
            description: self.assemble_description(base),
            summary: strip_tags(base),
            city,
            state,
            department: self
                .acting_area
                .clone()
                .or_else(|| self.occupation.clone())
                .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
            contract_type: self.contract_type.as_deref().and_then(clean_contract_type),
            published_at: self.publication_date.clone().or_else(|| self.created_at.clone()),
            apply_url: self.subscription_url.clone().or_else(|| self.url.clone()),
            remote,
        }
    }

    fn assemble_description(&self, base: &str) -> String {
        let mut out = format_description(base);
        for (section, heading) in SECTIONS {
            if let Some(text) = self.section(section) {
                out.push_str("<br><br><h3><strong>");
                out.push_str(heading);
                out.push_str("</strong></h3>");
                out.push_str(&format_description(text));
            }
        }
        out
    }
}

/// Normalizes one page entry; `None` only for a null entry.
pub fn normalize(raw: &JsonValue) -> Option<CanonicalJobRecord> {
    if raw.is_null() {
        return None;
    }
    Some(RawUpstreamRecord::from_value(raw).normalize())
}

/// Normalizes every entry and orders the result newest first.
pub fn normalize_all(raw: &[JsonValue]) -> Vec<CanonicalJobRecord> {
    let mut jobs: Vec<_> = raw.iter().filter_map(normalize).collect();
    sort_by_publication(&mut jobs);
    jobs
}

/// Descending publication date; stable, so undated records keep upstream order at the tail.
pub fn sort_by_publication(jobs: &mut [CanonicalJobRecord]) {
    jobs.sort_by_key(|job| std::cmp::Reverse(job.published_instant()));
}

fn normalize_id(raw: Option<&JsonValue>) -> JobId {
    match raw {
        Some(JsonValue::Number(n)) => match n.as_i64() {
            Some(0) => JobId::synthetic(),
            Some(v) => JobId::Number(v),
            None => JobId::Text(n.to_string()),
        },
        Some(JsonValue::String(s)) if !s.is_empty() => JobId::Text(s.clone()),
        _ => JobId::synthetic(),
    }
}

/// Splits `"City - ST"` on the first hyphen.
pub fn parse_location(raw: &str) -> (Option<String>, Option<String>) {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    match raw.split_once('-') {
        Some((city, state)) => (non_empty(city), non_empty(state)),
        None => (non_empty(raw), None),
    }
}

pub fn clean_contract_type(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, '"' | '\'')).collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Drops a leading "Vaga para " regardless of case.
pub fn clean_title(raw: &str) -> String {
    let stripped = raw
        .get(..TITLE_PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(TITLE_PREFIX))
        .map(|_| &raw[TITLE_PREFIX.len()..])
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(str::trim_start)
        .unwrap_or(raw);
    if stripped.is_empty() {
        UNTITLED_JOB.to_string()
    } else {
        stripped.to_string()
    }
}

pub fn is_remote(text: &str) -> bool {
    let lower = text.to_lowercase();
    REMOTE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Page payload as returned by the resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum PagePayload {
    Records(Vec<JsonValue>),
    /// Neither `{ "data": [...] }` nor a bare array.
    Malformed,
}

impl PagePayload {
    pub fn parse(payload: JsonValue) -> Self {
        match payload {
            JsonValue::Array(items) => PagePayload::Records(items),
            JsonValue::Object(mut map) => match map.remove("data") {
                Some(JsonValue::Array(items)) => PagePayload::Records(items),
                _ => PagePayload::Malformed,
            },
            _ => PagePayload::Malformed,
        }
    }

    /// Malformed pages count as empty so pagination terminates.
    pub fn into_records(self, page: u32) -> Vec<JsonValue> {
        match self {
            PagePayload::Records(items) => items,
            PagePayload::Malformed => {
                warn!(page, "malformed page payload; treating as empty");
                Vec::new()
            }
        }
    }
}

/// Reads a captured page payload from disk, e.g. a saved API response.
pub fn load_captured_page(path: impl AsRef<Path>) -> Result<Vec<JsonValue>> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let payload: JsonValue =
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    match PagePayload::parse(payload) {
        PagePayload::Records(items) => Ok(items),
        PagePayload::Malformed => anyhow::bail!(
            "{} is neither a bare array nor a {{\"data\": [...]}} object",
            path.display()
        ),
    }
}
