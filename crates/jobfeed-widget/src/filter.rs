use std::collections::BTreeSet;

use jobfeed_core::CanonicalJobRecord;
use serde::{Deserialize, Serialize};

/// Location option that selects every remote job.
pub const REMOTE_LOCATION_LABEL: &str = "Trabalho Remoto";

/// Visitor-entered criteria. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub keyword: String,
    pub location: String,
    pub department: String,
    pub job_code: String,
}

impl JobFilter {
    /// Number of dropdown-style criteria in use; the keyword box is not counted.
    pub fn active_count(&self) -> usize {
        [&self.location, &self.department, &self.job_code]
            .iter()
            .filter(|v| !v.is_empty())
            .count()
    }

    pub fn matches(&self, job: &CanonicalJobRecord) -> bool {
        self.keyword_matches(job)
            && self.department_matches(job)
            && self.location_matches(job)
            && self.code_matches(job)
    }

    fn keyword_matches(&self, job: &CanonicalJobRecord) -> bool {
        if self.keyword.is_empty() {
            return true;
        }
        let needle = self.keyword.to_lowercase();
        job.title.to_lowercase().contains(&needle) || job.summary.to_lowercase().contains(&needle)
    }

    fn department_matches(&self, job: &CanonicalJobRecord) -> bool {
        self.department.is_empty() || job.department == self.department
    }

    fn location_matches(&self, job: &CanonicalJobRecord) -> bool {
        if self.location.is_empty() {
            return true;
        }
        if self.location == REMOTE_LOCATION_LABEL {
            return job.remote;
        }
        job.city
            .as_deref()
            .is_some_and(|city| self.location.contains(city))
    }

    fn code_matches(&self, job: &CanonicalJobRecord) -> bool {
        self.job_code.is_empty()
            || job
                .id
                .to_string()
                .to_lowercase()
                .contains(&self.job_code.to_lowercase())
    }
}

pub fn filter_jobs<'a>(jobs: &'a [CanonicalJobRecord], filter: &JobFilter) -> Vec<&'a CanonicalJobRecord> {
    jobs.iter().filter(|job| filter.matches(job)).collect()
}

/// Sorted, de-duplicated location choices derived from the current list.
pub fn location_options(jobs: &[CanonicalJobRecord]) -> Vec<String> {
    jobs.iter()
        .filter_map(|job| {
            if job.remote {
                Some(REMOTE_LOCATION_LABEL.to_string())
            } else {
                job.location_label()
            }
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn department_options(jobs: &[CanonicalJobRecord]) -> Vec<String> {
    jobs.iter()
        .map(|job| job.department.clone())
        .filter(|d| !d.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
