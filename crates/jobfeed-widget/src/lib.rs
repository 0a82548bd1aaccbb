//! Presentation-side state for the embedded job board.
//!
//! [`JobBoard`] is a reducer: every [`Action`] updates the state and returns the
//! [`Effect`]s the host runtime must perform (start a fetch, post to the parent frame).

pub mod filter;
pub mod host;

use std::sync::Arc;

use jobfeed_core::{CanonicalJobRecord, ErrorKind, JobId};
use serde::Serialize;
use tracing::{debug, warn};

pub use filter::{department_options, filter_jobs, location_options, JobFilter, REMOTE_LOCATION_LABEL};
pub use host::{HeightReporter, HostMessage, HEIGHT_DEBOUNCE, HEIGHT_JITTER_PX};

pub const CRATE_NAME: &str = "jobfeed-widget";

pub const ITEMS_PER_PAGE: usize = 9;
pub const GENERIC_ERROR_MESSAGE: &str = "Não foi possível carregar as vagas. Tente novamente.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadFailure {
    /// What the visitor sees.
    pub message: &'static str,
    pub kind: ErrorKind,
    pub diagnostic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadStatus {
    Idle,
    Loading,
    Ready,
    Failed(LoadFailure),
}

#[derive(Debug, Clone)]
pub enum Action {
    Refresh,
    FetchSucceeded {
        cycle: u64,
        jobs: Vec<CanonicalJobRecord>,
    },
    FetchFailed {
        cycle: u64,
        kind: ErrorKind,
        diagnostic: String,
    },
    SetFilters(JobFilter),
    LoadMore,
    ShowDetails(JobId),
    CloseDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch { cycle: u64 },
    Post(HostMessage),
}

#[derive(Debug, Clone)]
pub struct JobBoard {
    jobs: Arc<[CanonicalJobRecord]>,
    status: LoadStatus,
    filter: JobFilter,
    visible_count: usize,
    selected: Option<JobId>,
    next_cycle: u64,
}

impl Default for JobBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl JobBoard {
    pub fn new() -> Self {
        Self {
            jobs: Arc::from(Vec::new()),
            status: LoadStatus::Idle,
            filter: JobFilter::default(),
            visible_count: ITEMS_PER_PAGE,
            selected: None,
            next_cycle: 1,
        }
    }

    pub fn dispatch(&mut self, action: Action) -> Vec<Effect> {
        match action {
            Action::Refresh => {
                let cycle = self.next_cycle;
                self.next_cycle += 1;
                self.status = LoadStatus::Loading;
                vec![Effect::Fetch { cycle }]
            }
            Action::FetchSucceeded { cycle, jobs } => {
                // Whichever cycle resolves last owns the list; earlier cycles are not cancelled.
                debug!(cycle, jobs = jobs.len(), "fetch cycle resolved");
                self.jobs = Arc::from(jobs);
                self.status = LoadStatus::Ready;
                if let Some(id) = &self.selected {
                    if !self.jobs.iter().any(|job| &job.id == id) {
                        self.selected = None;
                    }
                }
                Vec::new()
            }
            Action::FetchFailed {
                cycle,
                kind,
                diagnostic,
            } => {
                warn!(cycle, ?kind, %diagnostic, "fetch cycle failed");
                self.status = LoadStatus::Failed(LoadFailure {
                    message: GENERIC_ERROR_MESSAGE,
                    kind,
                    diagnostic,
                });
                Vec::new()
            }
            Action::SetFilters(filter) => {
                self.filter = filter;
                self.visible_count = ITEMS_PER_PAGE;
                Vec::new()
            }
            Action::LoadMore => {
                if self.has_more() {
                    self.visible_count += ITEMS_PER_PAGE;
                }
                Vec::new()
            }
            Action::ShowDetails(id) => {
                if self.jobs.iter().any(|job| job.id == id) {
                    self.selected = Some(id);
                    vec![Effect::Post(HostMessage::ScrollToTop)]
                } else {
                    debug!(%id, "details requested for unknown job");
                    Vec::new()
                }
            }
            Action::CloseDetails => {
                self.selected = None;
                Vec::new()
            }
        }
    }

    /// Shared handle to the current list; never observed half-updated.
    pub fn jobs(&self) -> Arc<[CanonicalJobRecord]> {
        Arc::clone(&self.jobs)
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn filter(&self) -> &JobFilter {
        &self.filter
    }

    pub fn filtered(&self) -> Vec<&CanonicalJobRecord> {
        filter_jobs(&self.jobs, &self.filter)
    }

    pub fn visible(&self) -> Vec<&CanonicalJobRecord> {
        let mut jobs = self.filtered();
        jobs.truncate(self.visible_count);
        jobs
    }

    pub fn has_more(&self) -> bool {
        self.visible_count < self.filtered().len()
    }

    pub fn selected_job(&self) -> Option<&CanonicalJobRecord> {
        let id = self.selected.as_ref()?;
        self.jobs.iter().find(|job| &job.id == id)
    }

    pub fn location_options(&self) -> Vec<String> {
        location_options(&self.jobs)
    }

    pub fn department_options(&self) -> Vec<String> {
        department_options(&self.jobs)
    }
}
