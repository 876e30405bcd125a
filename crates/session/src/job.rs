// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Long-running server jobs: status refresh, cancellation, and polling.

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::request::Request;
use crate::session::Session;
use crate::version::{PlatformVersion, GETI_18_VERSION};

static STEP_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\(Step (\d+)\s*/\s*(\d+)\)").ok());

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Scheduled,
    Running,
    Paused,
    Finished,
    Error,
    Failed,
    Cancelled,
    Inactive,
    #[serde(other)]
    Unknown,
}

impl JobState {
    /// Whether the job will not change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error | Self::Failed | Self::Cancelled | Self::Inactive)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    #[serde(default)]
    pub message: String,
    /// Percentage complete; negative when the server cannot tell.
    #[serde(default)]
    pub progress: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    #[serde(default)]
    pub step_name: String,
    #[serde(default = "waiting")]
    pub state: String,
    #[serde(default)]
    pub progress: Option<f64>,
}

fn waiting() -> String {
    "waiting".to_owned()
}

/// A job running on the server, as returned by the jobs endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub steps: Option<Vec<JobStep>>,
    /// Workspace owning the job. Not part of the job document; set by the
    /// caller before the job is refreshed or cancelled.
    #[serde(skip)]
    pub workspace_id: Option<String>,
}

impl Job {
    pub fn in_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// Path of this job relative to the organization base URL.
    pub fn path(&self) -> Result<String> {
        let workspace_id = self.workspace_id.as_deref().ok_or_else(|| {
            SessionError::Configuration(format!("workspace id for job '{}' was never set", self.id))
        })?;
        Ok(format!("workspaces/{workspace_id}/jobs/{}", self.id))
    }

    pub fn state(&self) -> JobState {
        self.status.state
    }

    pub fn is_finished(&self) -> bool {
        self.status.state == JobState::Finished
    }

    pub fn is_running(&self) -> bool {
        self.status.state == JobState::Running
    }

    /// Refresh status and steps from the server.
    ///
    /// A 403 leaves the job unchanged.
    pub async fn update(&mut self, session: &mut Session) -> Result<()> {
        let path = self.path()?;
        let refreshed: Job = match session.send_json(Request::get(path)).await {
            Ok(job) => job,
            Err(e) if e.status_code() == Some(403) => {
                warn!(job = %self.name, "unable to update job status, server returned 403 Forbidden");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.status = refreshed.status;
        self.steps = refreshed.steps;
        Ok(())
    }

    /// Cancel and delete the job.
    ///
    /// A job the server no longer knows about becomes [`JobState::Inactive`].
    pub async fn cancel(&mut self, session: &mut Session) -> Result<()> {
        let path = self.path()?;
        match session.send(Request::delete(path).allow_text_response(true)).await {
            Ok(_) => {
                info!(job = %self.name, "job cancelled");
                self.status.state = JobState::Cancelled;
                Ok(())
            }
            Err(e) if e.status_code() == Some(404) => {
                info!(job = %self.name, "job is not active anymore, unable to cancel");
                self.status.state = JobState::Inactive;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Current step and total number of steps, 1-based.
    ///
    /// Uses the step list when the server reports one, else a `(Step n/m)`
    /// marker in the status message. Defaults to `(1, 1)`.
    pub fn step_information(&self) -> (usize, usize) {
        if let Some(ref steps) = self.steps {
            if !steps.is_empty() {
                let finished = steps.iter().filter(|s| s.state == "finished").count();
                return (finished + 1, steps.len());
            }
        }

        let Some(pattern) = STEP_PATTERN.as_ref() else { return (1, 1) };
        let mut matches = pattern.captures_iter(&self.status.message);
        match (matches.next(), matches.next()) {
            (Some(caps), None) => {
                let current = caps.get(1).and_then(|m| m.as_str().parse().ok());
                let total = caps.get(2).and_then(|m| m.as_str().parse().ok());
                match (current, total) {
                    (Some(current), Some(total)) => (current, total),
                    _ => (1, 1),
                }
            }
            _ => (1, 1),
        }
    }

    /// Description of the current step.
    ///
    /// Servers up to 1.8 embed it in the status message; newer ones name
    /// each step. Empty when it cannot be determined.
    pub fn current_step_message(&self, version: &PlatformVersion) -> String {
        if *version <= GETI_18_VERSION {
            let message = &self.status.message;
            return message.split("(Step").next().unwrap_or(message).trim().to_owned();
        }
        let (current, _) = self.step_information();
        self.steps
            .as_ref()
            .and_then(|steps| steps.get(current.checked_sub(1)?))
            .map(|step| step.step_name.clone())
            .unwrap_or_default()
    }
}

/// Poll `job` every `interval` until it reaches a terminal state.
///
/// Gives up after `timeout`, returning the last known job.
pub async fn monitor_job(
    session: &mut Session,
    mut job: Job,
    timeout: Duration,
    interval: Duration,
) -> Result<Job> {
    let started = Instant::now();
    loop {
        job.update(session).await?;
        let (step, total) = job.step_information();
        debug!(
            job = %job.name,
            state = ?job.state(),
            step,
            total,
            progress = job.status.progress,
            "job status"
        );
        if job.state().is_terminal() {
            info!(job = %job.name, state = ?job.state(), "job completed");
            return Ok(job);
        }
        if started.elapsed() >= timeout {
            warn!(job = %job.name, ?timeout, "monitoring timed out before the job completed");
            return Ok(job);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
