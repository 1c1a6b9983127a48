use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Longest job label accepted, in bytes.
pub const MAX_JOB_LABEL_BYTES: usize = 31;

/// A validated, bounded job label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobLabel(String);

impl JobLabel {
    pub fn new(label: &str) -> Result<Self, SessionError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(SessionError::EmptyJobLabel);
        }
        if label.len() > MAX_JOB_LABEL_BYTES {
            return Err(SessionError::JobLabelTooLong {
                len: label.len(),
                max: MAX_JOB_LABEL_BYTES,
            });
        }
        Ok(Self(label.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JobLabel {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<JobLabel> for String {
    fn from(label: JobLabel) -> Self {
        label.0
    }
}

impl std::fmt::Display for JobLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No job running
    #[default]
    Idle,
    /// A job is being timed
    Active,
}

/// Copy of the session handed to readers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub active: bool,
    pub job: Option<String>,
}

/// Idle/Active job tracking. Lives inside the shared store, so every
/// transition happens under the store lock.
///
/// Resetting rotation and extrema on start is the caller's job (see
/// `Monitor::start_session`); this type only holds the state and label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStateMachine {
    state: SessionState,
    job: Option<JobLabel>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn job(&self) -> Option<&JobLabel> {
        self.job.as_ref()
    }

    /// Idle or Active → Active with `job`. Starting over an active session
    /// replaces its label.
    pub fn start(&mut self, job: JobLabel) {
        self.job = Some(job);
        self.state = SessionState::Active;
    }

    /// Active → Idle. Stopping an idle session is a no-op.
    pub fn stop(&mut self) {
        self.job = None;
        self.state = SessionState::Idle;
    }

    /// Rotation timeout. Returns true if an active session was ended.
    pub fn timeout(&mut self) -> bool {
        if self.is_active() {
            self.stop();
            true
        } else {
            false
        }
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            active: self.is_active(),
            job: self.job.as_ref().map(|j| j.as_str().to_string()),
        }
    }
}
