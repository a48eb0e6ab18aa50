use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Status reported by the service for a program or one of its runs.
///
/// The set is open: anything the service invents later lands in `Other`
/// with its raw text preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Pending,
    Starting,
    Provisioning,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Completed,
    Failed,
    Killed,
    Rejected,
    Other(String),
}

impl RunStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => RunStatus::Pending,
            "STARTING" => RunStatus::Starting,
            "PROVISIONING" => RunStatus::Provisioning,
            "INITIALIZING" => RunStatus::Initializing,
            "RUNNING" => RunStatus::Running,
            "STOPPING" => RunStatus::Stopping,
            "STOPPED" => RunStatus::Stopped,
            "COMPLETED" => RunStatus::Completed,
            "FAILED" => RunStatus::Failed,
            "KILLED" => RunStatus::Killed,
            "REJECTED" => RunStatus::Rejected,
            _ => RunStatus::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Starting => "STARTING",
            RunStatus::Provisioning => "PROVISIONING",
            RunStatus::Initializing => "INITIALIZING",
            RunStatus::Running => "RUNNING",
            RunStatus::Stopping => "STOPPING",
            RunStatus::Stopped => "STOPPED",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
            RunStatus::Rejected => "REJECTED",
            RunStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for RunStatus {
    fn from(raw: String) -> Self {
        RunStatus::parse(&raw)
    }
}

impl From<&str> for RunStatus {
    fn from(raw: &str) -> Self {
        RunStatus::parse(raw)
    }
}

impl From<RunStatus> for String {
    fn from(status: RunStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Initializing,
    Running,
    Stopping,
    Terminal { successful: bool },
    Unrecognized,
}

/// Membership tables used to classify statuses.
///
/// Built once and handed to whatever drives a poll loop; there is no
/// process-wide copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTables {
    initializing: BTreeSet<RunStatus>,
    running: BTreeSet<RunStatus>,
    stopping: BTreeSet<RunStatus>,
    terminal: BTreeSet<RunStatus>,
    unsuccessful: BTreeSet<RunStatus>,
}

impl Default for StatusTables {
    fn default() -> Self {
        Self {
            initializing: BTreeSet::from([
                RunStatus::Pending,
                RunStatus::Starting,
                RunStatus::Provisioning,
                RunStatus::Initializing,
            ]),
            running: BTreeSet::from([RunStatus::Running]),
            stopping: BTreeSet::from([RunStatus::Stopping]),
            terminal: BTreeSet::from([
                RunStatus::Stopped,
                RunStatus::Completed,
                RunStatus::Failed,
                RunStatus::Killed,
                RunStatus::Rejected,
            ]),
            unsuccessful: BTreeSet::from([
                RunStatus::Failed,
                RunStatus::Killed,
                RunStatus::Rejected,
            ]),
        }
    }
}

impl StatusTables {
    /// Treat additional (usually service-specific) statuses as initializing.
    pub fn with_initializing(mut self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.initializing.extend(statuses);
        self
    }

    /// Treat additional statuses as terminal; `successful = false` also tags
    /// them unsuccessful.
    pub fn with_terminal(
        mut self,
        statuses: impl IntoIterator<Item = RunStatus>,
        successful: bool,
    ) -> Self {
        for status in statuses {
            if !successful {
                self.unsuccessful.insert(status.clone());
            }
            self.terminal.insert(status);
        }
        self
    }

    pub fn classify(&self, status: &RunStatus) -> StatusClass {
        if self.running.contains(status) {
            return StatusClass::Running;
        }
        if self.terminal.contains(status) {
            return StatusClass::Terminal {
                successful: !self.unsuccessful.contains(status),
            };
        }
        if self.stopping.contains(status) {
            return StatusClass::Stopping;
        }
        if self.initializing.contains(status) {
            return StatusClass::Initializing;
        }
        StatusClass::Unrecognized
    }

    pub fn is_running(&self, status: &RunStatus) -> bool {
        self.classify(status) == StatusClass::Running
    }

    pub fn is_terminal(&self, status: &RunStatus) -> bool {
        matches!(self.classify(status), StatusClass::Terminal { .. })
    }
}
