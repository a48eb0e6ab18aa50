//! Decides whether a tracked run counts as present when the service only
//! reports an aggregate status for the whole program.

use runctl_core::{RunStatus, StatusClass, StatusTables};

/// What correlating the tracked run turned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Correlation {
    Running,
    Initializing,
    /// The run was found but is stopping, terminal or in an unknown state.
    Ended,
    NotFound,
}

impl Correlation {
    pub fn of(status: &RunStatus, tables: &StatusTables) -> Self {
        match tables.classify(status) {
            StatusClass::Running => Correlation::Running,
            StatusClass::Initializing => Correlation::Initializing,
            StatusClass::Stopping | StatusClass::Terminal { .. } | StatusClass::Unrecognized => {
                Correlation::Ended
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Exists,
    NotExists,
    /// Some other run holds the program and concurrent runs are disallowed.
    Blocked,
}

pub fn decide_presence(
    aggregate: &RunStatus,
    correlation: Correlation,
    allow_multiple_runs: bool,
    tables: &StatusTables,
) -> Presence {
    if !tables.is_running(aggregate) {
        return Presence::NotExists;
    }
    match correlation {
        Correlation::Running | Correlation::Initializing => Presence::Exists,
        Correlation::Ended | Correlation::NotFound if allow_multiple_runs => Presence::NotExists,
        Correlation::Ended | Correlation::NotFound => Presence::Blocked,
    }
}
