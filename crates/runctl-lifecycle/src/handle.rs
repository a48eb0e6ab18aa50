use crate::error::LifecycleError;
use chrono::{DateTime, Utc};
use runctl_core::{ProgramAddress, RunToken};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HandleBinding {
    /// Only the token is known; the service has not listed the run yet.
    Pending,
    Bound {
        run_id: String,
        bound_at: DateTime<Utc>,
    },
}

/// Caller-side identity of one managed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleHandle {
    address: ProgramAddress,
    token: Option<RunToken>,
    binding: HandleBinding,
}

impl LifecycleHandle {
    pub fn pending(address: ProgramAddress, token: RunToken) -> Self {
        Self {
            address,
            token: Some(token),
            binding: HandleBinding::Pending,
        }
    }

    /// Handle for a run known only by its service id, e.g. one started by
    /// an earlier process.
    pub fn for_run(address: ProgramAddress, run_id: impl Into<String>) -> Self {
        Self {
            address,
            token: None,
            binding: HandleBinding::Bound {
                run_id: run_id.into(),
                bound_at: Utc::now(),
            },
        }
    }

    pub fn address(&self) -> &ProgramAddress {
        &self.address
    }

    pub fn token(&self) -> Option<&RunToken> {
        self.token.as_ref()
    }

    pub fn binding(&self) -> &HandleBinding {
        &self.binding
    }

    pub fn run_id(&self) -> Option<&str> {
        match &self.binding {
            HandleBinding::Bound { run_id, .. } => Some(run_id),
            HandleBinding::Pending => None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.run_id().is_some()
    }

    /// Moves the handle onto the service run id. Rebinding to the same id
    /// is a no-op; a different id is refused.
    pub fn rebind(&mut self, run_id: &str) -> Result<(), LifecycleError> {
        if let HandleBinding::Bound { run_id: bound, .. } = &self.binding {
            if bound == run_id {
                return Ok(());
            }
            return Err(LifecycleError::Binding {
                bound: bound.clone(),
                requested: run_id.to_string(),
            });
        }
        let bound_at = Utc::now();
        info!(
            program = %self.address,
            token = self.token.as_ref().map(RunToken::as_str).unwrap_or(""),
            run_id,
            bound_at = %bound_at.to_rfc3339(),
            "handle bound to service run id"
        );
        self.binding = HandleBinding::Bound {
            run_id: run_id.to_string(),
            bound_at,
        };
        Ok(())
    }

    /// `run <id>` once bound, `token <token>` before.
    pub fn describe(&self) -> String {
        match (&self.binding, &self.token) {
            (HandleBinding::Bound { run_id, .. }, _) => format!("run {}", run_id),
            (HandleBinding::Pending, Some(token)) => format!("token {}", token),
            (HandleBinding::Pending, None) => "unidentified run".to_string(),
        }
    }
}
