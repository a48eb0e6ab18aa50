use runctl_core::{Deadline, ProgramAddress, RunCorrelator, RunRecord, RunToken};
use runctl_transport::{ManagementApi, TransportError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("run not found")]
    NotFound,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Read-only view over the runs of a program.
#[derive(Clone)]
pub struct RunRegistry {
    api: Arc<dyn ManagementApi>,
    correlator: Arc<dyn RunCorrelator>,
}

impl RunRegistry {
    pub fn new(api: Arc<dyn ManagementApi>, correlator: Arc<dyn RunCorrelator>) -> Self {
        Self { api, correlator }
    }

    pub fn correlator(&self) -> &dyn RunCorrelator {
        self.correlator.as_ref()
    }

    pub fn list_runs(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<Vec<RunRecord>, LookupError> {
        Ok(self.api.list_runs(address, deadline)?)
    }

    /// Returns the first listed run carrying `token`. Runs whose arguments
    /// cannot be decoded are skipped.
    pub fn find_by_token(
        &self,
        address: &ProgramAddress,
        token: &RunToken,
        deadline: Option<&Deadline>,
    ) -> Result<RunRecord, LookupError> {
        let runs = self.list_runs(address, deadline)?;
        let total = runs.len();
        let found = runs
            .into_iter()
            .find(|run| match self.correlator.extract(&run.properties) {
                Ok(found) => found == *token,
                Err(err) => {
                    debug!(program = %address, run_id = %run.run_id, error = %err, "skipping run without a readable token");
                    false
                }
            });
        found.ok_or_else(|| {
            debug!(program = %address, token = %token, runs = total, "token not among listed runs");
            LookupError::NotFound
        })
    }

    pub fn find_by_id(
        &self,
        address: &ProgramAddress,
        run_id: &str,
        deadline: Option<&Deadline>,
    ) -> Result<RunRecord, LookupError> {
        match self.api.get_run(address, run_id, deadline) {
            Ok(run) => Ok(run),
            Err(err) if err.is_not_found() => Err(LookupError::NotFound),
            Err(err) => Err(err.into()),
        }
    }
}
