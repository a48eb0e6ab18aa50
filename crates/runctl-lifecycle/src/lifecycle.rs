//! The run lifecycle: start a tracked run and wait for it to reach RUNNING,
//! observe it, stop it and wait for a terminal state.

use crate::error::LifecycleError;
use crate::handle::LifecycleHandle;
use crate::policy::{decide_presence, Correlation, Presence};
use crate::registry::{LookupError, RunRegistry};
use crate::settings::LifecycleSettings;
use runctl_core::{
    Clock, Deadline, ProgramAddress, RunCorrelator, RunRecord, RunStatus, RunToken,
    RuntimeArgsCorrelator, StatusClass, StatusTables,
};
use runctl_transport::{ManagementApi, TransportError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const NOT_YET_VISIBLE: &str = "not yet visible";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub address: ProgramAddress,
    pub runtime_args: BTreeMap<String, String>,
    pub allow_multiple_runs: bool,
}

impl RunRequest {
    pub fn new(address: ProgramAddress) -> Self {
        Self {
            address,
            runtime_args: BTreeMap::new(),
            allow_multiple_runs: false,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.runtime_args.insert(key.into(), value.into());
        self
    }

    pub fn allow_multiple_runs(mut self, allow: bool) -> Self {
        self.allow_multiple_runs = allow;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The run reached a terminal state.
    Ended {
        run_id: String,
        final_status: RunStatus,
        stop_commands: usize,
    },
    /// The service no longer knows the run.
    Vanished { run_id: String, stop_commands: usize },
    /// The token never showed up in the run list, so there is nothing to stop.
    NeverStarted,
}

impl DeleteOutcome {
    pub fn stop_commands(&self) -> usize {
        match self {
            DeleteOutcome::Ended { stop_commands, .. }
            | DeleteOutcome::Vanished { stop_commands, .. } => *stop_commands,
            DeleteOutcome::NeverStarted => 0,
        }
    }
}

/// Errors that no amount of polling will fix.
pub(crate) fn is_permanent(err: &TransportError) -> bool {
    matches!(
        err,
        TransportError::InvalidResponse { .. } | TransportError::InvalidRequest { .. }
    )
}

fn status_text(status: Option<&RunStatus>) -> String {
    status
        .map(|status| status.to_string())
        .unwrap_or_else(|| NOT_YET_VISIBLE.to_string())
}

pub struct RunLifecycle {
    pub(crate) api: Arc<dyn ManagementApi>,
    pub(crate) registry: RunRegistry,
    pub(crate) tables: StatusTables,
    pub(crate) settings: LifecycleSettings,
    pub(crate) clock: Arc<dyn Clock>,
}

impl RunLifecycle {
    pub fn new(api: Arc<dyn ManagementApi>, clock: Arc<dyn Clock>) -> Self {
        let registry = RunRegistry::new(api.clone(), Arc::new(RuntimeArgsCorrelator::default()));
        Self {
            api,
            registry,
            tables: StatusTables::default(),
            settings: LifecycleSettings::default(),
            clock,
        }
    }

    pub fn with_settings(mut self, settings: LifecycleSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tables(mut self, tables: StatusTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_correlator(mut self, correlator: Arc<dyn RunCorrelator>) -> Self {
        self.registry = RunRegistry::new(self.api.clone(), correlator);
        self
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Starts a tracked run and blocks until the service reports it RUNNING.
    pub fn create(&self, request: &RunRequest) -> Result<LifecycleHandle, LifecycleError> {
        let address = &request.address;
        let clock = self.clock.as_ref();
        let deadline = Deadline::after(clock, self.settings.create_timeout);

        if !request.allow_multiple_runs {
            let aggregate = self
                .api
                .program_status(address, Some(&deadline))
                .map_err(|err| {
                    LifecycleError::transport(format!("reading status of {}", address), err)
                })?;
            if self.tables.is_running(&aggregate.status) {
                return Err(LifecycleError::Ambiguity {
                    address: address.to_string(),
                    status: aggregate.status.to_string(),
                });
            }
        }

        let token = RunToken::generate();
        let mut args = request.runtime_args.clone();
        self.registry.correlator().embed(&mut args, &token);
        self.api
            .start_program(address, &args, Some(&deadline))
            .map_err(|err| LifecycleError::transport(format!("starting {}", address), err))?;
        info!(program = %address, token = %token, "start submitted, waiting for the run to appear");

        let mut handle = LifecycleHandle::pending(address.clone(), token.clone());
        let mut last_status: Option<RunStatus> = None;
        while deadline.sleep(clock, self.settings.poll_interval) {
            // Once bound, follow the run by id so duplicated listings cannot
            // swap it for another.
            let found = match handle.run_id() {
                Some(run_id) => self.registry.find_by_id(address, run_id, Some(&deadline)),
                None => self.registry.find_by_token(address, &token, Some(&deadline)),
            };
            let run = match found {
                Ok(run) => run,
                Err(LookupError::NotFound) => {
                    debug!(program = %address, handle = %handle.describe(), "run not visible yet");
                    continue;
                }
                Err(LookupError::Transport(err)) if is_permanent(&err) => {
                    return Err(LifecycleError::transport(
                        format!("looking up {} of {}", handle.describe(), address),
                        err,
                    ));
                }
                Err(LookupError::Transport(err)) => {
                    warn!(program = %address, token = %token, error = %err, "run lookup failed, polling again");
                    continue;
                }
            };
            handle.rebind(&run.run_id)?;
            match self.tables.classify(&run.status) {
                StatusClass::Running => {
                    info!(program = %address, run_id = %run.run_id, elapsed_ms = deadline.elapsed(clock).as_millis() as u64, "run is RUNNING");
                    return Ok(handle);
                }
                StatusClass::Initializing => {
                    debug!(program = %address, run_id = %run.run_id, status = %run.status, "run still starting");
                    last_status = Some(run.status);
                }
                StatusClass::Terminal { successful: false } => {
                    return Err(LifecycleError::State {
                        address: address.to_string(),
                        run: run.run_id,
                        status: run.status.to_string(),
                        detail: "run failed before reaching RUNNING".to_string(),
                    });
                }
                StatusClass::Terminal { successful: true }
                | StatusClass::Stopping
                | StatusClass::Unrecognized => {
                    return Err(LifecycleError::State {
                        address: address.to_string(),
                        run: run.run_id,
                        status: run.status.to_string(),
                        detail: "run left the starting states without reaching RUNNING"
                            .to_string(),
                    });
                }
            }
        }

        if !handle.is_bound() {
            return Err(LifecycleError::Correlation {
                address: address.to_string(),
                token: token.to_string(),
                waited: deadline.elapsed(clock),
            });
        }
        Err(LifecycleError::Timeout {
            address: address.to_string(),
            run: handle.describe(),
            waited: deadline.elapsed(clock),
            waiting_for: RunStatus::Running.to_string(),
            last_status: status_text(last_status.as_ref()),
        })
    }

    /// Current record of the run, or `None` once the service has forgotten
    /// it (or before it was ever listed).
    pub fn read(&self, handle: &mut LifecycleHandle) -> Result<Option<RunRecord>, LifecycleError> {
        match self.locate(handle, None)? {
            Some(run) => {
                handle.rebind(&run.run_id)?;
                Ok(Some(run))
            }
            None => Ok(None),
        }
    }

    /// Stops the run and blocks until it is terminal or gone.
    pub fn delete(&self, handle: &mut LifecycleHandle) -> Result<DeleteOutcome, LifecycleError> {
        let address = handle.address().clone();
        let clock = self.clock.as_ref();
        let deadline = Deadline::after(clock, self.settings.delete_timeout);

        if !handle.is_bound() {
            match self.resolve_token(handle, &deadline)? {
                Some(run) => handle.rebind(&run.run_id)?,
                None => {
                    info!(program = %address, handle = %handle.describe(), "run was never listed, nothing to stop");
                    return Ok(DeleteOutcome::NeverStarted);
                }
            }
        }
        let Some(run_id) = handle.run_id().map(str::to_string) else {
            return Ok(DeleteOutcome::NeverStarted);
        };

        let mut stop_commands = 0usize;
        let mut stop_accepted = false;
        let mut last_status: Option<RunStatus> = None;
        loop {
            match self.registry.find_by_id(&address, &run_id, Some(&deadline)) {
                Ok(run) => {
                    match self.tables.classify(&run.status) {
                        StatusClass::Terminal { .. } => {
                            info!(program = %address, run_id = %run_id, status = %run.status, stop_commands, "run ended");
                            return Ok(DeleteOutcome::Ended {
                                run_id,
                                final_status: run.status,
                                stop_commands,
                            });
                        }
                        StatusClass::Running | StatusClass::Initializing if !stop_accepted => {
                            stop_commands += 1;
                            match self.api.stop_run(&address, &run_id, Some(&deadline)) {
                                Ok(()) => {
                                    info!(program = %address, run_id = %run_id, status = %run.status, "stop accepted");
                                    stop_accepted = true;
                                }
                                Err(err) if err.is_not_found() => {
                                    info!(program = %address, run_id = %run_id, "run disappeared while stopping");
                                    return Ok(DeleteOutcome::Vanished {
                                        run_id,
                                        stop_commands,
                                    });
                                }
                                Err(err) if stop_rejected(&err) => {
                                    return Err(LifecycleError::State {
                                        address: address.to_string(),
                                        run: run_id,
                                        status: run.status.to_string(),
                                        detail: format!("service refused to stop the run: {}", err),
                                    });
                                }
                                Err(err) => {
                                    warn!(program = %address, run_id = %run_id, error = %err, "stop not accepted, will reissue");
                                }
                            }
                        }
                        _ => {
                            debug!(program = %address, run_id = %run_id, status = %run.status, "waiting for run to end");
                        }
                    }
                    last_status = Some(run.status);
                }
                Err(LookupError::NotFound) => {
                    info!(program = %address, run_id = %run_id, "run no longer listed");
                    return Ok(DeleteOutcome::Vanished {
                        run_id,
                        stop_commands,
                    });
                }
                Err(LookupError::Transport(err)) if is_permanent(&err) => {
                    return Err(LifecycleError::transport(
                        format!("reading run {} of {}", run_id, address),
                        err,
                    ));
                }
                Err(LookupError::Transport(err)) => {
                    warn!(program = %address, run_id = %run_id, error = %err, "run lookup failed, polling again");
                }
            }
            if !deadline.sleep(clock, self.settings.poll_interval) {
                break;
            }
        }

        Err(LifecycleError::Timeout {
            address: address.to_string(),
            run: format!("run {}", run_id),
            waited: deadline.elapsed(clock),
            waiting_for: "a terminal state".to_string(),
            last_status: status_text(last_status.as_ref()),
        })
    }

    /// Whether the tracked run counts as present. Fails with
    /// [`LifecycleError::Ambiguity`] when some other run holds the program
    /// and `allow_multiple_runs` is false.
    pub fn exists(
        &self,
        handle: &mut LifecycleHandle,
        allow_multiple_runs: bool,
    ) -> Result<bool, LifecycleError> {
        let address = handle.address().clone();
        let aggregate = self
            .api
            .program_status(&address, None)
            .map_err(|err| LifecycleError::transport(format!("reading status of {}", address), err))?
            .status;
        let correlation = if self.tables.is_running(&aggregate) {
            match self.locate(handle, None)? {
                Some(run) => {
                    handle.rebind(&run.run_id)?;
                    Correlation::of(&run.status, &self.tables)
                }
                None => Correlation::NotFound,
            }
        } else {
            Correlation::NotFound
        };
        debug!(program = %address, aggregate = %aggregate, correlation = ?correlation, allow_multiple_runs, "deciding presence");
        match decide_presence(&aggregate, correlation, allow_multiple_runs, &self.tables) {
            Presence::Exists => Ok(true),
            Presence::NotExists => Ok(false),
            Presence::Blocked => Err(LifecycleError::Ambiguity {
                address: address.to_string(),
                status: aggregate.to_string(),
            }),
        }
    }

    /// Finds the handle's run by id when bound, by token otherwise.
    fn locate(
        &self,
        handle: &LifecycleHandle,
        deadline: Option<&Deadline>,
    ) -> Result<Option<RunRecord>, LifecycleError> {
        let address = handle.address();
        let found = match (handle.run_id(), handle.token()) {
            (Some(run_id), _) => self.registry.find_by_id(address, run_id, deadline),
            (None, Some(token)) => self.registry.find_by_token(address, token, deadline),
            // Handles are built either bound or carrying a token.
            (None, None) => return Ok(None),
        };
        match found {
            Ok(run) => Ok(Some(run)),
            Err(LookupError::NotFound) => Ok(None),
            Err(LookupError::Transport(err)) => Err(LifecycleError::transport(
                format!("looking up {} of {}", handle.describe(), address),
                err,
            )),
        }
    }

    /// Looks up a pending handle's token, retrying transient list failures
    /// until `deadline`. `None` means no listed run carries the token.
    fn resolve_token(
        &self,
        handle: &LifecycleHandle,
        deadline: &Deadline,
    ) -> Result<Option<RunRecord>, LifecycleError> {
        let address = handle.address();
        let Some(token) = handle.token() else {
            return Ok(None);
        };
        let clock = self.clock.as_ref();
        loop {
            let err = match self.registry.find_by_token(address, token, Some(deadline)) {
                Ok(run) => return Ok(Some(run)),
                Err(LookupError::NotFound) => return Ok(None),
                Err(LookupError::Transport(err)) => err,
            };
            if !is_permanent(&err) {
                warn!(program = %address, token = %token, error = %err, "run lookup failed, polling again");
                if deadline.sleep(clock, self.settings.poll_interval) {
                    continue;
                }
            }
            return Err(LifecycleError::transport(
                format!("looking up token {} of {}", token, address),
                err,
            ));
        }
    }
}

/// A 4xx answer to a stop means the service will not stop this run.
fn stop_rejected(err: &TransportError) -> bool {
    err.status_code()
        .is_some_and(|code| (400..500).contains(&code))
}
