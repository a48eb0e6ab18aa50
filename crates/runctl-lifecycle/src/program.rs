//! Untracked start/stop of a whole program, judged on its aggregate status
//! alone.

use crate::error::LifecycleError;
use crate::lifecycle::{is_permanent, RunLifecycle};
use runctl_core::{Deadline, ProgramAddress, RunStatus, StatusClass};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

impl RunLifecycle {
    /// Starts `address` without a run token and waits for the program to
    /// report RUNNING.
    pub fn start_program(&self, address: &ProgramAddress) -> Result<RunStatus, LifecycleError> {
        let clock = self.clock.as_ref();
        let deadline = Deadline::after(clock, self.settings.create_timeout);
        self.api
            .start_program(address, &BTreeMap::new(), Some(&deadline))
            .map_err(|err| LifecycleError::transport(format!("starting {}", address), err))?;
        info!(program = %address, "program start submitted");

        let mut last_status: Option<RunStatus> = None;
        while deadline.sleep(clock, self.settings.poll_interval) {
            let status = match self.api.program_status(address, Some(&deadline)) {
                Ok(program) => program.status,
                Err(err) if is_permanent(&err) => {
                    return Err(LifecycleError::transport(
                        format!("reading status of {}", address),
                        err,
                    ));
                }
                Err(err) => {
                    warn!(program = %address, error = %err, "status check failed, polling again");
                    continue;
                }
            };
            match self.tables.classify(&status) {
                StatusClass::Running => {
                    info!(program = %address, "program is RUNNING");
                    return Ok(status);
                }
                StatusClass::Terminal { successful: false } => {
                    return Err(LifecycleError::State {
                        address: address.to_string(),
                        run: "program".to_string(),
                        status: status.to_string(),
                        detail: "program failed to start".to_string(),
                    });
                }
                // STOPPED is what a freshly redeployed program reports until
                // the start is picked up.
                _ => {
                    debug!(program = %address, status = %status, "program not running yet");
                    last_status = Some(status);
                }
            }
        }

        Err(LifecycleError::Timeout {
            address: address.to_string(),
            run: "program".to_string(),
            waited: deadline.elapsed(clock),
            waiting_for: RunStatus::Running.to_string(),
            last_status: last_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Stops `address` and waits until it reports a terminal status.
    pub fn stop_program(&self, address: &ProgramAddress) -> Result<RunStatus, LifecycleError> {
        let clock = self.clock.as_ref();
        let deadline = Deadline::after(clock, self.settings.delete_timeout);
        let mut stop_sent = false;
        let mut last_status: Option<RunStatus> = None;
        loop {
            match self.api.program_status(address, Some(&deadline)) {
                Ok(program) => {
                    let status = program.status;
                    match self.tables.classify(&status) {
                        StatusClass::Terminal { .. } => {
                            info!(program = %address, status = %status, "program stopped");
                            return Ok(status);
                        }
                        StatusClass::Running if !stop_sent => {
                            self.api
                                .stop_program(address, Some(&deadline))
                                .map_err(|err| {
                                    LifecycleError::transport(format!("stopping {}", address), err)
                                })?;
                            info!(program = %address, "program stop submitted");
                            stop_sent = true;
                        }
                        StatusClass::Running | StatusClass::Stopping => {
                            debug!(program = %address, status = %status, "waiting for program to stop");
                        }
                        StatusClass::Initializing | StatusClass::Unrecognized => {
                            return Err(LifecycleError::State {
                                address: address.to_string(),
                                run: "program".to_string(),
                                status: status.to_string(),
                                detail: format!("cannot stop program in state {}", status),
                            });
                        }
                    }
                    last_status = Some(status);
                }
                Err(err) if is_permanent(&err) => {
                    return Err(LifecycleError::transport(
                        format!("reading status of {}", address),
                        err,
                    ));
                }
                Err(err) => {
                    warn!(program = %address, error = %err, "status check failed, polling again");
                }
            }
            if !deadline.sleep(clock, self.settings.poll_interval) {
                break;
            }
        }

        Err(LifecycleError::Timeout {
            address: address.to_string(),
            run: "program".to_string(),
            waited: deadline.elapsed(clock),
            waiting_for: "a terminal state".to_string(),
            last_status: last_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LifecycleError;
    use crate::lifecycle::RunLifecycle;
    use crate::settings::LifecycleSettings;
    use crate::testing::{address, rejected, server_error, FakeApi};
    use runctl_core::{ManualClock, RunStatus};
    use std::sync::Arc;
    use std::time::Duration;

    fn lifecycle(api: FakeApi) -> (RunLifecycle, Arc<FakeApi>, Arc<ManualClock>) {
        let api = Arc::new(api);
        let clock = Arc::new(ManualClock::new());
        let lifecycle = RunLifecycle::new(api.clone(), clock.clone()).with_settings(
            LifecycleSettings {
                create_timeout: Duration::from_secs(60),
                delete_timeout: Duration::from_secs(60),
                poll_interval: Duration::from_secs(10),
            },
        );
        (lifecycle, api, clock)
    }

    #[test]
    fn start_program_waits_through_redeploy_and_provisioning() {
        let (lifecycle, api, clock) = lifecycle(FakeApi::new().with_program_statuses(vec![
            Ok(RunStatus::Stopped),
            Err(server_error(502)),
            Ok(RunStatus::Provisioning),
            Ok(RunStatus::Running),
        ]));
        let status = lifecycle.start_program(&address()).expect("running");
        assert_eq!(status, RunStatus::Running);
        assert_eq!(api.started(), vec![Default::default()]);
        assert_eq!(clock.elapsed(), Duration::from_secs(40));
    }

    #[test]
    fn start_program_reports_failure() {
        let (lifecycle, _api, _clock) =
            lifecycle(FakeApi::new().with_program_statuses(vec![Ok(RunStatus::Failed)]));
        let err = lifecycle.start_program(&address()).expect_err("failed");
        assert!(matches!(err, LifecycleError::State { ref status, .. } if status == "FAILED"));
    }

    #[test]
    fn start_program_times_out() {
        let (lifecycle, _api, _clock) =
            lifecycle(FakeApi::new().with_program_statuses(vec![Ok(RunStatus::Starting)]));
        let err = lifecycle.start_program(&address()).expect_err("stuck");
        assert!(matches!(err, LifecycleError::Timeout { ref last_status, .. } if last_status == "STARTING"));
    }

    #[test]
    fn stop_program_stops_once_and_waits() {
        let (lifecycle, api, _clock) = lifecycle(FakeApi::new().with_program_statuses(vec![
            Ok(RunStatus::Running),
            Ok(RunStatus::Running),
            Ok(RunStatus::Stopping),
            Ok(RunStatus::Stopped),
        ]));
        assert_eq!(
            lifecycle.stop_program(&address()).expect("stopped"),
            RunStatus::Stopped
        );
        assert_eq!(api.program_stops(), 1);
    }

    #[test]
    fn stop_program_on_stopped_program_is_a_no_op() {
        let (lifecycle, api, clock) = lifecycle(FakeApi::new());
        lifecycle.stop_program(&address()).expect("already stopped");
        assert_eq!(api.program_stops(), 0);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn stop_program_refuses_starting_program() {
        let (lifecycle, api, _clock) =
            lifecycle(FakeApi::new().with_program_statuses(vec![Ok(RunStatus::Provisioning)]));
        let err = lifecycle.stop_program(&address()).expect_err("cannot stop");
        assert!(err.to_string().contains("cannot stop program in state PROVISIONING"));
        assert_eq!(api.program_stops(), 0);
    }

    #[test]
    fn stop_program_surfaces_rejected_stop() {
        let (lifecycle, _api, _clock) = lifecycle(
            FakeApi::new()
                .with_program_statuses(vec![Ok(RunStatus::Running)])
                .with_stop_results(vec![Err(rejected(409, "busy"))]),
        );
        let err = lifecycle.stop_program(&address()).expect_err("rejected");
        assert_eq!(err.status_code(), Some(409));
    }
}
