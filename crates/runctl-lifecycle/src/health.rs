use runctl_core::Clock;
use runctl_transport::{ManagementApi, TransportError};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const HEALTHY: &str = "OK";
const HEALTH_ATTEMPTS_DEFAULT: u32 = 10;
const HEALTH_INTERVAL_SECS_DEFAULT: u64 = 10;

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("instance reported no system services")]
    NoServices,
    #[error("system services still unhealthy after {attempts} attempts: {}", .services.join(", "))]
    Unhealthy { attempts: u32, services: Vec<String> },
    #[error("reading system service status: {0}")]
    Transport(#[source] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheck {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            attempts: HEALTH_ATTEMPTS_DEFAULT,
            interval: Duration::from_secs(HEALTH_INTERVAL_SECS_DEFAULT),
        }
    }
}

/// Polls the system services until every one of them reports `OK`.
pub fn wait_for_healthy(
    api: &dyn ManagementApi,
    clock: &dyn Clock,
    check: &HealthCheck,
) -> Result<(), HealthError> {
    let attempts = check.attempts.max(1);
    for attempt in 1..=attempts {
        let last = attempt == attempts;
        match api.service_statuses(None) {
            Ok(statuses) if statuses.is_empty() => return Err(HealthError::NoServices),
            Ok(statuses) => {
                // BTreeMap keys come out sorted.
                let unhealthy: Vec<String> = statuses
                    .iter()
                    .filter(|(_, status)| status.as_str() != HEALTHY)
                    .map(|(name, _)| name.clone())
                    .collect();
                if unhealthy.is_empty() {
                    info!(services = statuses.len(), attempt, "all system services healthy");
                    return Ok(());
                }
                warn!(attempt, unhealthy = %unhealthy.join(","), "system services not healthy yet");
                if last {
                    return Err(HealthError::Unhealthy {
                        attempts,
                        services: unhealthy,
                    });
                }
            }
            Err(err) if last => return Err(HealthError::Transport(err)),
            Err(err) => {
                warn!(attempt, error = %err, "system service status unavailable");
            }
        }
        clock.sleep(check.interval);
    }
    Err(HealthError::Unhealthy {
        attempts,
        services: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{server_error, FakeApi};
    use runctl_core::ManualClock;
    use std::collections::BTreeMap;

    fn statuses(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, status)| (name.to_string(), status.to_string()))
            .collect()
    }

    #[test]
    fn healthy_after_services_recover() {
        let api = FakeApi::new().with_service_statuses(vec![
            Err(server_error(503)),
            Ok(statuses(&[("appfabric", "NOTOK"), ("metrics", "OK")])),
            Ok(statuses(&[("appfabric", "OK"), ("metrics", "OK")])),
        ]);
        let clock = ManualClock::new();
        wait_for_healthy(&api, &clock, &HealthCheck::default()).expect("healthy");
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    }

    #[test]
    fn empty_service_map_is_an_error() {
        let api = FakeApi::new();
        let clock = ManualClock::new();
        let err = wait_for_healthy(&api, &clock, &HealthCheck::default()).expect_err("empty");
        assert!(matches!(err, HealthError::NoServices));
    }

    #[test]
    fn gives_up_naming_unhealthy_services_sorted() {
        let api = FakeApi::new().with_service_statuses(vec![Ok(statuses(&[
            ("streams", "NOTOK"),
            ("appfabric", "NOTOK"),
            ("metrics", "OK"),
        ]))]);
        let clock = ManualClock::new();
        let check = HealthCheck {
            attempts: 3,
            interval: Duration::from_secs(1),
        };
        let err = wait_for_healthy(&api, &clock, &check).expect_err("never healthy");
        assert_eq!(
            err.to_string(),
            "system services still unhealthy after 3 attempts: appfabric, streams"
        );
        assert_eq!(clock.sleeps().len(), 2);
    }
}
