use runctl_core::settings::{parse_optional_positive_u64_env, SettingsError};
use runctl_core::{
    RUNCTL_ENV_CREATE_TIMEOUT_SECS, RUNCTL_ENV_DELETE_TIMEOUT_SECS, RUNCTL_ENV_POLL_INTERVAL_MS,
};
use std::time::Duration;

const CREATE_TIMEOUT_SECS_DEFAULT: u64 = 20 * 60;
const DELETE_TIMEOUT_SECS_DEFAULT: u64 = 60 * 60;
const POLL_INTERVAL_MS_DEFAULT: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(CREATE_TIMEOUT_SECS_DEFAULT),
            delete_timeout: Duration::from_secs(DELETE_TIMEOUT_SECS_DEFAULT),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS_DEFAULT),
        }
    }
}

pub fn resolve_lifecycle_settings_from_env() -> Result<LifecycleSettings, SettingsError> {
    let mut settings = LifecycleSettings::default();
    if let Some(secs) = parse_optional_positive_u64_env(RUNCTL_ENV_CREATE_TIMEOUT_SECS)? {
        settings.create_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = parse_optional_positive_u64_env(RUNCTL_ENV_DELETE_TIMEOUT_SECS)? {
        settings.delete_timeout = Duration::from_secs(secs);
    }
    if let Some(ms) = parse_optional_positive_u64_env(RUNCTL_ENV_POLL_INTERVAL_MS)? {
        settings.poll_interval = Duration::from_millis(ms);
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn lifecycle_settings_default_and_env_override() {
        let keys = [
            RUNCTL_ENV_CREATE_TIMEOUT_SECS,
            RUNCTL_ENV_DELETE_TIMEOUT_SECS,
            RUNCTL_ENV_POLL_INTERVAL_MS,
        ];
        let previous: Vec<Option<String>> = keys.iter().map(|key| env::var(key).ok()).collect();

        for key in keys {
            env::remove_var(key);
        }
        assert_eq!(
            resolve_lifecycle_settings_from_env().unwrap(),
            LifecycleSettings::default()
        );

        env::set_var(RUNCTL_ENV_CREATE_TIMEOUT_SECS, "30");
        env::set_var(RUNCTL_ENV_POLL_INTERVAL_MS, "250");
        let settings = resolve_lifecycle_settings_from_env().unwrap();
        assert_eq!(settings.create_timeout, Duration::from_secs(30));
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.delete_timeout, Duration::from_secs(3_600));

        env::set_var(RUNCTL_ENV_DELETE_TIMEOUT_SECS, "0");
        assert!(matches!(
            resolve_lifecycle_settings_from_env(),
            Err(SettingsError::Zero { .. })
        ));

        for (key, value) in keys.iter().zip(previous) {
            if let Some(value) = value {
                env::set_var(key, value);
            } else {
                env::remove_var(key);
            }
        }
    }
}
