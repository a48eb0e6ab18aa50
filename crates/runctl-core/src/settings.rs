//! Environment parsing shared by the transport and lifecycle settings.
//! Unset or blank means "use the default"; anything else must parse.

use std::env;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{name} must be a positive integer when set (got: {raw})")]
    NotAnInteger { name: String, raw: String },
    #[error("{name} must be > 0 when set")]
    Zero { name: String },
    #[error("{name} must be one of 1, 0, true, false, yes, no when set (got: {raw})")]
    NotAFlag { name: String, raw: String },
    #[error("failed reading {name}: {message}")]
    Unreadable { name: String, message: String },
}

fn read_optional_env(name: &str) -> Result<Option<String>, SettingsError> {
    match env::var(name) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            Ok(Some(trimmed.to_string()))
        }
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(SettingsError::Unreadable {
            name: name.to_string(),
            message: err.to_string(),
        }),
    }
}

pub fn parse_optional_positive_u64_env(name: &str) -> Result<Option<u64>, SettingsError> {
    let Some(raw) = read_optional_env(name)? else {
        return Ok(None);
    };
    let parsed = raw.parse::<u64>().map_err(|_| SettingsError::NotAnInteger {
        name: name.to_string(),
        raw: raw.clone(),
    })?;
    if parsed == 0 {
        return Err(SettingsError::Zero {
            name: name.to_string(),
        });
    }
    Ok(Some(parsed))
}

/// Like [`parse_optional_positive_u64_env`] but zero is a valid value.
pub fn parse_optional_u64_env(name: &str) -> Result<Option<u64>, SettingsError> {
    let Some(raw) = read_optional_env(name)? else {
        return Ok(None);
    };
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| SettingsError::NotAnInteger {
            name: name.to_string(),
            raw,
        })
}

pub fn parse_optional_flag_env(name: &str) -> Result<Option<bool>, SettingsError> {
    let Some(raw) = read_optional_env(name)? else {
        return Ok(None);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        _ => Err(SettingsError::NotAFlag {
            name: name.to_string(),
            raw,
        }),
    }
}

pub fn parse_optional_string_env(name: &str) -> Result<Option<String>, SettingsError> {
    read_optional_env(name)
}
