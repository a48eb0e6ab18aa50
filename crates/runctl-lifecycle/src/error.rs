use runctl_transport::TransportError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },
    #[error(
        "no run of {address} carried token {token} within {}",
        format_duration(.waited)
    )]
    Correlation {
        address: String,
        token: String,
        waited: Duration,
    },
    #[error("run {run} of {address} in state {status}: {detail}")]
    State {
        address: String,
        run: String,
        status: String,
        detail: String,
    },
    #[error(
        "timed out after {} waiting for {waiting_for} on {address} ({run}, last observed {last_status})",
        format_duration(.waited)
    )]
    Timeout {
        address: String,
        run: String,
        waited: Duration,
        waiting_for: String,
        last_status: String,
    },
    #[error("another run of {address} is already {status} and concurrent runs are disallowed")]
    Ambiguity { address: String, status: String },
    #[error("handle is bound to run {bound}; refusing to rebind it to run {requested}")]
    Binding { bound: String, requested: String },
}

impl LifecycleError {
    pub(crate) fn transport(context: impl Into<String>, source: TransportError) -> Self {
        LifecycleError::Transport {
            context: context.into(),
            source,
        }
    }

    /// The HTTP status code underneath a transport failure, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LifecycleError::Transport { source, .. } => source.status_code(),
            _ => None,
        }
    }
}

/// Compact rendering used in error messages: `20m`, `1h30m`, `45s`, `1500ms`.
pub fn format_duration(duration: &Duration) -> String {
    let total_ms = duration.as_millis();
    if total_ms % 1_000 != 0 {
        return format!("{}ms", total_ms);
    }
    let total_secs = duration.as_secs();
    if total_secs == 0 {
        return "0s".to_string();
    }
    let hours = total_secs / 3_600;
    let minutes = (total_secs % 3_600) / 60;
    let seconds = total_secs % 60;
    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}
