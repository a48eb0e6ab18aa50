//! Shared vocabulary for driving program runs on a CDAP-style management API:
//! program addresses, run status classification, the run record wire model,
//! the run token codec, and the clock/deadline primitive used by every poll loop.

pub mod address;
pub mod clock;
pub mod record;
pub mod settings;
pub mod status;
pub mod token;

pub use address::{AddressError, ProgramAddress, ProgramType, DEFAULT_NAMESPACE, DEFAULT_PROGRAM_NAME};
pub use clock::{Clock, Deadline, ManualClock, SystemClock};
pub use record::{ProgramStatus, RunProperties, RunRecord};
pub use settings::SettingsError;
pub use status::{RunStatus, StatusClass, StatusTables};
pub use token::{
    encode_runtime_args, DecodeError, RunCorrelator, RunToken, RuntimeArgsCorrelator,
    RUNTIME_ARGS_PROPERTY, RUN_TOKEN_KEY,
};

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

pub const RUNCTL_ENV_HOST: &str = "RUNCTL_HOST";
pub const RUNCTL_ENV_TOKEN_ENV: &str = "RUNCTL_TOKEN_ENV";
pub const RUNCTL_ENV_RETRY_MAX_RETRIES: &str = "RUNCTL_RETRY_MAX_RETRIES";
pub const RUNCTL_ENV_RETRY_BASE_BACKOFF_MS: &str = "RUNCTL_RETRY_BASE_BACKOFF_MS";
pub const RUNCTL_ENV_RETRY_HARDENED: &str = "RUNCTL_RETRY_HARDENED";
pub const RUNCTL_ENV_CONNECT_TIMEOUT_MS: &str = "RUNCTL_CONNECT_TIMEOUT_MS";
pub const RUNCTL_ENV_REQUEST_TIMEOUT_MS: &str = "RUNCTL_REQUEST_TIMEOUT_MS";
pub const RUNCTL_ENV_CREATE_TIMEOUT_SECS: &str = "RUNCTL_CREATE_TIMEOUT_SECS";
pub const RUNCTL_ENV_DELETE_TIMEOUT_SECS: &str = "RUNCTL_DELETE_TIMEOUT_SECS";
pub const RUNCTL_ENV_POLL_INTERVAL_MS: &str = "RUNCTL_POLL_INTERVAL_MS";

// Characters that must not appear raw inside one URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Joins a base URL and a relative path with exactly one `/` between them.
pub fn url_join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_collapses_duplicate_slashes() {
        assert_eq!(
            url_join("http://cdap:11015/", "/v3/namespaces"),
            "http://cdap:11015/v3/namespaces"
        );
        assert_eq!(url_join("http://cdap", "v3"), "http://cdap/v3");
    }

    #[test]
    fn path_segments_escape_separators_and_spaces() {
        assert_eq!(encode_path_segment("my app/v2"), "my%20app%2Fv2");
        assert_eq!(encode_path_segment("plain-name_1"), "plain-name_1");
    }
}
