//! HTTP plumbing for the management service: a single-attempt sender, a
//! retry policy expressed as data, the retrying [`Transport`], and the
//! [`ManagementApi`] the lifecycle is written against.

pub mod api;
pub mod error;
pub mod http;
pub mod retry;
mod transport;

pub use api::{HttpManagementApi, ManagementApi};
pub use error::TransportError;
pub use http::{
    resolve_client_settings_from_env, ApiRequest, ClientSettings, HttpMethod, HttpSend,
    ReqwestSender,
};
pub use retry::{resolve_retry_policy_from_env, RetryPolicy, RetryableStatuses};
pub use transport::Transport;
