//! Lifecycle of remote program runs: correlate a run through its token,
//! wait for it to start, stop it, and decide whether it exists when other
//! runs of the same program may be around.

pub mod error;
pub mod handle;
pub mod health;
pub mod lifecycle;
pub mod policy;
mod program;
pub mod registry;
pub mod settings;
#[cfg(test)]
mod testing;

pub use error::{format_duration, LifecycleError};
pub use handle::{HandleBinding, LifecycleHandle};
pub use health::{wait_for_healthy, HealthCheck, HealthError};
pub use lifecycle::{DeleteOutcome, RunLifecycle, RunRequest};
pub use policy::{decide_presence, Correlation, Presence};
pub use registry::{LookupError, RunRegistry};
pub use settings::{resolve_lifecycle_settings_from_env, LifecycleSettings};
