use crate::status::RunStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw `properties` map of a run as returned by the service.
pub type RunProperties = BTreeMap<String, Value>;

/// One execution attempt of a program. Only the fields the lifecycle needs
/// are modelled; the rest of the payload is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(rename = "runid")]
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub properties: RunProperties,
}

/// Aggregate status of a program across all of its runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramStatus {
    pub status: RunStatus,
}
