//! Client-side run correlation.
//!
//! The start call accepts no caller-supplied id, so a random token rides
//! along in the runtime arguments under a reserved key. The service echoes
//! the arguments back on every run as `properties.runtimeArgs`: a JSON
//! object serialized to text and then embedded as a JSON string, so
//! recovering the token means decoding twice.

use crate::record::RunProperties;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Reserved runtime-argument key carrying the run token. Part of the wire
/// contract with every deployment that shares runs with this tool.
pub const RUN_TOKEN_KEY: &str = "__RUN_TOKEN__";
pub const RUNTIME_ARGS_PROPERTY: &str = "runtimeArgs";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunToken(String);

impl RunToken {
    /// Random 128-bit token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a run record does not carry a token we can read. Always scoped to
/// one record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("run properties have no runtimeArgs entry")]
    MissingRuntimeArgs,
    #[error("runtimeArgs is a JSON {0}, expected an encoded string")]
    NotEncodedString(&'static str),
    #[error("runtimeArgs does not contain JSON: {0}")]
    InvalidJson(String),
    #[error("runtimeArgs decodes to a JSON {0}, expected an object")]
    NotAnObject(&'static str),
    #[error("runtime arguments have no {0} entry")]
    MissingToken(String),
    #[error("runtime argument {key} is a JSON {kind}, expected a string")]
    TokenNotString { key: String, kind: &'static str },
}

/// Narrow seam between the lifecycle and the way a token travels through
/// the service. Replace the implementation if the service ever grows a
/// native client-token field.
pub trait RunCorrelator: Send + Sync {
    fn reserved_key(&self) -> &str;

    fn embed(&self, args: &mut BTreeMap<String, String>, token: &RunToken);

    fn extract(&self, properties: &RunProperties) -> Result<RunToken, DecodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeArgsCorrelator {
    key: String,
}

impl Default for RuntimeArgsCorrelator {
    fn default() -> Self {
        Self {
            key: RUN_TOKEN_KEY.to_string(),
        }
    }
}

impl RuntimeArgsCorrelator {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl RunCorrelator for RuntimeArgsCorrelator {
    fn reserved_key(&self) -> &str {
        &self.key
    }

    fn embed(&self, args: &mut BTreeMap<String, String>, token: &RunToken) {
        args.insert(self.key.clone(), token.as_str().to_string());
    }

    fn extract(&self, properties: &RunProperties) -> Result<RunToken, DecodeError> {
        // The outer JSON layer was already undone when the run list was
        // deserialized; what is left is the string holding the inner object.
        let raw = properties
            .get(RUNTIME_ARGS_PROPERTY)
            .ok_or(DecodeError::MissingRuntimeArgs)?;
        let Value::String(encoded) = raw else {
            return Err(DecodeError::NotEncodedString(json_kind(raw)));
        };
        let inner: Value = serde_json::from_str(encoded)
            .map_err(|err| DecodeError::InvalidJson(err.to_string()))?;
        let Value::Object(args) = inner else {
            return Err(DecodeError::NotAnObject(json_kind(&inner)));
        };
        match args.get(&self.key) {
            Some(Value::String(token)) => Ok(RunToken::from_raw(token.clone())),
            Some(other) => Err(DecodeError::TokenNotString {
                key: self.key.clone(),
                kind: json_kind(other),
            }),
            None => Err(DecodeError::MissingToken(self.key.clone())),
        }
    }
}

/// Produces the `runtimeArgs` property value the service reports for a run
/// started with `args`.
pub fn encode_runtime_args(args: &BTreeMap<String, String>) -> Value {
    let mut inner = serde_json::Map::new();
    for (key, value) in args {
        inner.insert(key.clone(), Value::String(value.clone()));
    }
    Value::String(Value::Object(inner).to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
