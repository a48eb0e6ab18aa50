use crate::encode_path_segment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_PROGRAM_NAME: &str = "DataStreamsSparkStreaming";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("program address {0} must not be empty")]
    EmptySegment(&'static str),
    #[error("unknown program type {0} (expected one of: flows, mapreduce, services, spark, workers, workflows)")]
    UnknownProgramType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramType {
    Flows,
    Mapreduce,
    Services,
    #[default]
    Spark,
    Workers,
    Workflows,
}

impl ProgramType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgramType::Flows => "flows",
            ProgramType::Mapreduce => "mapreduce",
            ProgramType::Services => "services",
            ProgramType::Spark => "spark",
            ProgramType::Workers => "workers",
            ProgramType::Workflows => "workflows",
        }
    }
}

impl FromStr for ProgramType {
    type Err = AddressError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "flows" => Ok(ProgramType::Flows),
            "mapreduce" => Ok(ProgramType::Mapreduce),
            "services" => Ok(ProgramType::Services),
            "spark" => Ok(ProgramType::Spark),
            "workers" => Ok(ProgramType::Workers),
            "workflows" => Ok(ProgramType::Workflows),
            other => Err(AddressError::UnknownProgramType(other.to_string())),
        }
    }
}

impl fmt::Display for ProgramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one program on the management service. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramAddress {
    namespace: String,
    application: String,
    program_type: ProgramType,
    program_name: String,
}

impl ProgramAddress {
    pub fn new(
        namespace: impl Into<String>,
        application: impl Into<String>,
        program_type: ProgramType,
        program_name: impl Into<String>,
    ) -> Result<Self, AddressError> {
        let namespace = namespace.into().trim().to_string();
        let application = application.into().trim().to_string();
        let program_name = program_name.into().trim().to_string();
        if namespace.is_empty() {
            return Err(AddressError::EmptySegment("namespace"));
        }
        if application.is_empty() {
            return Err(AddressError::EmptySegment("application"));
        }
        if program_name.is_empty() {
            return Err(AddressError::EmptySegment("program name"));
        }
        Ok(Self {
            namespace,
            application,
            program_type,
            program_name,
        })
    }

    /// Spark streaming program in the default namespace.
    pub fn streaming(application: impl Into<String>) -> Result<Self, AddressError> {
        Self::new(
            DEFAULT_NAMESPACE,
            application,
            ProgramType::Spark,
            DEFAULT_PROGRAM_NAME,
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn program_type(&self) -> ProgramType {
        self.program_type
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Path of the program resource relative to the service root, each
    /// segment percent-encoded.
    pub fn program_path(&self) -> String {
        format!(
            "v3/namespaces/{}/apps/{}/{}/{}",
            encode_path_segment(&self.namespace),
            encode_path_segment(&self.application),
            self.program_type.as_str(),
            encode_path_segment(&self.program_name)
        )
    }
}

impl fmt::Display for ProgramAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.application, self.program_type, self.program_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_path_follows_v3_layout() {
        let address =
            ProgramAddress::new("default", "ingest", ProgramType::Workflows, "Nightly").unwrap();
        assert_eq!(
            address.program_path(),
            "v3/namespaces/default/apps/ingest/workflows/Nightly"
        );
        assert_eq!(address.to_string(), "default/ingest/workflows/Nightly");
    }

    #[test]
    fn streaming_address_uses_defaults() {
        let address = ProgramAddress::streaming("clicks").unwrap();
        assert_eq!(address.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(address.program_type(), ProgramType::Spark);
        assert_eq!(address.program_name(), DEFAULT_PROGRAM_NAME);
    }

    #[test]
    fn empty_segments_are_rejected() {
        let err = ProgramAddress::new(" ", "app", ProgramType::Spark, "p").unwrap_err();
        assert_eq!(err, AddressError::EmptySegment("namespace"));
        let err = ProgramAddress::new("ns", "app", ProgramType::Spark, "").unwrap_err();
        assert_eq!(err, AddressError::EmptySegment("program name"));
    }

    #[test]
    fn program_type_parses_known_values_only() {
        assert_eq!("workers".parse::<ProgramType>().unwrap(), ProgramType::Workers);
        let err = "jobs".parse::<ProgramType>().unwrap_err();
        assert!(err.to_string().contains("unknown program type jobs"));
    }
}
