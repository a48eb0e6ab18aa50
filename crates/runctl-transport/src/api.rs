use crate::error::TransportError;
use crate::http::ApiRequest;
use crate::transport::Transport;
use runctl_core::{encode_path_segment, url_join, Deadline, ProgramAddress, ProgramStatus, RunRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::info;

const NAMESPACES_PATH: &str = "v3/namespaces";
const SYSTEM_SERVICES_STATUS_PATH: &str = "v3/system/services/status";

/// The management service operations the lifecycle consumes. Every call
/// takes the enclosing operation deadline so retry backoff can respect it.
pub trait ManagementApi: Send + Sync {
    fn start_program(
        &self,
        address: &ProgramAddress,
        runtime_args: &BTreeMap<String, String>,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError>;

    fn program_status(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<ProgramStatus, TransportError>;

    fn list_runs(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<Vec<RunRecord>, TransportError>;

    fn get_run(
        &self,
        address: &ProgramAddress,
        run_id: &str,
        deadline: Option<&Deadline>,
    ) -> Result<RunRecord, TransportError>;

    fn stop_run(
        &self,
        address: &ProgramAddress,
        run_id: &str,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError>;

    fn stop_program(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError>;

    /// Status of every system service on the instance, keyed by service name.
    fn service_statuses(
        &self,
        deadline: Option<&Deadline>,
    ) -> Result<BTreeMap<String, String>, TransportError>;
}

/// [`ManagementApi`] over the CDAP v3 REST layout.
#[derive(Clone)]
pub struct HttpManagementApi {
    host: String,
    transport: Transport,
}

impl HttpManagementApi {
    pub fn new(host: &str, transport: Transport) -> Result<Self, TransportError> {
        let host = host.trim().to_string();
        if host.is_empty() {
            return Err(TransportError::InvalidRequest {
                url: host,
                message: "management host must not be empty".to_string(),
            });
        }
        Ok(Self { host, transport })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn program_url(&self, address: &ProgramAddress, suffix: &str) -> String {
        url_join(
            &self.host,
            &format!("{}/{}", address.program_path(), suffix.trim_start_matches('/')),
        )
    }

    fn run_url(&self, address: &ProgramAddress, run_id: &str, suffix: Option<&str>) -> String {
        let mut path = format!("runs/{}", encode_path_segment(run_id));
        if let Some(suffix) = suffix {
            path.push('/');
            path.push_str(suffix);
        }
        self.program_url(address, &path)
    }

    /// Lists namespaces and insists on a JSON answer. Bad credentials are
    /// often answered with a 200 sign-in page, so status alone proves nothing.
    pub fn verify_connectivity(&self) -> Result<(), TransportError> {
        let request = ApiRequest::get(url_join(&self.host, NAMESPACES_PATH));
        let _: Value = self.transport.call_json(&request, None)?;
        info!(host = %self.host, "management service reachable");
        Ok(())
    }
}

impl ManagementApi for HttpManagementApi {
    fn start_program(
        &self,
        address: &ProgramAddress,
        runtime_args: &BTreeMap<String, String>,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        let request = ApiRequest::post_json(self.program_url(address, "start"), runtime_args)?;
        self.transport.call(&request, deadline)?;
        Ok(())
    }

    fn program_status(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<ProgramStatus, TransportError> {
        let request = ApiRequest::get(self.program_url(address, "status"));
        self.transport.call_json(&request, deadline)
    }

    fn list_runs(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<Vec<RunRecord>, TransportError> {
        let request = ApiRequest::get(self.program_url(address, "runs"));
        self.transport.call_json(&request, deadline)
    }

    fn get_run(
        &self,
        address: &ProgramAddress,
        run_id: &str,
        deadline: Option<&Deadline>,
    ) -> Result<RunRecord, TransportError> {
        let request = ApiRequest::get(self.run_url(address, run_id, None));
        self.transport.call_json(&request, deadline)
    }

    fn stop_run(
        &self,
        address: &ProgramAddress,
        run_id: &str,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        let request = ApiRequest::post(self.run_url(address, run_id, Some("stop")));
        self.transport.call(&request, deadline)?;
        Ok(())
    }

    fn stop_program(
        &self,
        address: &ProgramAddress,
        deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        let request = ApiRequest::post(self.program_url(address, "stop"));
        self.transport.call(&request, deadline)?;
        Ok(())
    }

    fn service_statuses(
        &self,
        deadline: Option<&Deadline>,
    ) -> Result<BTreeMap<String, String>, TransportError> {
        let request = ApiRequest::get(url_join(&self.host, SYSTEM_SERVICES_STATUS_PATH));
        self.transport.call_json(&request, deadline)
    }
}
