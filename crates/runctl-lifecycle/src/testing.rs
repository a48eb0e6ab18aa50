//! Scripted in-memory management service shared by the unit tests.

use runctl_core::{
    encode_runtime_args, Deadline, ProgramAddress, ProgramStatus, ProgramType, RunProperties,
    RunRecord, RunStatus, RUNTIME_ARGS_PROPERTY, RUN_TOKEN_KEY,
};
use runctl_transport::{HttpMethod, ManagementApi, TransportError};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

pub(crate) fn address() -> ProgramAddress {
    ProgramAddress::new("default", "clicks", ProgramType::Spark, "Stream").expect("address")
}

pub(crate) fn not_found() -> TransportError {
    TransportError::Status {
        method: HttpMethod::Get,
        url: "http://cdap/v3/fake".to_string(),
        code: 404,
        body: "not found".to_string(),
    }
}

pub(crate) fn server_error(code: u16) -> TransportError {
    TransportError::Status {
        method: HttpMethod::Get,
        url: "http://cdap/v3/fake".to_string(),
        code,
        body: "upstream trouble".to_string(),
    }
}

pub(crate) fn rejected(code: u16, body: &str) -> TransportError {
    TransportError::Status {
        method: HttpMethod::Post,
        url: "http://cdap/v3/fake".to_string(),
        code,
        body: body.to_string(),
    }
}

/// Pops one step per call and keeps answering with the last step once
/// the script is down to it.
pub(crate) struct Script<T> {
    steps: Mutex<VecDeque<T>>,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
        }
    }

    fn next(&self) -> Option<T> {
        let mut steps = self.steps.lock().expect("script lock");
        if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Owner {
    /// Carries the arguments of the most recent start call.
    Ours,
    Foreign(&'static str),
    Garbage(Value),
    Bare,
}

#[derive(Debug, Clone)]
pub(crate) struct Listed {
    run_id: &'static str,
    status: RunStatus,
    owner: Owner,
}

impl Listed {
    pub(crate) fn bare(run_id: &'static str, status: RunStatus) -> Self {
        Self {
            run_id,
            status,
            owner: Owner::Bare,
        }
    }
}

pub(crate) fn ours(run_id: &'static str, status: RunStatus) -> Listed {
    Listed {
        run_id,
        status,
        owner: Owner::Ours,
    }
}

pub(crate) fn foreign(run_id: &'static str, status: RunStatus, token: &'static str) -> Listed {
    Listed {
        run_id,
        status,
        owner: Owner::Foreign(token),
    }
}

pub(crate) fn garbage(run_id: &'static str, status: RunStatus, runtime_args: Value) -> Listed {
    Listed {
        run_id,
        status,
        owner: Owner::Garbage(runtime_args),
    }
}

pub(crate) struct FakeApi {
    program_statuses: Script<Result<RunStatus, TransportError>>,
    run_lists: Script<Result<Vec<Listed>, TransportError>>,
    run_fetches: Script<Result<RunStatus, TransportError>>,
    start_results: Script<Result<(), TransportError>>,
    stop_results: Script<Result<(), TransportError>>,
    service_statuses: Script<Result<BTreeMap<String, String>, TransportError>>,
    started: Mutex<Vec<BTreeMap<String, String>>>,
    run_stops: Mutex<Vec<String>>,
    program_stops: Mutex<usize>,
    list_calls: Mutex<usize>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self {
            program_statuses: Script::new(Vec::new()),
            run_lists: Script::new(Vec::new()),
            run_fetches: Script::new(Vec::new()),
            start_results: Script::new(Vec::new()),
            stop_results: Script::new(Vec::new()),
            service_statuses: Script::new(Vec::new()),
            started: Mutex::new(Vec::new()),
            run_stops: Mutex::new(Vec::new()),
            program_stops: Mutex::new(0),
            list_calls: Mutex::new(0),
        }
    }

    pub(crate) fn with_program_statuses(
        mut self,
        steps: Vec<Result<RunStatus, TransportError>>,
    ) -> Self {
        self.program_statuses = Script::new(steps);
        self
    }

    pub(crate) fn with_run_lists(mut self, steps: Vec<Result<Vec<Listed>, TransportError>>) -> Self {
        self.run_lists = Script::new(steps);
        self
    }

    pub(crate) fn with_run_fetches(mut self, steps: Vec<Result<RunStatus, TransportError>>) -> Self {
        self.run_fetches = Script::new(steps);
        self
    }

    pub(crate) fn with_start_results(mut self, steps: Vec<Result<(), TransportError>>) -> Self {
        self.start_results = Script::new(steps);
        self
    }

    pub(crate) fn with_stop_results(mut self, steps: Vec<Result<(), TransportError>>) -> Self {
        self.stop_results = Script::new(steps);
        self
    }

    pub(crate) fn with_service_statuses(
        mut self,
        steps: Vec<Result<BTreeMap<String, String>, TransportError>>,
    ) -> Self {
        self.service_statuses = Script::new(steps);
        self
    }

    pub(crate) fn started(&self) -> Vec<BTreeMap<String, String>> {
        self.started.lock().expect("started lock").clone()
    }

    pub(crate) fn started_token(&self) -> Option<String> {
        self.started()
            .last()
            .and_then(|args| args.get(RUN_TOKEN_KEY).cloned())
    }

    pub(crate) fn run_stops(&self) -> Vec<String> {
        self.run_stops.lock().expect("stops lock").clone()
    }

    pub(crate) fn program_stops(&self) -> usize {
        *self.program_stops.lock().expect("program stops lock")
    }

    pub(crate) fn list_calls(&self) -> usize {
        *self.list_calls.lock().expect("list calls lock")
    }

    fn properties_for(&self, owner: &Owner) -> RunProperties {
        let mut properties = RunProperties::new();
        let runtime_args = match owner {
            Owner::Ours => encode_runtime_args(&self.started().last().cloned().unwrap_or_default()),
            Owner::Foreign(token) => encode_runtime_args(&BTreeMap::from([(
                RUN_TOKEN_KEY.to_string(),
                token.to_string(),
            )])),
            Owner::Garbage(value) => value.clone(),
            Owner::Bare => return properties,
        };
        properties.insert(RUNTIME_ARGS_PROPERTY.to_string(), runtime_args);
        properties
    }
}

impl ManagementApi for FakeApi {
    fn start_program(
        &self,
        _address: &ProgramAddress,
        runtime_args: &BTreeMap<String, String>,
        _deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        self.started
            .lock()
            .expect("started lock")
            .push(runtime_args.clone());
        self.start_results.next().unwrap_or(Ok(()))
    }

    fn program_status(
        &self,
        _address: &ProgramAddress,
        _deadline: Option<&Deadline>,
    ) -> Result<ProgramStatus, TransportError> {
        let status = self.program_statuses.next().unwrap_or(Ok(RunStatus::Stopped))?;
        Ok(ProgramStatus { status })
    }

    fn list_runs(
        &self,
        _address: &ProgramAddress,
        _deadline: Option<&Deadline>,
    ) -> Result<Vec<RunRecord>, TransportError> {
        *self.list_calls.lock().expect("list calls lock") += 1;
        let listed = self.run_lists.next().unwrap_or_else(|| Ok(Vec::new()))?;
        Ok(listed
            .iter()
            .map(|entry| RunRecord {
                run_id: entry.run_id.to_string(),
                status: entry.status.clone(),
                properties: self.properties_for(&entry.owner),
            })
            .collect())
    }

    fn get_run(
        &self,
        _address: &ProgramAddress,
        run_id: &str,
        _deadline: Option<&Deadline>,
    ) -> Result<RunRecord, TransportError> {
        let status = self.run_fetches.next().unwrap_or_else(|| Err(not_found()))?;
        Ok(RunRecord {
            run_id: run_id.to_string(),
            status,
            properties: RunProperties::new(),
        })
    }

    fn stop_run(
        &self,
        _address: &ProgramAddress,
        run_id: &str,
        _deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        self.run_stops
            .lock()
            .expect("stops lock")
            .push(run_id.to_string());
        self.stop_results.next().unwrap_or(Ok(()))
    }

    fn stop_program(
        &self,
        _address: &ProgramAddress,
        _deadline: Option<&Deadline>,
    ) -> Result<(), TransportError> {
        *self.program_stops.lock().expect("program stops lock") += 1;
        self.stop_results.next().unwrap_or(Ok(()))
    }

    fn service_statuses(
        &self,
        _deadline: Option<&Deadline>,
    ) -> Result<BTreeMap<String, String>, TransportError> {
        self.service_statuses
            .next()
            .unwrap_or_else(|| Ok(BTreeMap::new()))
    }
}
