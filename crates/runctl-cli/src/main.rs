use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use runctl_core::settings::parse_optional_string_env;
use runctl_core::{
    Clock, ProgramAddress, ProgramType, RunToken, SystemClock, DEFAULT_NAMESPACE,
    DEFAULT_PROGRAM_NAME, RUNCTL_ENV_HOST, RUNCTL_ENV_TOKEN_ENV,
};
use runctl_lifecycle::{
    resolve_lifecycle_settings_from_env, wait_for_healthy, DeleteOutcome, HealthCheck,
    LifecycleError, LifecycleHandle, RunLifecycle, RunRequest,
};
use runctl_transport::{
    resolve_client_settings_from_env, resolve_retry_policy_from_env, HttpManagementApi,
    ReqwestSender, Transport,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "runctl", version = "0.3.0", about = "Drive program runs on a CDAP management API")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Management API base URL (falls back to RUNCTL_HOST).
    #[arg(long, global = true)]
    host: Option<String>,
    /// Name of the env var holding a bearer token (falls back to RUNCTL_TOKEN_ENV).
    #[arg(long, global = true)]
    token_env: Option<String>,
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgramTypeArg {
    #[value(name = "flows")]
    Flows,
    #[value(name = "mapreduce")]
    Mapreduce,
    #[value(name = "services")]
    Services,
    #[value(name = "spark")]
    Spark,
    #[value(name = "workers")]
    Workers,
    #[value(name = "workflows")]
    Workflows,
}

impl From<ProgramTypeArg> for ProgramType {
    fn from(value: ProgramTypeArg) -> Self {
        match value {
            ProgramTypeArg::Flows => ProgramType::Flows,
            ProgramTypeArg::Mapreduce => ProgramType::Mapreduce,
            ProgramTypeArg::Services => ProgramType::Services,
            ProgramTypeArg::Spark => ProgramType::Spark,
            ProgramTypeArg::Workers => ProgramType::Workers,
            ProgramTypeArg::Workflows => ProgramType::Workflows,
        }
    }
}

#[derive(Args, Clone)]
struct ProgramArgs {
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    #[arg(long)]
    app: String,
    #[arg(long = "type", value_enum, default_value = "spark")]
    program_type: ProgramTypeArg,
    #[arg(long, default_value = DEFAULT_PROGRAM_NAME)]
    name: String,
}

impl ProgramArgs {
    fn address(&self) -> Result<ProgramAddress> {
        Ok(ProgramAddress::new(
            self.namespace.as_str(),
            self.app.as_str(),
            self.program_type.into(),
            self.name.as_str(),
        )?)
    }
}

#[derive(Args, Clone)]
struct HandleArgs {
    /// Service run id of a run started earlier.
    #[arg(long)]
    run_id: Option<String>,
    /// Run token printed by `start`, for runs not yet bound to an id.
    #[arg(long)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a tracked run and wait until it is RUNNING.
    Start {
        #[command(flatten)]
        program: ProgramArgs,
        #[arg(long = "arg")]
        args: Vec<String>,
        #[arg(long)]
        allow_multiple_runs: bool,
        #[arg(long)]
        json: bool,
    },
    Read {
        #[command(flatten)]
        program: ProgramArgs,
        #[command(flatten)]
        handle: HandleArgs,
        #[arg(long)]
        json: bool,
    },
    /// Stop a run and wait until it is terminal.
    Stop {
        #[command(flatten)]
        program: ProgramArgs,
        #[command(flatten)]
        handle: HandleArgs,
        #[arg(long)]
        json: bool,
    },
    Exists {
        #[command(flatten)]
        program: ProgramArgs,
        #[command(flatten)]
        handle: HandleArgs,
        #[arg(long)]
        allow_multiple_runs: bool,
        #[arg(long)]
        json: bool,
    },
    ProgramStart {
        #[command(flatten)]
        program: ProgramArgs,
        #[arg(long)]
        json: bool,
    },
    ProgramStop {
        #[command(flatten)]
        program: ProgramArgs,
        #[arg(long)]
        json: bool,
    },
    /// Check connectivity and wait for every system service to report OK.
    Health {
        #[arg(long, default_value_t = 10)]
        attempts: u32,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(&cli.global, cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), format!("{:#}", err), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

struct Connection {
    api: Arc<HttpManagementApi>,
    lifecycle: RunLifecycle,
    clock: Arc<dyn Clock>,
}

fn connect(global: &GlobalArgs) -> Result<Connection> {
    let host = match global.host.clone() {
        Some(host) => host,
        None => parse_optional_string_env(RUNCTL_ENV_HOST)?.ok_or_else(|| {
            anyhow!(
                "management host is not set: pass --host or set {}",
                RUNCTL_ENV_HOST
            )
        })?,
    };
    let token_env = match global.token_env.clone() {
        Some(name) => Some(name),
        None => parse_optional_string_env(RUNCTL_ENV_TOKEN_ENV)?,
    };
    let bearer_token = resolve_bearer_token(token_env.as_deref())?;
    debug!(host = %host, token_env = token_env.as_deref().unwrap_or(""), authenticated = bearer_token.is_some(), "connecting to management api");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sender = ReqwestSender::new(&resolve_client_settings_from_env()?, bearer_token)?;
    let transport = Transport::new(Arc::new(sender), resolve_retry_policy_from_env()?, clock.clone());
    let api = Arc::new(HttpManagementApi::new(&host, transport)?);
    let lifecycle = RunLifecycle::new(api.clone(), clock.clone())
        .with_settings(resolve_lifecycle_settings_from_env()?);
    Ok(Connection {
        api,
        lifecycle,
        clock,
    })
}

fn run_command(global: &GlobalArgs, command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Start {
            program,
            args,
            allow_multiple_runs,
            json,
        } => {
            let address = program.address()?;
            let request = RunRequest {
                address: address.clone(),
                runtime_args: parse_runtime_args(&args)?,
                allow_multiple_runs,
            };
            let handle = connect(global)?.lifecycle.create(&request)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "start",
                    "program": address.to_string(),
                    "handle": serde_json::to_value(&handle)?,
                })));
            }
            println!("program: {}", address);
            println!("run_id: {}", handle.run_id().unwrap_or("-"));
            if let Some(token) = handle.token() {
                println!("token: {}", token);
            }
        }
        Commands::Read {
            program,
            handle,
            json,
        } => {
            let mut handle = handle_from_args(program.address()?, &handle)?;
            let run = connect(global)?.lifecycle.read(&mut handle)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "read",
                    "handle": serde_json::to_value(&handle)?,
                    "run": run,
                })));
            }
            match run {
                Some(run) => {
                    println!("run_id: {}", run.run_id);
                    println!("status: {}", run.status);
                }
                None => println!("{} not found", handle.describe()),
            }
        }
        Commands::Stop {
            program,
            handle,
            json,
        } => {
            let mut handle = handle_from_args(program.address()?, &handle)?;
            let outcome = connect(global)?.lifecycle.delete(&mut handle)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "stop",
                    "handle": serde_json::to_value(&handle)?,
                    "outcome": serde_json::to_value(&outcome)?,
                })));
            }
            match outcome {
                DeleteOutcome::Ended {
                    run_id,
                    final_status,
                    stop_commands,
                } => println!(
                    "run {} ended in {} (stop commands: {})",
                    run_id, final_status, stop_commands
                ),
                DeleteOutcome::Vanished {
                    run_id,
                    stop_commands,
                } => println!(
                    "run {} is no longer known to the service (stop commands: {})",
                    run_id, stop_commands
                ),
                DeleteOutcome::NeverStarted => {
                    println!("{} never appeared; nothing to stop", handle.describe())
                }
            }
        }
        Commands::Exists {
            program,
            handle,
            allow_multiple_runs,
            json,
        } => {
            let mut handle = handle_from_args(program.address()?, &handle)?;
            let exists = connect(global)?
                .lifecycle
                .exists(&mut handle, allow_multiple_runs)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "exists",
                    "handle": serde_json::to_value(&handle)?,
                    "exists": exists,
                })));
            }
            println!("{}", exists);
        }
        Commands::ProgramStart { program, json } => {
            let address = program.address()?;
            let status = connect(global)?.lifecycle.start_program(&address)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "program-start",
                    "program": address.to_string(),
                    "status": status,
                })));
            }
            println!("{}: {}", address, status);
        }
        Commands::ProgramStop { program, json } => {
            let address = program.address()?;
            let status = connect(global)?.lifecycle.stop_program(&address)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "program-stop",
                    "program": address.to_string(),
                    "status": status,
                })));
            }
            println!("{}: {}", address, status);
        }
        Commands::Health {
            attempts,
            interval_secs,
            json,
        } => {
            let connection = connect(global)?;
            connection.api.verify_connectivity()?;
            let check = HealthCheck {
                attempts,
                interval: Duration::from_secs(interval_secs),
            };
            wait_for_healthy(connection.api.as_ref(), connection.clock.as_ref(), &check)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "health",
                    "host": connection.api.host(),
                })));
            }
            println!("{}: healthy", connection.api.host());
        }
    }
    Ok(None)
}

fn handle_from_args(address: ProgramAddress, args: &HandleArgs) -> Result<LifecycleHandle> {
    let run_id = args.run_id.as_deref().map(str::trim).filter(|v| !v.is_empty());
    let token = args.token.as_deref().map(str::trim).filter(|v| !v.is_empty());
    match (run_id, token) {
        (Some(run_id), _) => Ok(LifecycleHandle::for_run(address, run_id)),
        (None, Some(token)) => Ok(LifecycleHandle::pending(address, RunToken::from_raw(token))),
        (None, None) => Err(anyhow!("one of --run-id or --token is required")),
    }
}

fn parse_runtime_args(values: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for raw in values {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid --arg '{}': expected KEY=VALUE", raw))?;
        if key.trim().is_empty() {
            return Err(anyhow!("invalid --arg '{}': key cannot be empty", raw));
        }
        out.insert(key.trim().to_string(), value.to_string());
    }
    Ok(out)
}

fn resolve_bearer_token(token_env: Option<&str>) -> Result<Option<String>> {
    let name = token_env
        .map(str::trim)
        .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("unset"));
    let Some(name) = name else {
        return Ok(None);
    };
    let value = std::env::var(name).map_err(|_| {
        anyhow!(
            "bearer token env var '{}' is not set in current process environment",
            name
        )
    })?;
    Ok(Some(value))
}

fn error_code(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<LifecycleError>() {
        Some(LifecycleError::Ambiguity { .. }) => "ambiguous_run",
        Some(LifecycleError::Timeout { .. }) => "timeout",
        Some(LifecycleError::State { .. }) => "invalid_state",
        Some(LifecycleError::Transport { .. }) => "transport_error",
        Some(LifecycleError::Correlation { .. }) | Some(LifecycleError::Binding { .. }) => {
            "correlation_error"
        }
        None => "command_failed",
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Start { json, .. }
        | Commands::Read { json, .. }
        | Commands::Stop { json, .. }
        | Commands::Exists { json, .. }
        | Commands::ProgramStart { json, .. }
        | Commands::ProgramStop { json, .. }
        | Commands::Health { json, .. } => *json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn start_parses_program_flags_and_runtime_args() {
        let cli = Cli::try_parse_from([
            "runctl",
            "--host",
            "http://cdap:11015",
            "start",
            "--app",
            "clicks",
            "--type",
            "workflows",
            "--name",
            "Nightly",
            "--arg",
            "input=gs://in",
            "--arg",
            "filter=a=b",
            "--json",
        ])
        .expect("parse");
        assert_eq!(cli.global.host.as_deref(), Some("http://cdap:11015"));
        assert!(command_json_mode(&cli.command));
        let Commands::Start { program, args, allow_multiple_runs, .. } = cli.command else {
            panic!("expected start");
        };
        assert!(!allow_multiple_runs);
        let address = program.address().expect("address");
        assert_eq!(address.to_string(), "default/clicks/workflows/Nightly");
        let parsed = parse_runtime_args(&args).expect("args");
        assert_eq!(parsed.get("input").map(String::as_str), Some("gs://in"));
        assert_eq!(parsed.get("filter").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn program_flags_default_to_streaming_pipeline() {
        let cli = Cli::try_parse_from(["runctl", "program-stop", "--app", "clicks"]).expect("parse");
        let Commands::ProgramStop { program, json } = cli.command else {
            panic!("expected program-stop");
        };
        assert!(!json);
        assert_eq!(
            program.address().unwrap(),
            ProgramAddress::streaming("clicks").unwrap()
        );
    }

    #[test]
    fn runtime_args_reject_missing_separator_and_empty_key() {
        assert!(parse_runtime_args(&["novalue".to_string()]).is_err());
        assert!(parse_runtime_args(&[" =v".to_string()]).is_err());
    }

    #[test]
    fn handle_prefers_run_id_over_token() {
        let address = ProgramAddress::streaming("clicks").unwrap();
        let both = HandleArgs {
            run_id: Some("r-1".to_string()),
            token: Some("tok".to_string()),
        };
        assert_eq!(
            handle_from_args(address.clone(), &both).unwrap().run_id(),
            Some("r-1")
        );
        let token_only = HandleArgs {
            run_id: None,
            token: Some("tok".to_string()),
        };
        let handle = handle_from_args(address.clone(), &token_only).unwrap();
        assert!(!handle.is_bound());
        let neither = HandleArgs {
            run_id: Some(" ".to_string()),
            token: None,
        };
        assert!(handle_from_args(address, &neither).is_err());
    }

    #[test]
    fn bearer_token_reads_named_env_var() {
        let key = "RUNCTL_TEST_BEARER_TOKEN";
        let previous = std::env::var(key).ok();
        std::env::set_var(key, "token_123");
        assert_eq!(
            resolve_bearer_token(Some(key)).unwrap().as_deref(),
            Some("token_123")
        );
        assert!(resolve_bearer_token(Some("unset")).unwrap().is_none());
        assert!(resolve_bearer_token(None).unwrap().is_none());
        std::env::remove_var(key);
        let err = resolve_bearer_token(Some(key)).expect_err("missing env");
        assert!(err.to_string().contains("is not set"), "{}", err);
        if let Some(previous) = previous {
            std::env::set_var(key, previous);
        }
    }

    #[test]
    fn error_codes_follow_lifecycle_error_kind() {
        let ambiguous = anyhow::Error::new(LifecycleError::Ambiguity {
            address: "default/clicks/spark/Stream".to_string(),
            status: "RUNNING".to_string(),
        });
        assert_eq!(error_code(&ambiguous), "ambiguous_run");
        assert_eq!(error_code(&anyhow!("boom")), "command_failed");
        let envelope = json_error("timeout", "late".to_string(), json!({}));
        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["error"]["code"], "timeout");
    }
}
