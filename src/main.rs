mod algorithm;
mod backend;
mod config;
mod consts;
mod environment;
mod events;
mod poller;
mod state;
mod submission;
mod task;

use crate::algorithm::SupplementaryFile;
use crate::backend::{Backend, BackendClient};
use crate::config::{get_config_path, Config};
use crate::consts::submission::EVENT_QUEUE_SIZE;
use crate::environment::{Environment, EnvironmentType};
use crate::events::{Event, EventType};
use crate::state::{ApkPayload, Intent, SharedSubmissionState};
use crate::submission::{Orchestrator, SubmissionOutcome};
use crate::task::TaskStatus;
use clap::{ArgAction, Parser, Subcommand};
use log::{debug, warn};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Command-line arguments
struct Args {
    /// Print debug logs
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Default)]
struct EndpointArgs {
    /// Environment to connect to
    #[arg(long, value_enum)]
    env: Option<EnvironmentType>,

    /// Override the upload endpoint
    #[arg(long = "upload-url", value_name = "URL")]
    upload_url: Option<String>,

    /// Override the signal-start endpoint base
    #[arg(long = "signal-start-url", value_name = "URL")]
    signal_start_url: Option<String>,

    /// Override the task-status endpoint base
    #[arg(long = "task-url", value_name = "URL")]
    task_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Upload an APK and run the selected analyses one after another
    Submit {
        /// Path to the APK file
        #[arg(long, value_name = "APK")]
        apk: PathBuf,

        /// Algorithm to run; repeat for several, order is kept
        #[arg(long = "algorithm", short = 'a', value_name = "ID", required = true)]
        algorithms: Vec<String>,

        /// Supplementary file for an algorithm, as ID=PATH
        #[arg(long = "attach", value_name = "ID=PATH")]
        attachments: Vec<String>,

        #[command(flatten)]
        endpoints: EndpointArgs,
    },
    /// Query the status of a backend task
    Status {
        /// Task ID returned when the analysis was started
        task_id: String,

        #[command(flatten)]
        endpoints: EndpointArgs,
    },
    /// List the known algorithms
    Algorithms,
    /// Write a config file with default values
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_path()?,
    };
    debug!("Using config at {}", config_path.display());

    match args.command {
        Command::Submit {
            apk,
            algorithms,
            attachments,
            endpoints,
        } => {
            let config = Config::load_or_default(&config_path)?;
            let environment = resolve_environment(&config, &endpoints)?;
            submit(&config, environment, &apk, &algorithms, &attachments).await
        }
        Command::Status { task_id, endpoints } => {
            let config = Config::load_or_default(&config_path)?;
            let environment = resolve_environment(&config, &endpoints)?;
            let client = BackendClient::new(environment, config.request_timeout())?;
            let report = client.task_status(&task_id).await?;
            println!("Task {}: {} ({})", task_id, report.status(), report.task_status);
            if let Some(reason) = report.reason() {
                println!("{}", reason);
            }
            if report.status() == TaskStatus::Failed {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Algorithms => {
            let config = Config::load_or_default(&config_path)?;
            for spec in config.catalog() {
                println!("{}", spec);
            }
            Ok(())
        }
        Command::InitConfig { force } => {
            if config_path.exists() && !force {
                eprintln!(
                    "Config already exists at {} (use --force to overwrite)",
                    config_path.display()
                );
                std::process::exit(1);
            }
            Config::default().save(&config_path)?;
            println!("Wrote default config to {}", config_path.display());
            Ok(())
        }
    }
}

/// Command line `--env`, then `APK_SUBMIT_ENVIRONMENT`, then the config file.
/// URL overrides from the command line are applied last.
fn resolve_environment(config: &Config, endpoints: &EndpointArgs) -> Result<Environment, Box<dyn Error>> {
    let explicit = match (endpoints.env, std::env::var("APK_SUBMIT_ENVIRONMENT")) {
        (Some(env_type), _) => Some(Environment::new(env_type)),
        (None, Ok(name)) => match name.parse::<Environment>() {
            Ok(environment) => Some(environment),
            Err(()) => return Err(format!("Invalid environment: {}", name).into()),
        },
        (None, Err(_)) => None,
    };

    let environment = config.resolve_environment(explicit)?.with_overrides(
        endpoints.upload_url.as_deref(),
        endpoints.signal_start_url.as_deref(),
        endpoints.task_url.as_deref(),
    );
    debug!("Environment: {}", environment);
    Ok(environment)
}

/// Split `ID=PATH` into its parts.
fn parse_attachment(raw: &str) -> Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((id, path)) if !id.trim().is_empty() && !path.trim().is_empty() => {
            Ok((id.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("Expected ID=PATH, got {:?}", raw)),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Build the session from the command line selections.
fn build_state(
    config: &Config,
    apk: &Path,
    algorithms: &[String],
    attachments: &[String],
) -> Result<SharedSubmissionState, Box<dyn Error>> {
    let mut state = SharedSubmissionState::new(&config.catalog())?;

    state.dispatch(Intent::SetApk(ApkPayload::new(file_name(apk), std::fs::read(apk)?)))?;
    for id in algorithms {
        state.dispatch(Intent::Select(id.clone()))?;
    }
    for raw in attachments {
        let (algorithm_id, path) = parse_attachment(raw)?;
        let file = SupplementaryFile::new(file_name(&path), std::fs::read(&path)?);
        state.dispatch(Intent::AttachFile { algorithm_id, file })?;
    }

    for selection in state.algorithms().iter().filter(|a| a.selected) {
        if !selection.requires_additional_input {
            warn!(
                "{} takes no supplementary file and is not started by this flow",
                selection.name
            );
        }
    }
    Ok(state)
}

async fn submit(
    config: &Config,
    environment: Environment,
    apk: &Path,
    algorithms: &[String],
    attachments: &[String],
) -> Result<(), Box<dyn Error>> {
    let mut state = build_state(config, apk, algorithms, attachments)?;
    let client = Arc::new(BackendClient::new(environment, config.request_timeout())?);

    let (event_sender, mut event_receiver) = mpsc::channel::<Event>(EVENT_QUEUE_SIZE);
    let (shutdown_sender, shutdown_receiver) = broadcast::channel(1);

    let mut orchestrator = Orchestrator::new(client.clone(), config.poll_policy())
        .with_events(event_sender)
        .with_shutdown(shutdown_receiver);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_receiver.recv().await {
            if event.event_type == EventType::Error {
                eprintln!("{}", event);
            } else {
                println!("{}", event);
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_sender.send(());
        }
    });

    let outcome = orchestrator.run(&mut state).await;
    drop(orchestrator);
    let _ = printer.await;

    match outcome {
        SubmissionOutcome::Done { completed } => {
            println!("{} ({} started)", state.progress_message(), completed);
            Ok(())
        }
        SubmissionOutcome::Cancelled => {
            println!(
                "Cancelled after {} analyses ({})",
                state.algorithms_complete(),
                state.phase()
            );
            std::process::exit(130);
        }
        SubmissionOutcome::Failed(err) => {
            eprintln!("Submission failed: {}", err);
            match err.backend_error() {
                Some(source) => match (source.status(), source.to_pretty()) {
                    (Some(status), Some(message)) => {
                        eprintln!("Backend answered {}: {}", status, message)
                    }
                    (Some(status), None) => eprintln!("Backend answered {}", status),
                    (None, _) => {
                        eprintln!(
                            "Check that the analysis backend is reachable ({}).",
                            client.environment().upload_url
                        )
                    }
                },
                None => debug!("Session {} stopped in phase {}", state.session_id(), state.phase()),
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attachment() {
        assert_eq!(
            parse_attachment("gifdroid=./trace.gif").unwrap(),
            ("gifdroid".to_string(), PathBuf::from("./trace.gif"))
        );
        assert_eq!(
            parse_attachment("uichecker = /tmp/a=b.json").unwrap(),
            ("uichecker".to_string(), PathBuf::from("/tmp/a=b.json"))
        );
        assert!(parse_attachment("gifdroid").is_err());
        assert!(parse_attachment("=trace.gif").is_err());
    }

    #[test]
    fn test_build_state_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        let gif = dir.path().join("trace.gif");
        std::fs::write(&apk, b"PK").unwrap();
        std::fs::write(&gif, b"GIF89a").unwrap();

        let state = build_state(
            &Config::default(),
            &apk,
            &["gifdroid".to_string()],
            &[format!("gifdroid={}", gif.display())],
        )
        .unwrap();

        assert_eq!(state.apk().unwrap().file_name, "app.apk");
        assert!(state.ready_to_submit());
        let gifdroid = state.algorithm("gifdroid").unwrap();
        assert_eq!(gifdroid.primary_file().unwrap().name, "trace.gif");
    }

    #[test]
    fn test_build_state_rejects_wrong_file_type() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        let txt = dir.path().join("notes.txt");
        std::fs::write(&apk, b"PK").unwrap();
        std::fs::write(&txt, b"hello").unwrap();

        let result = build_state(
            &Config::default(),
            &apk,
            &["gifdroid".to_string()],
            &[format!("gifdroid={}", txt.display())],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_endpoint_overrides_apply_last() {
        let endpoints = EndpointArgs {
            env: Some(EnvironmentType::Docker),
            task_url: Some("http://tasks.local/task".to_string()),
            ..EndpointArgs::default()
        };
        let environment = resolve_environment(&Config::default(), &endpoints).unwrap();
        assert_eq!(environment.upload_url, "http://host.docker.internal:5005/upload");
        assert_eq!(environment.task_url, "http://tasks.local/task");
    }

    #[test]
    fn test_env_flag_takes_environment_names() {
        let args = Args::try_parse_from(["apk-submit", "status", "t-1", "--env", "prod"]).unwrap();
        match args.command {
            Command::Status { task_id, endpoints } => {
                assert_eq!(task_id, "t-1");
                assert_eq!(endpoints.env, Some(EnvironmentType::Production));
            }
            _ => panic!("expected status command"),
        }
        assert!(Args::try_parse_from(["apk-submit", "status", "t-1", "--env", "moon"]).is_err());
    }
}
