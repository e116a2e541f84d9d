use appcenter_actions::client::AppCenterClient;
use appcenter_actions::error::{AppCenterError, Result};
use appcenter_actions::event::{BuildTrigger, EVENT_PATH_VAR, load_event};
use appcenter_actions::logging::{FileLogger, setup_logging};
use appcenter_actions::runner::{BuildDispatcher, FanOutRunner, WebhookDispatcher};
use appcenter_actions::{ActionConfig, PlatformConfig, load_config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

/// Fan out App Center calls to every app of an organization
#[derive(Debug, Parser)]
#[command(name = "appcenter-actions", version, about)]
struct Cli {
    /// App Center API token
    #[arg(long, global = true, env = "INPUT_APPCENTER-TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Organization owning the apps
    #[arg(long = "company-name", global = true, env = "INPUT_COMPANY-NAME")]
    company_name: Option<String>,

    /// Optional TOML file overriding the platform endpoints and headers
    #[arg(long, global = true, env = "APPCENTER_CONFIG")]
    config: Option<PathBuf>,

    /// Push event payload written by the runner
    #[arg(long = "event-path", global = true, env = "GITHUB_EVENT_PATH")]
    event_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Trigger a build of the pushed branch for every app
    Build {
        /// Used when the event has no `ref`
        #[arg(long = "ref", env = "GITHUB_REF")]
        git_ref: Option<String>,

        /// Used when the event has no `head_commit.id`
        #[arg(long, env = "GITHUB_SHA")]
        commit: Option<String>,
    },
    /// Forward the push payload, signed, to every app's webhook
    Webhook,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let platform = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Configuration error: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => PlatformConfig::default(),
    };

    let file_logger = platform
        .log_directory
        .clone()
        .map(|dir| FileLogger::new(dir).with_rotation(platform.log_rotation));
    // Dropping the guard flushes the file log, so it lives until main returns
    let _guard = match setup_logging(file_logger.as_ref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, platform).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, platform: PlatformConfig) -> Result<ExitCode> {
    let config = ActionConfig::new(
        cli.token.unwrap_or_default(),
        cli.company_name.unwrap_or_default(),
    )?;
    let extra_headers = platform.extra_header_map()?;
    let payload = match &cli.event_path {
        Some(path) => Some(load_event(path)?),
        None => None,
    };

    info!("Using App Center at {}", platform.base_url);
    let client = AppCenterClient::new(platform)?;
    let runner = FanOutRunner::new(client, config);

    let outcome = match cli.command {
        Command::Build { git_ref, commit } => {
            let trigger =
                BuildTrigger::resolve(payload.as_ref(), git_ref.as_deref(), commit.as_deref())?;
            info!(
                "Triggering builds of branch '{}' at {}",
                trigger.branch, trigger.source_version
            );
            runner.run(BuildDispatcher::new(trigger, extra_headers)).await
        }
        Command::Webhook => {
            let payload = payload.ok_or_else(|| {
                AppCenterError::ConfigError(format!(
                    "Forwarding a webhook needs the event payload ({})",
                    EVENT_PATH_VAR
                ))
            })?;
            runner.run(WebhookDispatcher::new(payload, extra_headers)).await
        }
    };

    // Listing failures are logged by the runner; per-app failures never fail the run
    match outcome {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(_) => Ok(ExitCode::FAILURE),
    }
}
