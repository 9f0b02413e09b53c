//! stackctl CLI entrypoint.
//!
//! This is the main entrypoint for the stackctl command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use stackctl::cli::{Cli, Commands, DaemonArgs, OutputFormat, OutputFormatter};
use stackctl::config::{ConfigParser, LoadedConfig, find_config_file};
use stackctl::docker::{DockerClient, DockerConfigAuth, StackObserver};
use stackctl::error::{Result, StackError};
use stackctl::namespace::Namespace;
use stackctl::reconciler::{DeployOptions, StackDeployer, StackRemover};
use stackctl::resolver::{DesiredStackSpec, resolve};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.output == OutputFormat::Json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr so that stdout only carries command output.
fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let cancel = cancellation(cli.daemon.timeout);

    match cli.command {
        Commands::Deploy {
            compose_file,
            prune,
            with_registry_auth,
            namespace,
        } => {
            let options = DeployOptions {
                prune,
                send_registry_auth: with_registry_auth,
            };
            cmd_deploy(
                &cli.daemon,
                compose_file.as_ref(),
                &namespace,
                options,
                cancel,
                &formatter,
            )
            .await
        }
        Commands::Rm { namespaces } => cmd_rm(&cli.daemon, &namespaces, cancel, &formatter).await,
        Commands::Ls => cmd_ls(&cli.daemon, &formatter).await,
        Commands::Services { namespace } => {
            cmd_services(&cli.daemon, &namespace, &formatter).await
        }
        Commands::Validate {
            compose_file,
            namespace,
        } => cmd_validate(compose_file.as_ref(), &namespace, &formatter),
    }
}

/// Deploys or updates a stack.
async fn cmd_deploy(
    daemon: &DaemonArgs,
    compose_file: Option<&PathBuf>,
    namespace: &str,
    options: DeployOptions,
    cancel: CancellationToken,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let namespace = Namespace::parse(namespace)?;
    let (_config, desired) = load_stack(compose_file, &namespace)?;

    let client = DockerClient::new(&daemon.settings())?;
    let auth = if options.send_registry_auth {
        let auth = DockerConfigAuth::from_env().ok_or_else(|| {
            StackError::internal("Cannot locate the Docker configuration directory")
        })?;
        Some(auth)
    } else {
        None
    };

    let mut deployer = StackDeployer::new(&client).with_cancellation(cancel);
    if let Some(auth) = auth.as_ref() {
        deployer = deployer.with_registry_auth(auth);
    }

    let report = deployer.deploy(&namespace, &desired, options).await?;
    print_output(&formatter.format_deploy(&report))?;

    if report.prune_failed() {
        error!("Some services of stack {namespace} could not be pruned");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Removes one or more stacks.
async fn cmd_rm(
    daemon: &DaemonArgs,
    namespaces: &[String],
    cancel: CancellationToken,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let namespaces = namespaces
        .iter()
        .map(|name| Namespace::parse(name))
        .collect::<Result<Vec<_>>>()?;

    let client = DockerClient::new(&daemon.settings())?;
    let remover = StackRemover::new(&client).with_cancellation(cancel);

    let mut failed = false;
    for namespace in &namespaces {
        let report = remover.remove(namespace).await?;
        print_output(&formatter.format_teardown(&report))?;
        failed |= report.had_failures();
    }

    if failed {
        error!("Failed to remove some resources");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Lists stacks.
async fn cmd_ls(daemon: &DaemonArgs, formatter: &OutputFormatter) -> Result<ExitCode> {
    let client = DockerClient::new(&daemon.settings())?;
    let stacks = StackObserver::new(&client).list_stacks().await?;
    print_output(&formatter.format_stacks(&stacks))?;
    Ok(ExitCode::SUCCESS)
}

/// Lists the services of a stack.
async fn cmd_services(
    daemon: &DaemonArgs,
    namespace: &str,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let namespace = Namespace::parse(namespace)?;
    let client = DockerClient::new(&daemon.settings())?;
    let services = StackObserver::new(&client)
        .stack_services(&namespace)
        .await?;

    if services.is_empty() {
        warn!("Nothing found in stack: {namespace}");
    }
    print_output(&formatter.format_services(&services))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates a compose file without contacting the cluster.
fn cmd_validate(
    compose_file: Option<&PathBuf>,
    namespace: &str,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let namespace = Namespace::parse(namespace)?;
    let (config, desired) = load_stack(compose_file, &namespace)?;
    print_output(&formatter.format_validation(&config, &desired))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads a compose file and resolves it for a stack.
fn load_stack(
    compose_file: Option<&PathBuf>,
    namespace: &Namespace,
) -> Result<(LoadedConfig, DesiredStackSpec)> {
    let config_file = compose_file.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))?;
    debug!("Loading compose file from: {}", config_file.display());

    let parser = ConfigParser::new()
        .with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")))
        .with_process_environment()
        .load_dotenv()?;

    let config = parser.load_file(&config_file)?;
    let desired = resolve(&config, namespace)?;
    Ok((config, desired))
}

/// Builds the token that stops long-running commands.
///
/// It fires on Ctrl-C, or once the `--timeout` has elapsed.
fn cancellation(timeout: Option<u64>) -> CancellationToken {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current operation");
            on_signal.cancel();
        }
    });

    if let Some(secs) = timeout {
        let on_timeout = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timed out after {secs}s, stopping after the current operation");
            on_timeout.cancel();
        });
    }

    cancel
}

/// Writes command output to stdout.
fn print_output(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
