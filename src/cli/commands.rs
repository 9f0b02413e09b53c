//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::docker::{DEFAULT_API_VERSION, DEFAULT_DOCKER_HOST, DockerSettings};

/// Stackctl - Declarative stack deployment for Docker Swarm.
#[derive(Parser, Debug)]
#[command(name = "stackctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Docker daemon connection.
    #[command(flatten)]
    pub daemon: DaemonArgs,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Docker daemon connection settings.
#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
    /// Daemon address (tcp://, http:// or https://).
    #[arg(short = 'H', long, global = true, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub host: String,

    /// Engine API version.
    #[arg(long, global = true, env = "DOCKER_API_VERSION", default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Use TLS and verify the daemon certificate.
    #[arg(
        long,
        global = true,
        env = "DOCKER_TLS_VERIFY",
        action = clap::ArgAction::Set,
        value_parser = parse_flag,
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub tls_verify: bool,

    /// Directory holding ca.pem, cert.pem and key.pem.
    #[arg(long, global = true, env = "DOCKER_CERT_PATH")]
    pub cert_path: Option<PathBuf>,

    /// Overall time limit for the command, in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

impl DaemonArgs {
    /// Converts the arguments into client settings.
    #[must_use]
    pub fn settings(&self) -> DockerSettings {
        DockerSettings {
            host: self.host.clone(),
            api_version: self.api_version.clone(),
            tls_verify: self.tls_verify,
            cert_path: self.cert_path.clone(),
            ..DockerSettings::default()
        }
    }
}

/// Accepts the values Docker uses for boolean environment variables.
fn parse_flag(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(format!("invalid boolean value: {other}")),
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy a new stack or update an existing one.
    Deploy {
        /// Path to the compose file.
        #[arg(short = 'c', long = "compose-file", env = "STACKCTL_COMPOSE_FILE")]
        compose_file: Option<PathBuf>,

        /// Remove services that are no longer referenced.
        #[arg(long)]
        prune: bool,

        /// Send registry authentication details to swarm agents.
        #[arg(long)]
        with_registry_auth: bool,

        /// Stack name.
        namespace: String,
    },

    /// Remove one or more stacks.
    #[command(alias = "remove", alias = "down")]
    Rm {
        /// Stack names.
        #[arg(required = true)]
        namespaces: Vec<String>,
    },

    /// List stacks.
    #[command(alias = "list")]
    Ls,

    /// List the services of a stack.
    Services {
        /// Stack name.
        namespace: String,
    },

    /// Validate a compose file and show what it resolves to.
    Validate {
        /// Path to the compose file.
        #[arg(short = 'c', long = "compose-file", env = "STACKCTL_COMPOSE_FILE")]
        compose_file: Option<PathBuf>,

        /// Stack name used for resolved names.
        #[arg(default_value = "stack")]
        namespace: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
