//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::LoadedConfig;
use crate::docker::types::Service;
use crate::docker::{LiveResource, StackSummary};
use crate::reconciler::{DeployReport, RemovalOutcome, TeardownReport};
use crate::resolver::DesiredStackSpec;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Stack row for table display.
#[derive(Tabled)]
struct StackRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "SERVICES")]
    services: usize,
}

/// Service row for table display.
#[derive(Tabled, Serialize)]
struct ServiceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "REPLICAS")]
    replicas: String,
    #[tabled(rename = "IMAGE")]
    image: String,
}

impl From<&Service> for ServiceRow {
    fn from(service: &Service) -> Self {
        let (mode, replicas) = match &service.spec.mode {
            Some(mode) if mode.global.is_some() => ("global", "-".to_string()),
            Some(mode) => (
                "replicated",
                mode.replicated
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |r| r.replicas.to_string()),
            ),
            None => ("replicated", "-".to_string()),
        };
        Self {
            id: service.id.clone(),
            name: service.spec.name.clone(),
            mode: mode.to_string(),
            replicas,
            image: service.spec.task_template.container_spec.image.clone(),
        }
    }
}

/// Resolved resource row for table display.
#[derive(Tabled)]
struct ResolvedRow {
    #[tabled(rename = "KIND")]
    kind: &'static str,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "DETAIL")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the result of a deploy.
    #[must_use]
    pub fn format_deploy(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_text(report),
        }
    }

    fn format_deploy_text(report: &DeployReport) -> String {
        let mut output = String::new();

        if report.created.is_empty() && report.updated.is_empty() && report.pruned.removed.is_empty()
        {
            let _ = writeln!(output, "Stack {} has no resources", report.namespace);
        }
        for resource in &report.created {
            let _ = writeln!(output, "{} {}", "Creating".green(), Self::describe(resource));
        }
        for resource in &report.updated {
            let _ = writeln!(output, "{} {}", "Updating".yellow(), Self::describe(resource));
        }
        Self::write_removals(&mut output, &report.pruned);

        for warning in &report.warnings {
            let _ = writeln!(output, "{} {warning}", "warning:".yellow());
        }

        let _ = write!(
            output,
            "\nStack {}: {} created, {} updated, {} pruned",
            report.namespace,
            report.created.len().to_string().green(),
            report.updated.len().to_string().yellow(),
            report.pruned.removed.len().to_string().red()
        );
        if report.prune_failed() {
            let _ = write!(
                output,
                " ({} could not be pruned)",
                report.pruned.failed.len()
            );
        }
        output.push('\n');
        output
    }

    /// Formats the result of removing a stack.
    #[must_use]
    pub fn format_teardown(&self, report: &TeardownReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => {
                if report.is_empty() {
                    return format!("Nothing found in stack: {}\n", report.namespace);
                }
                let mut output = String::new();
                Self::write_removals(&mut output, &report.outcome);
                output
            }
        }
    }

    fn write_removals(output: &mut String, outcome: &RemovalOutcome) {
        for resource in &outcome.removed {
            let _ = writeln!(output, "{} {}", "Removing".red(), Self::describe(resource));
        }
        for failure in &outcome.failed {
            let _ = writeln!(
                output,
                "{} {}: {}",
                "Failed to remove".red().bold(),
                Self::describe(&failure.resource),
                failure.reason
            );
        }
    }

    /// Formats the list of stacks.
    #[must_use]
    pub fn format_stacks(&self, stacks: &[StackSummary]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(stacks).unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<StackRow> = stacks
                    .iter()
                    .map(|s| StackRow {
                        name: s.name.clone(),
                        services: s.services,
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats the services of a stack.
    #[must_use]
    pub fn format_services(&self, services: &[Service]) -> String {
        let rows: Vec<ServiceRow> = services.iter().map(ServiceRow::from).collect();
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&rows).unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<ServiceRow> = rows
                    .into_iter()
                    .map(|row| ServiceRow {
                        id: Self::truncate(&row.id, 12),
                        image: Self::truncate(&row.image, 40),
                        ..row
                    })
                    .collect();
                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Formats what a compose file resolves to, along with its warnings.
    #[must_use]
    pub fn format_validation(&self, config: &LoadedConfig, desired: &DesiredStackSpec) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = ValidationJson {
                    valid: true,
                    warnings: config.warnings.iter().map(ToString::to_string).collect(),
                    notes: &config.notes,
                    desired,
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_validation_text(config, desired),
        }
    }

    fn format_validation_text(config: &LoadedConfig, desired: &DesiredStackSpec) -> String {
        let mut output = String::new();

        for warning in &config.warnings {
            let _ = writeln!(output, "{} {warning}", "warning:".yellow());
        }
        for note in &config.notes {
            let _ = writeln!(output, "{} {note}", "note:".dimmed());
        }

        let mut rows: Vec<ResolvedRow> = Vec::new();
        rows.extend(desired.services.iter().map(|s| ResolvedRow {
            kind: "service",
            name: s.name().to_string(),
            detail: s.image().to_string(),
        }));
        rows.extend(desired.networks.iter().map(|n| ResolvedRow {
            kind: "network",
            name: n.name.clone(),
            detail: n
                .driver
                .clone()
                .unwrap_or_else(|| crate::resolver::DEFAULT_NETWORK_DRIVER.to_string()),
        }));
        rows.extend(desired.external_networks.iter().map(|n| ResolvedRow {
            kind: "network",
            name: n.name.clone(),
            detail: "external".to_string(),
        }));
        rows.extend(desired.secrets.iter().map(|s| ResolvedRow {
            kind: "secret",
            name: s.name.clone(),
            detail: format!("{} bytes", s.data.len()),
        }));

        let _ = writeln!(output, "{} Compose file is valid", "ok:".green());
        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }
        output
    }

    fn describe(resource: &LiveResource) -> String {
        format!("{} {}", resource.kind, resource.name)
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    valid: bool,
    warnings: Vec<String>,
    notes: &'a [String],
    desired: &'a DesiredStackSpec,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::types::{
        ContainerSpec, GlobalService, ReplicatedService, ServiceMode, SwarmServiceSpec,
        TaskTemplate,
    };
    use crate::docker::{ResourceKind, Version};
    use crate::reconciler::RemovalFailure;
    use chrono::Utc;

    fn live(kind: ResourceKind, name: &str) -> LiveResource {
        LiveResource {
            kind,
            id: format!("{name}-id"),
            name: name.to_string(),
        }
    }

    fn service(name: &str, mode: Option<ServiceMode>) -> Service {
        Service {
            id: "0123456789abcdef0123".to_string(),
            version: Version { index: 3 },
            spec: SwarmServiceSpec {
                name: name.to_string(),
                mode,
                task_template: TaskTemplate {
                    container_spec: ContainerSpec {
                        image: "nginx:alpine".to_string(),
                        ..ContainerSpec::default()
                    },
                    ..TaskTemplate::default()
                },
                ..SwarmServiceSpec::default()
            },
        }
    }

    fn report() -> DeployReport {
        DeployReport {
            namespace: "shop".to_string(),
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            created: vec![live(ResourceKind::Network, "shop_default")],
            updated: vec![live(ResourceKind::Service, "shop_web")],
            pruned: RemovalOutcome {
                removed: vec![live(ResourceKind::Service, "shop_old")],
                failed: vec![RemovalFailure {
                    resource: live(ResourceKind::Service, "shop_stuck"),
                    reason: "in use".to_string(),
                }],
            },
            warnings: vec!["shop_web: image could not be pinned".to_string()],
        }
    }

    #[test]
    fn test_deploy_text() {
        let output = OutputFormatter::new(OutputFormat::Text).format_deploy(&report());
        assert!(output.contains("network shop_default"));
        assert!(output.contains("service shop_web"));
        assert!(output.contains("service shop_old"));
        assert!(output.contains("service shop_stuck: in use"));
        assert!(output.contains("image could not be pinned"));
        assert!(output.contains("could not be pruned"));
    }

    #[test]
    fn test_deploy_json() {
        let output = OutputFormatter::new(OutputFormat::Json).format_deploy(&report());
        let value: serde_json::Value = serde_json::from_str(&output).expect("json");
        assert_eq!(value["namespace"], "shop");
        assert_eq!(value["created"][0]["name"], "shop_default");
        assert_eq!(value["pruned"]["failed"][0]["reason"], "in use");
    }

    #[test]
    fn test_empty_teardown() {
        let report = TeardownReport {
            namespace: "ghost".to_string(),
            finished_at: Utc::now(),
            outcome: RemovalOutcome::default(),
        };
        let output = OutputFormatter::new(OutputFormat::Text).format_teardown(&report);
        assert_eq!(output, "Nothing found in stack: ghost\n");
    }

    #[test]
    fn test_stacks_table() {
        let stacks = vec![StackSummary {
            name: "shop".to_string(),
            services: 2,
        }];
        let output = OutputFormatter::new(OutputFormat::Text).format_stacks(&stacks);
        assert!(output.contains("NAME"));
        assert!(output.contains("shop"));

        let json = OutputFormatter::new(OutputFormat::Json).format_stacks(&stacks);
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value[0]["services"], 2);
    }

    #[test]
    fn test_service_rows() {
        let replicated = service(
            "shop_web",
            Some(ServiceMode {
                replicated: Some(ReplicatedService { replicas: 3 }),
                global: None,
            }),
        );
        let global = service(
            "shop_agent",
            Some(ServiceMode {
                replicated: None,
                global: Some(GlobalService {}),
            }),
        );

        let row = ServiceRow::from(&replicated);
        assert_eq!(row.mode, "replicated");
        assert_eq!(row.replicas, "3");
        assert_eq!(row.image, "nginx:alpine");
        assert_eq!(ServiceRow::from(&global).mode, "global");

        let output =
            OutputFormatter::new(OutputFormat::Text).format_services(&[replicated, global]);
        assert!(output.contains("012345678..."));
        assert!(output.contains("shop_agent"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("abcdefghij", 6), "abc...");
    }
}
