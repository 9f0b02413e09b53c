//! Compose document validation.
//!
//! Validation runs in two passes. The property pass walks the raw YAML tree
//! and sorts service properties into forbidden (fatal), unsupported and
//! deprecated (both reported as warnings). The structural pass checks the
//! typed document for consistency before anything is sent to the cluster.

use crate::error::{ConfigError, Result};
use serde::Serialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::spec::{ComposeFile, ServiceConfig, external_name};

/// Service properties that make the document undeployable.
const FORBIDDEN_SERVICE_PROPERTIES: &[(&str, &str)] = &[
    ("extends", "Support for `extends` is not implemented yet."),
    (
        "volume_driver",
        "Instead of setting the volume driver on the service, define a volume using the top-level `volumes` option and specify the driver there.",
    ),
    (
        "volumes_from",
        "To share a volume between services, define it using the top-level `volumes` option and reference it from each service that shares it using the service-level `volumes` option.",
    ),
    ("cpu_quota", "Set resource limits using deploy.resources"),
    ("cpu_shares", "Set resource limits using deploy.resources"),
    ("cpuset", "Set resource limits using deploy.resources"),
    ("mem_limit", "Set resource limits using deploy.resources"),
    ("memswap_limit", "Set resource limits using deploy.resources"),
];

/// Service properties that are ignored when deploying to a swarm.
const UNSUPPORTED_SERVICE_PROPERTIES: &[&str] = &[
    "build",
    "cap_add",
    "cap_drop",
    "cgroup_parent",
    "devices",
    "domainname",
    "external_links",
    "ipc",
    "links",
    "mac_address",
    "network_mode",
    "privileged",
    "read_only",
    "restart",
    "security_opt",
    "shm_size",
    "sysctls",
    "tmpfs",
    "ulimits",
    "userns_mode",
];

/// Service properties that still parse but should no longer be used.
const DEPRECATED_SERVICE_PROPERTIES: &[(&str, &str)] = &[
    ("container_name", "Setting the container name is not supported."),
    (
        "expose",
        "Exposing ports is unnecessary, services on the same network can access each other's containers on any port.",
    ),
];

/// Top-level sections whose entries may use the legacy `external: {name: ...}` form.
const EXTERNAL_NAME_SECTIONS: &[&str] = &["networks", "volumes", "secrets"];

/// A non-fatal finding about the document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyWarning {
    /// A property that has no effect on a swarm.
    Unsupported {
        /// Property name.
        property: String,
    },
    /// A property that is deprecated.
    Deprecated {
        /// Property name or path.
        property: String,
        /// What to do instead.
        description: String,
    },
    /// An interpolated variable that is not set.
    UnsetVariable {
        /// Variable name.
        name: String,
    },
}

impl fmt::Display for PropertyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported { property } => write!(f, "Ignoring unsupported option: {property}"),
            Self::Deprecated {
                property,
                description,
            } => write!(f, "Ignoring deprecated option: {property}: {description}"),
            Self::UnsetVariable { name } => write!(
                f,
                "The {name} variable is not set. Defaulting to a blank string."
            ),
        }
    }
}

/// Validator for compose documents.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all findings.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies the service properties of a raw document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ForbiddenProperties`] if any service uses a
    /// forbidden property.
    pub fn check_properties(&self, document: &Value) -> Result<Vec<PropertyWarning>> {
        let mut forbidden: BTreeMap<&str, &str> = BTreeMap::new();
        let mut unsupported: BTreeSet<&str> = BTreeSet::new();
        let mut warnings = BTreeSet::new();

        for service in mapping_values(document.get("services")) {
            for key in mapping_keys(service) {
                if let Some((name, hint)) =
                    FORBIDDEN_SERVICE_PROPERTIES.iter().find(|(name, _)| *name == key)
                {
                    forbidden.insert(*name, *hint);
                } else if let Some(name) =
                    UNSUPPORTED_SERVICE_PROPERTIES.iter().find(|name| **name == key)
                {
                    unsupported.insert(*name);
                } else if let Some((name, description)) =
                    DEPRECATED_SERVICE_PROPERTIES.iter().find(|(name, _)| *name == key)
                {
                    warnings.insert(PropertyWarning::Deprecated {
                        property: (*name).to_string(),
                        description: (*description).to_string(),
                    });
                }
            }
        }

        if !forbidden.is_empty() {
            let properties = forbidden
                .iter()
                .map(|(name, hint)| format!("{name}: {hint}"))
                .collect::<Vec<_>>()
                .join("\n\n");
            return Err(ConfigError::ForbiddenProperties { properties }.into());
        }

        for section in EXTERNAL_NAME_SECTIONS {
            let Some(entries) = document.get(*section).and_then(Value::as_mapping) else {
                continue;
            };
            for (key, entry) in entries {
                let legacy = entry
                    .get("external")
                    .and_then(|external| external.get("name"))
                    .is_some();
                if legacy {
                    let name = key.as_str().unwrap_or_default();
                    warnings.insert(PropertyWarning::Deprecated {
                        property: format!("{section}.{name}.external.name"),
                        description: "Use the `name` field together with `external: true` instead."
                            .to_string(),
                    });
                }
            }
        }

        warnings.extend(unsupported.into_iter().map(|property| {
            PropertyWarning::Unsupported {
                property: property.to_string(),
            }
        }));

        Ok(warnings.into_iter().collect())
    }

    /// Validates a typed compose document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedVersion`] for non-3.x documents and
    /// the first [`ConfigError::ValidationError`] found otherwise.
    pub fn validate(&self, file: &ComposeFile) -> Result<ValidationResult> {
        Self::validate_version(file.version.as_deref())?;

        let mut result = ValidationResult::default();
        Self::validate_networks(file, &mut result);
        Self::validate_secrets(file, &mut result);
        Self::validate_volumes(file, &mut result);

        if file.services.is_empty() {
            result.warnings.push("No services defined in the compose file".to_string());
        }
        for (name, service) in &file.services {
            Self::validate_service(file, name, service, &mut result);
        }

        if result.errors.is_empty() {
            debug!("Compose file validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into())
        }
    }

    fn validate_version(version: Option<&str>) -> Result<()> {
        let Some(version) = version.filter(|v| !v.is_empty()) else {
            return Ok(());
        };

        let (major, minor) = version.split_once('.').unwrap_or((version, "0"));
        if major == "3" && !minor.is_empty() && minor.chars().all(|c| c.is_ascii_digit()) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedVersion {
                version: version.to_string(),
            }
            .into())
        }
    }

    fn validate_networks(file: &ComposeFile, result: &mut ValidationResult) {
        for (name, network) in &file.networks {
            let field = format!("networks.{name}");
            if !is_valid_name(name) {
                result.push_error(&field, format!("Invalid network name: {name}"));
            }

            let Some(network) = network else { continue };
            let is_external = network.external.as_ref().is_some_and(|e| e.is_external());
            if is_external
                && (network.driver.is_some() || !network.driver_opts.is_empty() || network.ipam.is_some())
            {
                result.push_error(
                    &field,
                    format!("conflicting parameters \"external\" and \"driver\" specified for network \"{name}\""),
                );
            }
        }
    }

    fn validate_secrets(file: &ComposeFile, result: &mut ValidationResult) {
        for (name, secret) in &file.secrets {
            let field = format!("secrets.{name}");
            if !is_valid_name(name) {
                result.push_error(&field, format!("Invalid secret name: {name}"));
            }

            let is_external = secret.external.as_ref().is_some_and(|e| e.is_external());
            let sources = usize::from(secret.file.is_some()) + usize::from(secret.environment.is_some());
            if is_external {
                if sources > 0 {
                    result.push_error(
                        &field,
                        format!("External secret \"{name}\" cannot declare a file or environment source"),
                    );
                }
            } else if sources != 1 {
                result.push_error(
                    &field,
                    format!("Secret \"{name}\" must declare exactly one of `file` or `environment`"),
                );
            }
        }
    }

    fn validate_volumes(file: &ComposeFile, result: &mut ValidationResult) {
        for (name, volume) in &file.volumes {
            if !is_valid_name(name) {
                result.push_error(&format!("volumes.{name}"), format!("Invalid volume name: {name}"));
            }
            let external = volume
                .as_ref()
                .and_then(|v| external_name(name, v.external.as_ref(), v.name.as_deref()));
            if external.is_some() && volume.as_ref().is_some_and(|v| v.driver.is_some()) {
                result.push_error(
                    &format!("volumes.{name}"),
                    format!("conflicting parameters \"external\" and \"driver\" specified for volume \"{name}\""),
                );
            }
        }
    }

    fn validate_service(
        file: &ComposeFile,
        name: &str,
        service: &ServiceConfig,
        result: &mut ValidationResult,
    ) {
        let field = format!("services.{name}");

        if !is_valid_name(name) {
            result.push_error(&field, format!("Invalid service name: {name}"));
        }

        if service.image.trim().is_empty() {
            result.push_error(&format!("{field}.image"), format!("Service \"{name}\" has no image"));
        }

        for network in service.networks.names() {
            if network != super::DEFAULT_NETWORK && !file.networks.contains_key(network) {
                result.push_error(
                    &format!("{field}.networks"),
                    format!("Service \"{name}\" uses an undefined network \"{network}\""),
                );
            }
        }

        for secret in &service.secrets {
            if !file.secrets.contains_key(secret.source()) {
                result.push_error(
                    &format!("{field}.secrets"),
                    format!("Service \"{name}\" uses an undefined secret \"{}\"", secret.source()),
                );
            }
        }

        for volume in &service.volumes {
            if let Some(source) = named_volume_source(volume) {
                if !file.volumes.contains_key(source) {
                    result.push_error(
                        &format!("{field}.volumes"),
                        format!("Service \"{name}\" uses an undefined volume \"{source}\""),
                    );
                }
            }
        }

        if let Some(deploy) = &service.deploy {
            match deploy.mode.as_deref() {
                None | Some("replicated") => {}
                Some("global") => {
                    if deploy.replicas.is_some() {
                        result.push_error(
                            &format!("{field}.deploy.replicas"),
                            format!("Service \"{name}\" sets replicas in global mode"),
                        );
                    }
                }
                Some(other) => result.push_error(
                    &format!("{field}.deploy.mode"),
                    format!("Unknown deploy mode \"{other}\" for service \"{name}\""),
                ),
            }

            if let Some(mode) = deploy.endpoint_mode.as_deref() {
                if mode != "vip" && mode != "dnsrr" {
                    result.push_error(
                        &format!("{field}.deploy.endpoint_mode"),
                        format!("Unknown endpoint mode \"{mode}\" for service \"{name}\""),
                    );
                }
            }
        }
    }
}

fn mapping_values(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_mapping)
        .into_iter()
        .flat_map(serde_yaml::Mapping::values)
}

fn mapping_keys(value: &Value) -> impl Iterator<Item = &str> {
    value
        .as_mapping()
        .into_iter()
        .flat_map(|mapping| mapping.keys().filter_map(Value::as_str))
}

/// Returns the volume name of a short-syntax mount, or `None` for bind mounts
/// and anonymous volumes.
#[must_use]
pub fn named_volume_source(mount: &str) -> Option<&str> {
    let (source, _) = mount.split_once(':')?;
    let is_path = source.is_empty()
        || source.starts_with('/')
        || source.starts_with('.')
        || source.starts_with('~');
    (!is_path).then_some(source)
}

/// Object names must start with a letter or digit and contain only letters,
/// digits, `_`, `.` and `-`.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    fn push_error(&mut self, field: &str, message: String) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            message,
        });
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
