//! Compose file loading.
//!
//! Loading is a pipeline: read the file, parse it into an untyped YAML tree,
//! classify properties, interpolate variables, deserialize into typed
//! structures, validate, and finally read secret payloads from disk or the
//! environment. Everything downstream works on the resulting
//! [`LoadedConfig`] without further I/O.

use crate::error::{ConfigError, Result, StackError};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::interpolate::Interpolator;
use super::spec::{ComposeFile, external_name};
use super::validator::{ConfigValidator, PropertyWarning};

/// A loaded, validated compose document.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// The typed document.
    pub file: ComposeFile,
    /// Property and interpolation warnings, sorted.
    pub warnings: Vec<PropertyWarning>,
    /// Structural validation warnings.
    pub notes: Vec<String>,
    /// Secret payloads keyed by internal secret name.
    pub secret_payloads: BTreeMap<String, Vec<u8>>,
    /// Environment used for interpolation and bare environment keys.
    pub environment: BTreeMap<String, String>,
    /// Directory relative paths are resolved against.
    pub working_dir: PathBuf,
}

/// Parser for compose files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
    /// Variables available to interpolation.
    environment: BTreeMap<String, String>,
}

impl ConfigParser {
    /// Creates a parser with an empty environment.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_path: None,
            environment: BTreeMap::new(),
        }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Adds variables to the interpolation environment, replacing existing ones.
    #[must_use]
    pub fn with_environment<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.environment
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds the process environment to the interpolation environment.
    #[must_use]
    pub fn with_process_environment(self) -> Self {
        self.with_environment(std::env::vars())
    }

    /// Merges the `.env` file of the base path, if present.
    ///
    /// Variables that are already set take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(mut self) -> Result<Self> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if !env_path.exists() {
            debug!(".env file not found at: {}", env_path.display());
            return Ok(self);
        }

        info!("Loading environment from: {}", env_path.display());
        let dotenv_error = |e: dotenvy::Error| {
            StackError::from(ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })
        };

        for item in dotenvy::from_path_iter(&env_path).map_err(dotenv_error)? {
            let (key, value) = item.map_err(dotenv_error)?;
            self.environment.entry(key).or_insert(value);
        }

        Ok(self)
    }

    /// Loads a compose file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<LoadedConfig> {
        let path = path.as_ref();
        info!("Loading compose file from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a compose document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the document fails validation.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<LoadedConfig> {
        debug!("Parsing compose YAML");

        let mut document: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;
        stringify_version(&mut document, Some(content));

        self.parse_document(document, source)
    }

    /// Parses a compose document that is already in tree form.
    ///
    /// # Errors
    ///
    /// Returns an error if the document fails validation or a secret payload
    /// cannot be loaded.
    pub fn parse_document(&self, mut document: Value, source: Option<&Path>) -> Result<LoadedConfig> {
        let location = source.map(|p| p.display().to_string());
        if !document.is_mapping() {
            return Err(ConfigError::ParseError {
                message: "top-level object must be a mapping".to_string(),
                location,
            }
            .into());
        }

        stringify_version(&mut document, None);

        let validator = ConfigValidator::new();
        let mut warnings = validator.check_properties(&document)?;

        let mut interpolator = Interpolator::new(&self.environment)?;
        interpolator.apply(&mut document)?;
        warnings.extend(
            interpolator
                .into_unset()
                .into_iter()
                .map(|name| PropertyWarning::UnsetVariable { name }),
        );
        warnings.sort();

        let file: ComposeFile = serde_yaml::from_value(document).map_err(|e| ConfigError::ParseError {
            message: format!("Invalid compose file: {e}"),
            location: location.clone(),
        })?;

        let validation = validator.validate(&file)?;
        for warning in &warnings {
            warn!("{warning}");
        }

        let working_dir = self
            .base_path
            .clone()
            .or_else(|| source.and_then(Path::parent).map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let secret_payloads = self.load_secret_payloads(&file, &working_dir)?;

        debug!(
            "Parsed compose file with {} services, {} networks, {} secrets",
            file.services.len(),
            file.networks.len(),
            file.secrets.len()
        );

        Ok(LoadedConfig {
            file,
            warnings,
            notes: validation.warnings,
            secret_payloads,
            environment: self.environment.clone(),
            working_dir,
        })
    }

    /// Reads the payload of every stack-managed secret.
    fn load_secret_payloads(
        &self,
        file: &ComposeFile,
        working_dir: &Path,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut payloads = BTreeMap::new();

        for (name, secret) in &file.secrets {
            if external_name(name, secret.external.as_ref(), secret.name.as_deref()).is_some() {
                continue;
            }

            let payload = if let Some(path) = &secret.file {
                let full_path = working_dir.join(path);
                debug!("Reading secret {} from {}", name, full_path.display());
                std::fs::read(&full_path).map_err(|e| ConfigError::SecretSource {
                    name: name.clone(),
                    message: format!("cannot read {}: {e}", full_path.display()),
                })?
            } else if let Some(variable) = &secret.environment {
                self.environment
                    .get(variable)
                    .map(|value| value.as_bytes().to_vec())
                    .ok_or_else(|| ConfigError::SecretSource {
                        name: name.clone(),
                        message: format!("environment variable {variable} is not set"),
                    })?
            } else {
                return Err(ConfigError::SecretSource {
                    name: name.clone(),
                    message: "no payload source".to_string(),
                }
                .into());
            };

            payloads.insert(name.clone(), payload);
        }

        Ok(payloads)
    }
}

/// Replaces an unquoted numeric `version` with its text.
///
/// YAML reads `version: 3.10` as the float `3.1`, so the literal is taken
/// from `content` when it is available.
fn stringify_version(document: &mut Value, content: Option<&str>) {
    let Some(Value::Number(number)) = document.get("version") else {
        return;
    };
    let text = content
        .and_then(version_literal)
        .unwrap_or_else(|| number.to_string());

    if let Some(mapping) = document.as_mapping_mut() {
        mapping.insert(Value::from("version"), Value::String(text));
    }
}

/// Finds the numeric literal of a top-level `version:` line.
fn version_literal(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("version:")?;
        let value = rest.split('#').next().unwrap_or(rest).trim();
        value
            .parse::<f64>()
            .is_ok()
            .then(|| value.to_string())
    })
}

/// Default compose file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// Finds the compose file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no compose file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found compose file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}
