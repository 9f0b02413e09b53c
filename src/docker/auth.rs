//! Registry credential resolution.
//!
//! Credentials are read from the Docker CLI configuration file
//! (`$DOCKER_CONFIG/config.json` or `~/.docker/config.json`) and encoded for
//! the `X-Registry-Auth` header. Credential helpers are not consulted.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeployError, Result, StackError};

/// Registry host used for images without an explicit registry.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Key the Docker CLI stores Docker Hub credentials under.
const DOCKER_HUB_INDEX: &str = "https://index.docker.io/v1/";

/// Aliases of Docker Hub accepted as credential keys.
const DOCKER_HUB_ALIASES: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// Produces an encoded registry credential for an image reference.
#[cfg_attr(test, mockall::automock)]
pub trait RegistryAuthResolver: Send + Sync {
    /// Returns the `X-Registry-Auth` value for `image`, or an empty string
    /// if no credential is configured for its registry.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::RegistryAuth`] if a configured credential
    /// cannot be read or decoded.
    fn encoded_auth(&self, image: &str) -> Result<String>;
}

/// Docker CLI configuration file, reduced to the credential store.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    identitytoken: Option<String>,
}

/// Payload of the `X-Registry-Auth` header.
#[derive(Debug, Serialize)]
struct AuthConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    password: String,
    serveraddress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identitytoken: Option<String>,
}

/// Resolves credentials from a Docker CLI `config.json`.
#[derive(Debug, Clone)]
pub struct DockerConfigAuth {
    config_file: PathBuf,
}

impl DockerConfigAuth {
    /// Uses `config.json` inside `config_dir`.
    #[must_use]
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            config_file: config_dir.as_ref().join("config.json"),
        }
    }

    /// Uses `$DOCKER_CONFIG`, falling back to `~/.docker`.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var_os("DOCKER_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .map(Self::new)
    }

    fn load(&self, image: &str) -> Result<Option<ConfigFile>> {
        if !self.config_file.exists() {
            debug!("No docker config at {}", self.config_file.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.config_file)
            .map_err(|e| auth_error(image, format!("cannot read {}: {e}", self.config_file.display())))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| auth_error(image, format!("invalid {}: {e}", self.config_file.display())))?;
        Ok(Some(config))
    }
}

impl RegistryAuthResolver for DockerConfigAuth {
    fn encoded_auth(&self, image: &str) -> Result<String> {
        let Some(config) = self.load(image)? else {
            return Ok(String::new());
        };

        let registry = registry_host(image);
        let Some((key, entry)) = config
            .auths
            .iter()
            .find(|(key, _)| normalize_registry(key) == registry)
        else {
            debug!("No credentials configured for {registry}");
            return Ok(String::new());
        };

        let (username, password) = match &entry.auth {
            Some(encoded) if !encoded.is_empty() => {
                let decoded = STANDARD
                    .decode(encoded)
                    .map_err(|e| auth_error(image, format!("invalid auth for {key}: {e}")))?;
                let decoded = String::from_utf8(decoded)
                    .map_err(|e| auth_error(image, format!("invalid auth for {key}: {e}")))?;
                let (user, pass) = decoded
                    .split_once(':')
                    .ok_or_else(|| auth_error(image, format!("invalid auth for {key}: missing ':'")))?;
                (user.to_string(), pass.to_string())
            }
            _ => (
                entry.username.clone().unwrap_or_default(),
                entry.password.clone().unwrap_or_default(),
            ),
        };

        let payload = AuthConfig {
            username,
            password,
            serveraddress: key.clone(),
            identitytoken: entry.identitytoken.clone().filter(|t| !t.is_empty()),
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| auth_error(image, format!("cannot encode credentials: {e}")))?;

        debug!("Using credentials for {registry}");
        Ok(URL_SAFE.encode(json))
    }
}

fn auth_error(image: &str, reason: String) -> StackError {
    DeployError::RegistryAuth {
        image: image.to_string(),
        reason,
    }
    .into()
}

/// Returns the registry host of an image reference.
#[must_use]
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            if DOCKER_HUB_ALIASES.contains(&first) {
                DEFAULT_REGISTRY
            } else {
                first
            }
        }
        _ => DEFAULT_REGISTRY,
    }
}

/// Reduces a credential key such as `https://index.docker.io/v1/` to a host.
fn normalize_registry(key: &str) -> &str {
    if key == DOCKER_HUB_INDEX {
        return DEFAULT_REGISTRY;
    }
    let host = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    let host = host.split('/').next().unwrap_or(host);
    if DOCKER_HUB_ALIASES.contains(&host) {
        DEFAULT_REGISTRY
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, json: &str) -> DockerConfigAuth {
        std::fs::write(dir.path().join("config.json"), json).expect("write config");
        DockerConfigAuth::new(dir.path())
    }

    fn decode(token: &str) -> serde_json::Value {
        let bytes = URL_SAFE.decode(token).expect("base64");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[test]
    fn test_registry_host() {
        assert_eq!(registry_host("nginx"), "docker.io");
        assert_eq!(registry_host("library/nginx:1.25"), "docker.io");
        assert_eq!(registry_host("ghcr.io/org/app:1"), "ghcr.io");
        assert_eq!(registry_host("localhost:5000/app"), "localhost:5000");
        assert_eq!(registry_host("docker.io/library/nginx"), "docker.io");
    }

    #[test]
    fn test_normalize_registry() {
        assert_eq!(normalize_registry("https://index.docker.io/v1/"), "docker.io");
        assert_eq!(normalize_registry("https://ghcr.io"), "ghcr.io");
        assert_eq!(normalize_registry("registry.local:5000/v2/"), "registry.local:5000");
    }

    #[test]
    fn test_encodes_matching_credentials() {
        let dir = TempDir::new().expect("tempdir");
        let auth = STANDARD.encode("bot:t0ken");
        let resolver = write_config(
            &dir,
            &format!(r#"{{"auths": {{"https://ghcr.io": {{"auth": "{auth}"}}}}}}"#),
        );

        let token = resolver.encoded_auth("ghcr.io/org/app:1").expect("token");
        let payload = decode(&token);
        assert_eq!(payload["username"], "bot");
        assert_eq!(payload["password"], "t0ken");
        assert_eq!(payload["serveraddress"], "https://ghcr.io");
    }

    #[test]
    fn test_no_entry_gives_empty_token() {
        let dir = TempDir::new().expect("tempdir");
        let resolver = write_config(&dir, r#"{"auths": {}}"#);
        assert_eq!(resolver.encoded_auth("nginx").expect("token"), "");

        let missing = DockerConfigAuth::new(dir.path().join("nope"));
        assert_eq!(missing.encoded_auth("nginx").expect("token"), "");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let resolver = write_config(&dir, "{not json");
        let err = resolver.encoded_auth("nginx").expect_err("malformed");
        assert!(matches!(
            err,
            StackError::Deploy(DeployError::RegistryAuth { .. })
        ));

        let bad_auth = write_config(
            &dir,
            r#"{"auths": {"https://index.docker.io/v1/": {"auth": "!!!"}}}"#,
        );
        assert!(bad_auth.encoded_auth("nginx").is_err());
    }
}
