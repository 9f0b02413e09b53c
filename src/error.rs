//! Error types for stack deployment.
//!
//! Errors are grouped by the layer that produces them: loading the compose
//! document, talking to the cluster, and reconciling a stack. Everything is
//! wrapped by [`StackError`] so callers can use a single `Result` alias.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stack operations.
#[derive(Debug, Error)]
pub enum StackError {
    /// Compose document errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Cluster gateway errors.
    #[error("Docker API error: {0}")]
    Docker(#[from] DockerError),

    /// Deploy and teardown errors.
    #[error("Deploy error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while loading and validating a compose document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The compose file was not found.
    #[error("Compose file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The document is not valid YAML or does not have the expected shape.
    #[error("Failed to parse compose file: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// The document uses properties that cannot be honored at all.
    #[error("Compose file contains unsupported options:\n\n{properties}")]
    ForbiddenProperties {
        /// One line per forbidden property with a hint.
        properties: String,
    },

    /// The compose file version is not supported.
    #[error("Unsupported compose file version: {version}. Only 3.x is supported")]
    UnsupportedVersion {
        /// Version string found in the document.
        version: String,
    },

    /// Validation failed.
    #[error("Compose file validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A required variable in an interpolation expression is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A secret payload could not be read.
    #[error("Cannot load secret {name}: {message}")]
    SecretSource {
        /// Secret name.
        name: String,
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised by the Docker Engine API gateway.
#[derive(Debug, Error)]
pub enum DockerError {
    /// The requested object does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the missing object.
        resource: String,
    },

    /// The daemon rejected the request.
    #[error("API request failed with status {status}: {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the daemon.
        message: String,
    },

    /// Transport failure.
    #[error("Network error communicating with the Docker daemon: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// The daemon answered with something we could not decode.
    #[error("Invalid response from the Docker daemon: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// The daemon address uses a transport this client does not speak.
    #[error("Unsupported Docker host {host}: only tcp://, http:// and https:// are supported")]
    UnsupportedHost {
        /// Host as configured.
        host: String,
    },

    /// TLS material could not be loaded.
    #[error("TLS configuration error: {message}")]
    Tls {
        /// Description of the TLS issue.
        message: String,
    },
}

/// Errors raised while deploying or removing a stack.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The daemon is not a swarm manager.
    #[error(
        "this node is not a swarm manager. Use \"docker swarm init\" or \"docker swarm join\" to connect this node to swarm and try again"
    )]
    NotManager,

    /// A network declared external does not exist.
    #[error("network {name} is declared as external, but could not be found. You need to create a swarm-scoped network before the stack is deployed")]
    ExternalNetworkNotFound {
        /// External network name.
        name: String,
    },

    /// A network declared external exists but is not cluster-scoped.
    #[error("network {name} is declared as external, but it is not in the right scope: \"{scope}\" instead of \"swarm\"")]
    ExternalNetworkScopeMismatch {
        /// External network name.
        name: String,
        /// Scope reported by the daemon.
        scope: String,
    },

    /// Reading a live resource failed for a reason other than absence.
    #[error("failed to read {kind} {name}: {reason}")]
    ResourceRead {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// Creating a resource failed.
    #[error("failed to create {kind} {name}: {reason}")]
    ResourceCreate {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// Updating a resource failed.
    #[error("failed to update {kind} {name}: {reason}")]
    ResourceUpdate {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Underlying failure.
        reason: String,
    },

    /// A registry credential could not be produced for an image.
    #[error("failed to resolve registry credentials for {image}: {reason}")]
    RegistryAuth {
        /// Image reference.
        image: String,
        /// Underlying failure.
        reason: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A live resource name does not carry the namespace prefix.
    #[error("{name} is not scoped to stack {namespace}")]
    InvalidScopedName {
        /// The offending name.
        name: String,
        /// Namespace the name was checked against.
        namespace: String,
    },
}

/// Result type alias for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Docker(DockerError::NetworkError { .. }))
    }

    /// Returns true if the daemon reported the object as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Docker(DockerError::NotFound { .. }))
    }

    /// Returns true if the operation was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Deploy(DeployError::Cancelled))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl DockerError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(StackError::from(DockerError::network("reset")).is_retryable());
        assert!(!StackError::from(DockerError::api_error(500, "boom")).is_retryable());
        assert!(!StackError::from(DeployError::NotManager).is_retryable());
    }

    #[test]
    fn test_not_found_and_cancelled() {
        assert!(StackError::from(DockerError::not_found("network x")).is_not_found());
        assert!(StackError::from(DeployError::Cancelled).is_cancelled());
        assert!(!StackError::internal("x").is_not_found());
    }

    #[test]
    fn test_scope_mismatch_message() {
        let err = DeployError::ExternalNetworkScopeMismatch {
            name: "edge".to_string(),
            scope: "local".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("edge"));
        assert!(message.contains("\"local\""));
    }
}
