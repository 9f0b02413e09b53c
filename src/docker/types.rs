//! Docker Engine API wire types.
//!
//! Only the subset of the swarm object model that stack deployment touches is
//! modelled. Field names follow the Engine API (`PascalCase`); optional and
//! empty values are omitted on the wire so the daemon applies its defaults.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DockerError, Result};

/// Label map as used by every swarm object.
pub type Labels = BTreeMap<String, String>;

fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Filters and versions
// ============================================================================

/// Query filters in the daemon's `{"key": {"value": true}}` form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, BTreeMap<String, bool>>);

impl Filters {
    /// Creates an empty filter set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds a value under a key.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0
            .entry(key.into())
            .or_default()
            .insert(value.into(), true);
    }

    /// Builder-style variant of [`Filters::add`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(key, value);
        self
    }

    /// Returns the values registered under a key.
    #[must_use]
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.0
            .get(key)
            .map(|values| values.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns true if no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes the filters for the `filters` query parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_query(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            DockerError::InvalidResponse {
                message: format!("Failed to encode filters: {e}"),
            }
            .into()
        })
    }

    /// Evaluates the `label` and `name` filters against an object.
    ///
    /// Every label filter must hold (`key` requires presence, `key=value`
    /// requires equality); name filters match if any value is a substring of
    /// the object name.
    #[must_use]
    pub fn matches(&self, name: &str, labels: &Labels) -> bool {
        let labels_match = self.values("label").into_iter().all(|filter| {
            match filter.split_once('=') {
                Some((key, value)) => labels.get(key).is_some_and(|v| v == value),
                None => labels.contains_key(filter),
            }
        });
        let names = self.values("name");
        let name_matches = names.is_empty() || names.iter().any(|n| name.contains(n));
        labels_match && name_matches
    }
}

/// Object version used for optimistic concurrency on updates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Version {
    /// Monotonic index assigned by the cluster store.
    pub index: u64,
}

// ============================================================================
// System
// ============================================================================

/// Subset of `GET /info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    /// Swarm membership of the daemon.
    #[serde(default)]
    pub swarm: SwarmInfo,
}

/// Swarm section of the daemon info.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmInfo {
    /// Node ID, empty when not part of a swarm.
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    /// `inactive`, `pending`, `active`, `error` or `locked`.
    #[serde(default)]
    pub local_node_state: String,
    /// True when the node can serve control-plane requests.
    #[serde(default)]
    pub control_available: bool,
}

// ============================================================================
// Services
// ============================================================================

/// A live service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    /// Service ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Current version.
    #[serde(default)]
    pub version: Version,
    /// Service specification.
    pub spec: SwarmServiceSpec,
}

/// Service specification as sent to `/services/create` and `/services/{id}/update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmServiceSpec {
    /// Service name.
    pub name: String,
    /// Service labels.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Task template.
    #[serde(default)]
    pub task_template: TaskTemplate,
    /// Scheduling mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ServiceMode>,
    /// Rolling update behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_config: Option<UpdateConfig>,
    /// Endpoint configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_spec: Option<EndpointSpec>,
}

/// Template applied to each task of a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskTemplate {
    /// Container settings.
    #[serde(default)]
    pub container_spec: ContainerSpec,
    /// Resource limits and reservations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Restart policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    /// Placement constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<Placement>,
    /// Network attachments.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<NetworkAttachment>,
}

/// Container settings of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSpec {
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Container labels.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Entrypoint override.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Arguments.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment in `KEY=value` form.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    /// User.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Grace period before killing the container, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_grace_period: Option<i64>,
    /// Secrets exposed to the container.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretReference>,
    /// Bind and volume mounts.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

/// A bind or volume mount.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mount {
    /// `bind` or `volume`.
    #[serde(rename = "Type")]
    pub kind: String,
    /// Host path or volume name; empty for anonymous volumes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Path inside the container.
    pub target: String,
    /// Mount read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Options used when the daemon creates the volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_options: Option<VolumeOptions>,
}

/// Options for volumes created on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeOptions {
    /// Labels applied to the volume.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Volume driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_config: Option<DriverConfig>,
}

/// A driver name with options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverConfig {
    /// Driver name.
    pub name: String,
    /// Driver options.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

/// Reference from a container to a secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretReference {
    /// Where the secret is mounted.
    pub file: SecretReferenceFile,
    /// Secret ID, resolved at deploy time.
    #[serde(rename = "SecretID", default)]
    pub secret_id: String,
    /// Secret name.
    pub secret_name: String,
}

/// File target of a secret reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretReferenceFile {
    /// File name under `/run/secrets`.
    pub name: String,
    /// Owner UID.
    #[serde(rename = "UID")]
    pub uid: String,
    /// Owner GID.
    #[serde(rename = "GID")]
    pub gid: String,
    /// File mode.
    pub mode: u32,
}

/// Resource limits and reservations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRequirements {
    /// Hard limits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Resources>,
    /// Reservations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservations: Option<Resources>,
}

/// CPU and memory amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resources {
    /// CPU in units of 1e-9 CPUs.
    #[serde(rename = "NanoCPUs", default)]
    pub nano_cpus: i64,
    /// Memory in bytes.
    #[serde(default)]
    pub memory_bytes: i64,
}

/// Task restart policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    /// `none`, `on-failure` or `any`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Delay between restarts, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
    /// Maximum attempts before giving up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
    /// Window used to evaluate the policy, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<i64>,
}

/// Placement constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    /// Constraint expressions.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

/// Attachment of a service to a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkAttachment {
    /// Network name or ID.
    pub target: String,
    /// DNS aliases on that network.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Scheduling mode; exactly one field is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceMode {
    /// Replicated mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicated: Option<ReplicatedService>,
    /// Global mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalService>,
}

/// Replicated mode settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicatedService {
    /// Number of tasks.
    #[serde(default)]
    pub replicas: u64,
}

/// Global mode marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalService {}

/// Rolling update configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateConfig {
    /// Tasks updated simultaneously.
    #[serde(default)]
    pub parallelism: u64,
    /// Delay between batches, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<i64>,
    /// `pause`, `continue` or `rollback`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_action: Option<String>,
    /// Monitoring window after each task update, in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<i64>,
    /// Tolerated failure ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failure_ratio: Option<f64>,
}

/// Endpoint configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointSpec {
    /// `vip` or `dnsrr`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Published ports.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortConfig>,
}

/// A published port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortConfig {
    /// `tcp`, `udp` or `sctp`.
    pub protocol: String,
    /// Port inside the container.
    pub target_port: u32,
    /// Port on the routing mesh or host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_port: Option<u32>,
    /// `ingress` or `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_mode: Option<String>,
}

/// Response of `POST /services/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceCreateResponse {
    /// ID of the new service.
    #[serde(rename = "ID")]
    pub id: String,
    /// Warnings emitted by the daemon.
    #[serde(default, deserialize_with = "nullable")]
    pub warnings: Vec<String>,
}

/// Response of `POST /services/{id}/update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceUpdateResponse {
    /// Warnings emitted by the daemon.
    #[serde(default, deserialize_with = "nullable")]
    pub warnings: Vec<String>,
}

/// Per-call options for service writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceWriteOptions {
    /// Encoded `X-Registry-Auth` header value, if any.
    pub encoded_registry_auth: Option<String>,
}

impl Service {
    /// Describes the scheduling mode for display.
    #[must_use]
    pub fn mode_description(&self) -> String {
        match &self.spec.mode {
            Some(ServiceMode {
                global: Some(_), ..
            }) => "global".to_string(),
            Some(ServiceMode {
                replicated: Some(replicated),
                ..
            }) => format!("replicated ({})", replicated.replicas),
            _ => "replicated".to_string(),
        }
    }
}

// ============================================================================
// Networks
// ============================================================================

/// A live network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Network {
    /// Network ID.
    #[serde(rename = "Id")]
    pub id: String,
    /// Network name.
    pub name: String,
    /// `local`, `global` or `swarm`.
    #[serde(default)]
    pub scope: String,
    /// Network driver.
    #[serde(default)]
    pub driver: String,
    /// Network labels.
    #[serde(default, deserialize_with = "nullable")]
    pub labels: Labels,
}

/// Body of `POST /networks/create`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateRequest {
    /// Network name.
    pub name: String,
    /// Driver name.
    pub driver: String,
    /// Labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Driver options.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    /// Allow standalone containers to attach.
    #[serde(default)]
    pub attachable: bool,
    /// Restrict external access.
    #[serde(default)]
    pub internal: bool,
    /// IP address management.
    #[serde(rename = "IPAM", default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<Ipam>,
    /// Ask the daemon to reject duplicate names.
    #[serde(default)]
    pub check_duplicate: bool,
}

/// IPAM configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
    /// IPAM driver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address pools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<IpamPool>,
}

/// An IPAM address pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpamPool {
    /// Subnet in CIDR form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
    /// Allocation range.
    #[serde(rename = "IPRange", default, skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Gateway address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// Response of `POST /networks/create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateResponse {
    /// ID of the new network.
    #[serde(rename = "Id")]
    pub id: String,
    /// Warning emitted by the daemon.
    #[serde(default, deserialize_with = "nullable")]
    pub warning: String,
}

// ============================================================================
// Secrets
// ============================================================================

/// A live secret. The payload is never returned by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Secret {
    /// Secret ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Current version.
    #[serde(default)]
    pub version: Version,
    /// Secret specification.
    pub spec: SwarmSecretSpec,
}

/// Secret specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmSecretSpec {
    /// Secret name.
    pub name: String,
    /// Labels.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: Labels,
    /// Base64 encoded payload.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data: String,
}

/// Generic `{"ID": ...}` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdResponse {
    /// Object ID.
    #[serde(rename = "ID")]
    pub id: String,
}

// ============================================================================
// Resource kinds
// ============================================================================

/// The kinds of cluster object a stack owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A service.
    Service,
    /// A network.
    Network,
    /// A secret.
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Service => "service",
            Self::Network => "network",
            Self::Secret => "secret",
        };
        write!(f, "{name}")
    }
}

/// Identity of a live object, enough to report on and remove it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveResource {
    /// Object kind.
    pub kind: ResourceKind,
    /// Object ID.
    pub id: String,
    /// Object name.
    pub name: String,
}

impl From<&Service> for LiveResource {
    fn from(service: &Service) -> Self {
        Self {
            kind: ResourceKind::Service,
            id: service.id.clone(),
            name: service.spec.name.clone(),
        }
    }
}

impl From<&Network> for LiveResource {
    fn from(network: &Network) -> Self {
        Self {
            kind: ResourceKind::Network,
            id: network.id.clone(),
            name: network.name.clone(),
        }
    }
}

impl From<&Secret> for LiveResource {
    fn from(secret: &Secret) -> Self {
        Self {
            kind: ResourceKind::Secret,
            id: secret.id.clone(),
            name: secret.spec.name.clone(),
        }
    }
}
