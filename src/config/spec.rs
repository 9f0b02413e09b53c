//! Compose document types.
//!
//! These structs map the subset of the compose v3 format that a swarm stack
//! can honor. Properties that only make sense for single-host containers are
//! intercepted by the validator before deserialization and never reach these
//! types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Root of a compose document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComposeFile {
    /// Format version, `3.x` or absent.
    #[serde(default)]
    pub version: Option<String>,
    /// Services keyed by internal name.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
    /// Networks keyed by internal name. A bare key declares a default network.
    #[serde(default)]
    pub networks: BTreeMap<String, Option<NetworkConfig>>,
    /// Secrets keyed by internal name.
    #[serde(default)]
    pub secrets: BTreeMap<String, SecretConfig>,
    /// Named volumes keyed by internal name.
    #[serde(default)]
    pub volumes: BTreeMap<String, Option<VolumeConfig>>,
}

/// A service definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Entrypoint override.
    #[serde(default)]
    pub entrypoint: Option<StringOrList>,
    /// Command override.
    #[serde(default)]
    pub command: Option<StringOrList>,
    /// Environment variables.
    #[serde(default)]
    pub environment: Environment,
    /// Service labels, applied to the container.
    #[serde(default)]
    pub labels: Labels,
    /// Network attachments.
    #[serde(default)]
    pub networks: ServiceNetworks,
    /// Published ports.
    #[serde(default)]
    pub ports: Vec<PortEntry>,
    /// Secrets granted to the service.
    #[serde(default)]
    pub secrets: Vec<ServiceSecret>,
    /// Volume mounts in short syntax.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Swarm deployment settings.
    #[serde(default)]
    pub deploy: Option<DeployConfig>,
    /// Working directory.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// User to run as.
    #[serde(default)]
    pub user: Option<String>,
    /// Container hostname.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Grace period before the container is killed.
    #[serde(default)]
    pub stop_grace_period: Option<String>,
}

/// Swarm-specific deployment settings of a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// `replicated` or `global`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Number of replicas in replicated mode.
    #[serde(default)]
    pub replicas: Option<u64>,
    /// Labels applied to the service object.
    #[serde(default)]
    pub labels: Labels,
    /// Resource limits and reservations.
    #[serde(default)]
    pub resources: Option<ResourcesConfig>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: Option<RestartPolicyConfig>,
    /// Placement constraints.
    #[serde(default)]
    pub placement: Option<PlacementConfig>,
    /// Rolling update settings.
    #[serde(default)]
    pub update_config: Option<UpdateConfigSpec>,
    /// `vip` or `dnsrr`.
    #[serde(default)]
    pub endpoint_mode: Option<String>,
}

/// Resource limits and reservations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcesConfig {
    /// Upper bounds.
    #[serde(default)]
    pub limits: Option<ResourceAmounts>,
    /// Guaranteed amounts.
    #[serde(default)]
    pub reservations: Option<ResourceAmounts>,
}

/// CPU and memory amounts as written in the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceAmounts {
    /// Fractional CPUs, e.g. `"0.5"`.
    #[serde(default)]
    pub cpus: Option<Scalar>,
    /// Memory with optional unit suffix, e.g. `"512M"`.
    #[serde(default)]
    pub memory: Option<Scalar>,
}

/// Restart policy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartPolicyConfig {
    /// `none`, `on-failure` or `any`.
    #[serde(default)]
    pub condition: Option<String>,
    /// Delay between attempts.
    #[serde(default)]
    pub delay: Option<String>,
    /// Maximum attempts.
    #[serde(default)]
    pub max_attempts: Option<u64>,
    /// Evaluation window.
    #[serde(default)]
    pub window: Option<String>,
}

/// Placement settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementConfig {
    /// Constraint expressions such as `node.role == manager`.
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// Rolling update settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateConfigSpec {
    /// Tasks updated at once.
    #[serde(default)]
    pub parallelism: Option<u64>,
    /// Delay between batches.
    #[serde(default)]
    pub delay: Option<String>,
    /// `pause`, `continue` or `rollback`.
    #[serde(default)]
    pub failure_action: Option<String>,
    /// Monitoring window after each update.
    #[serde(default)]
    pub monitor: Option<String>,
    /// Tolerated failure ratio.
    #[serde(default)]
    pub max_failure_ratio: Option<f64>,
}

/// A network definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Driver, `overlay` when omitted.
    #[serde(default)]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    /// Marks the network as managed outside the stack.
    #[serde(default)]
    pub external: Option<External>,
    /// Explicit cluster name.
    #[serde(default)]
    pub name: Option<String>,
    /// Allow standalone containers to attach.
    #[serde(default)]
    pub attachable: bool,
    /// Restrict external access.
    #[serde(default)]
    pub internal: bool,
    /// Network labels.
    #[serde(default)]
    pub labels: Labels,
    /// IP address management.
    #[serde(default)]
    pub ipam: Option<IpamConfig>,
}

/// IPAM settings of a network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamConfig {
    /// IPAM driver.
    #[serde(default)]
    pub driver: Option<String>,
    /// Address pools.
    #[serde(default)]
    pub config: Vec<IpamPoolConfig>,
}

/// An address pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpamPoolConfig {
    /// Subnet in CIDR form.
    #[serde(default)]
    pub subnet: Option<String>,
    /// Range addresses are allocated from.
    #[serde(default)]
    pub ip_range: Option<String>,
    /// Gateway address of the subnet.
    #[serde(default)]
    pub gateway: Option<String>,
}

/// A secret definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretConfig {
    /// File holding the payload, relative to the compose file.
    #[serde(default)]
    pub file: Option<String>,
    /// Environment variable holding the payload.
    #[serde(default)]
    pub environment: Option<String>,
    /// Marks the secret as managed outside the stack.
    #[serde(default)]
    pub external: Option<External>,
    /// Explicit cluster name.
    #[serde(default)]
    pub name: Option<String>,
    /// Secret labels.
    #[serde(default)]
    pub labels: Labels,
}

/// A named volume definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeConfig {
    /// Volume driver.
    #[serde(default)]
    pub driver: Option<String>,
    /// Driver options.
    #[serde(default)]
    pub driver_opts: BTreeMap<String, String>,
    /// Marks the volume as managed outside the stack.
    #[serde(default)]
    pub external: Option<External>,
    /// Explicit name.
    #[serde(default)]
    pub name: Option<String>,
    /// Volume labels.
    #[serde(default)]
    pub labels: Labels,
}

/// `external:` either as a flag or in the legacy `{name: ...}` form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum External {
    /// `external: true`.
    Flag(bool),
    /// `external: {name: real-name}`.
    Named {
        /// Name of the external object.
        #[serde(default)]
        name: Option<String>,
    },
}

impl External {
    /// Returns true if the object is external.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Named { .. } => true,
        }
    }

    /// The name given in the legacy form.
    #[must_use]
    pub fn legacy_name(&self) -> Option<&str> {
        match self {
            Self::Named { name } => name.as_deref(),
            Self::Flag(_) => None,
        }
    }
}

/// Returns the cluster name of an external object, or `None` if it is managed.
#[must_use]
pub fn external_name<'a>(
    internal: &'a str,
    external: Option<&'a External>,
    name: Option<&'a str>,
) -> Option<&'a str> {
    let external = external.filter(|e| e.is_external())?;
    Some(name.or_else(|| external.legacy_name()).unwrap_or(internal))
}

// ============================================================================
// Flexible value forms
// ============================================================================

/// A YAML scalar that is rendered as a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// String.
    Str(String),
}

impl Eq for Scalar {}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "{value}"),
        }
    }
}

/// A command given either as a shell-style string or as a list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StringOrList {
    /// `command: npm start`.
    String(String),
    /// `command: ["npm", "start"]`.
    List(Vec<String>),
}

impl StringOrList {
    /// Splits the value into arguments.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::String(command) => split_command(command),
            Self::List(args) => args.clone(),
        }
    }
}

/// Splits a command line on whitespace, honoring single and double quotes.
#[must_use]
pub fn split_command(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;

    for c in command.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_arg = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

/// Environment as a map or as a `KEY=value` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Environment {
    /// `KEY: value`; a null value takes the variable from the deploy environment.
    Map(BTreeMap<String, Option<Scalar>>),
    /// `- KEY=value`; a bare `KEY` takes the variable from the deploy environment.
    List(Vec<String>),
}

impl Default for Environment {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl Environment {
    /// Resolves the environment into `KEY=value` entries.
    ///
    /// Bare keys are looked up in `lookup` and dropped when absent there.
    #[must_use]
    pub fn resolve(&self, lookup: &BTreeMap<String, String>) -> Vec<String> {
        let pairs: Vec<(String, Option<String>)> = match self {
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.as_ref().map(ToString::to_string)))
                .collect(),
            Self::List(list) => list
                .iter()
                .map(|entry| match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (entry.clone(), None),
                })
                .collect(),
        };

        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in pairs {
            if let Some(value) = value.or_else(|| lookup.get(&key).cloned()) {
                resolved.insert(key, value);
            }
        }
        resolved.into_iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

/// Labels as a map or as a `key=value` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Labels {
    /// `key: value`.
    Map(BTreeMap<String, Scalar>),
    /// `- key=value`.
    List(Vec<String>),
}

impl Default for Labels {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl Labels {
    /// Converts to a plain string map. List entries without `=` get an empty value.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, String> {
        match self {
            Self::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
            Self::List(list) => list
                .iter()
                .map(|entry| {
                    let (k, v) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                    (k.to_string(), v.to_string())
                })
                .collect(),
        }
    }
}

/// Service network attachments as a list or as a map with per-network options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServiceNetworks {
    /// `networks: [front, back]`.
    List(Vec<String>),
    /// `networks: {front: {aliases: [...]}}`.
    Map(BTreeMap<String, Option<ServiceNetworkConfig>>),
}

impl Default for ServiceNetworks {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl ServiceNetworks {
    /// Names of the attached networks.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::List(list) => list.iter().map(String::as_str).collect(),
            Self::Map(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// Extra aliases declared for a network.
    #[must_use]
    pub fn aliases(&self, network: &str) -> Vec<String> {
        match self {
            Self::List(_) => Vec::new(),
            Self::Map(map) => map
                .get(network)
                .and_then(Option::as_ref)
                .map(|config| config.aliases.clone())
                .unwrap_or_default(),
        }
    }

    /// Returns true if no network is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::List(list) => list.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }
}

/// Per-network options of a service attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceNetworkConfig {
    /// DNS aliases.
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A port entry in short or long syntax.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortEntry {
    /// `- 80`.
    Number(u32),
    /// `- "8080:80/udp"`.
    Short(String),
    /// `- {target: 80, published: 8080}`.
    Long(PortLong),
}

/// Long port syntax.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortLong {
    /// Container port.
    pub target: u32,
    /// Published port.
    #[serde(default)]
    pub published: Option<u32>,
    /// Protocol, `tcp` when omitted.
    #[serde(default)]
    pub protocol: Option<String>,
    /// `ingress` or `host`.
    #[serde(default)]
    pub mode: Option<String>,
}

/// A service secret grant in short or long syntax.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ServiceSecret {
    /// `- token`.
    Short(String),
    /// `- {source: token, target: api_token}`.
    Long(ServiceSecretLong),
}

impl ServiceSecret {
    /// Internal name of the referenced secret.
    #[must_use]
    pub fn source(&self) -> &str {
        match self {
            Self::Short(source) => source,
            Self::Long(long) => &long.source,
        }
    }
}

/// Long secret grant syntax.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSecretLong {
    /// Internal secret name.
    pub source: String,
    /// File name inside the container.
    #[serde(default)]
    pub target: Option<String>,
    /// Owner UID.
    #[serde(default)]
    pub uid: Option<String>,
    /// Owner GID.
    #[serde(default)]
    pub gid: Option<String>,
    /// File mode.
    #[serde(default)]
    pub mode: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_forms() {
        let yaml = r#"
image: nginx:alpine
command: nginx -g "daemon off;"
environment:
  - MODE=prod
  - HOME_DIR
labels:
  tier: front
  weight: 3
networks:
  front:
    aliases: [www]
  back:
ports:
  - 80
  - "8443:443"
  - target: 53
    published: 5353
    protocol: udp
secrets:
  - token
  - source: cert
    target: server.crt
"#;
        let service: ServiceConfig = serde_yaml::from_str(yaml).expect("parse service");
        assert_eq!(
            service.command.as_ref().map(StringOrList::to_args),
            Some(vec!["nginx".to_string(), "-g".to_string(), "daemon off;".to_string()])
        );
        assert_eq!(service.networks.names(), vec!["back", "front"]);
        assert_eq!(service.networks.aliases("front"), vec!["www".to_string()]);
        assert!(service.networks.aliases("back").is_empty());
        assert_eq!(service.ports.len(), 3);
        assert!(matches!(service.ports[0], PortEntry::Number(80)));
        assert!(matches!(service.ports[2], PortEntry::Long(_)));
        assert_eq!(service.secrets[1].source(), "cert");
        assert_eq!(service.labels.to_map().get("weight").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_environment_resolution() {
        let mut lookup = BTreeMap::new();
        lookup.insert("HOME_DIR".to_string(), "/home/app".to_string());

        let list = Environment::List(vec![
            "MODE=prod".to_string(),
            "HOME_DIR".to_string(),
            "ABSENT".to_string(),
        ]);
        assert_eq!(
            list.resolve(&lookup),
            vec!["HOME_DIR=/home/app".to_string(), "MODE=prod".to_string()]
        );

        let mut map = BTreeMap::new();
        map.insert("PORT".to_string(), Some(Scalar::Int(8000)));
        map.insert("HOME_DIR".to_string(), None);
        assert_eq!(
            Environment::Map(map).resolve(&lookup),
            vec!["HOME_DIR=/home/app".to_string(), "PORT=8000".to_string()]
        );
    }

    #[test]
    fn test_external_forms() {
        let network: NetworkConfig =
            serde_yaml::from_str("external: true").expect("parse network");
        assert_eq!(
            external_name("edge", network.external.as_ref(), network.name.as_deref()),
            Some("edge")
        );

        let legacy: NetworkConfig =
            serde_yaml::from_str("external:\n  name: real-edge").expect("parse network");
        assert_eq!(
            external_name("edge", legacy.external.as_ref(), legacy.name.as_deref()),
            Some("real-edge")
        );

        let managed: NetworkConfig =
            serde_yaml::from_str("external: false").expect("parse network");
        assert_eq!(
            external_name("edge", managed.external.as_ref(), managed.name.as_deref()),
            None
        );
    }

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("  a  b "), vec!["a", "b"]);
        assert_eq!(split_command("sh -c 'echo hi'"), vec!["sh", "-c", "echo hi"]);
        assert_eq!(split_command("x ''"), vec!["x", ""]);
        assert!(split_command("").is_empty());
    }
}
