//! Desired stack state.
//!
//! These types are what the reconciler consumes: every name is already
//! scoped, every label already carries the namespace, and every payload is
//! loaded. Nothing here refers back to the compose document.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::docker::types::{
    Ipam, Labels, NetworkCreateRequest, SwarmSecretSpec, SwarmServiceSpec,
};

/// Driver used for networks that do not name one.
pub const DEFAULT_NETWORK_DRIVER: &str = "overlay";

/// A network the stack owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedNetworkSpec {
    /// Name in the compose document.
    pub internal_name: String,
    /// Name on the cluster.
    pub name: String,
    /// Driver; [`DEFAULT_NETWORK_DRIVER`] when `None`.
    pub driver: Option<String>,
    /// Driver options.
    pub options: BTreeMap<String, String>,
    /// Labels, including the namespace label.
    pub labels: Labels,
    /// Allow standalone containers to attach.
    pub attachable: bool,
    /// Restrict external access.
    pub internal: bool,
    /// IP address management.
    pub ipam: Option<Ipam>,
}

impl ManagedNetworkSpec {
    /// Builds the creation request for this network.
    #[must_use]
    pub fn create_request(&self) -> NetworkCreateRequest {
        NetworkCreateRequest {
            name: self.name.clone(),
            driver: self
                .driver
                .clone()
                .unwrap_or_else(|| DEFAULT_NETWORK_DRIVER.to_string()),
            labels: self.labels.clone(),
            options: self.options.clone(),
            attachable: self.attachable,
            internal: self.internal,
            ipam: self.ipam.clone(),
            check_duplicate: true,
        }
    }
}

/// A network the stack uses but does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalNetworkRef {
    /// Name in the compose document.
    pub internal_name: String,
    /// Name on the cluster.
    pub name: String,
}

/// A secret the stack owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretSpec {
    /// Name in the compose document.
    pub internal_name: String,
    /// Name on the cluster.
    pub name: String,
    /// Labels, including the namespace label.
    pub labels: Labels,
    /// Payload.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl SecretSpec {
    /// Builds the wire specification with the payload encoded.
    #[must_use]
    pub fn swarm_spec(&self) -> SwarmSecretSpec {
        SwarmSecretSpec {
            name: self.name.clone(),
            labels: self.labels.clone(),
            data: STANDARD.encode(&self.data),
        }
    }
}

/// A service the stack owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    /// Name in the compose document.
    pub internal_name: String,
    /// Full service specification with a scoped name.
    pub spec: SwarmServiceSpec,
}

impl ServiceSpec {
    /// Name on the cluster.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Image reference.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.spec.task_template.container_spec.image
    }
}

/// Everything a stack should consist of.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DesiredStackSpec {
    /// Networks to create.
    pub networks: Vec<ManagedNetworkSpec>,
    /// Networks that must already exist.
    pub external_networks: Vec<ExternalNetworkRef>,
    /// Secrets to create or update.
    pub secrets: Vec<SecretSpec>,
    /// Services to create or update.
    pub services: Vec<ServiceSpec>,
}

impl DesiredStackSpec {
    /// Internal names of the desired services.
    #[must_use]
    pub fn service_names(&self) -> BTreeSet<&str> {
        self.services
            .iter()
            .map(|s| s.internal_name.as_str())
            .collect()
    }
}
