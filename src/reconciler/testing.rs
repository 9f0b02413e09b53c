//! In-memory cluster used by the engine tests.
//!
//! Applies label and name filters the way the daemon does, enforces update
//! versions, and records every call so tests can assert on ordering.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::docker::ClusterGateway;
use crate::docker::types::{
    Filters, Labels, Network, NetworkCreateRequest, Secret, Service, ServiceCreateResponse,
    ServiceUpdateResponse, ServiceWriteOptions, SwarmInfo, SwarmSecretSpec, SwarmServiceSpec,
    SystemInfo, Version,
};
use crate::error::{DockerError, Result};
use crate::namespace::LABEL_NAMESPACE;

/// A recorded gateway call. Object calls carry the object name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DaemonInfo,
    ListServices(Filters),
    CreateService(String),
    UpdateService(String),
    RemoveService(String),
    ListNetworks(Filters),
    InspectNetwork(String),
    CreateNetwork(String),
    RemoveNetwork(String),
    ListSecrets(Filters),
    InspectSecret(String),
    CreateSecret(String),
    UpdateSecret(String),
    RemoveSecret(String),
}

impl Call {
    pub const fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::CreateService(_)
                | Self::UpdateService(_)
                | Self::RemoveService(_)
                | Self::CreateNetwork(_)
                | Self::RemoveNetwork(_)
                | Self::CreateSecret(_)
                | Self::UpdateSecret(_)
                | Self::RemoveSecret(_)
        )
    }

    pub const fn is_creation(&self) -> bool {
        matches!(
            self,
            Self::CreateService(_) | Self::CreateNetwork(_) | Self::CreateSecret(_)
        )
    }

    pub const fn is_service_write(&self) -> bool {
        matches!(self, Self::CreateService(_) | Self::UpdateService(_))
    }

    pub fn object_name(&self) -> Option<&str> {
        match self {
            Self::CreateService(name)
            | Self::UpdateService(name)
            | Self::RemoveService(name)
            | Self::InspectNetwork(name)
            | Self::CreateNetwork(name)
            | Self::RemoveNetwork(name)
            | Self::InspectSecret(name)
            | Self::CreateSecret(name)
            | Self::UpdateSecret(name)
            | Self::RemoveSecret(name) => Some(name),
            Self::DaemonInfo | Self::ListServices(_) | Self::ListNetworks(_) | Self::ListSecrets(_) => {
                None
            }
        }
    }

    pub const fn filters(&self) -> Option<&Filters> {
        match self {
            Self::ListServices(filters) | Self::ListNetworks(filters) | Self::ListSecrets(filters) => {
                Some(filters)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    manager: bool,
    next_id: u64,
    services: BTreeMap<String, Service>,
    networks: BTreeMap<String, Network>,
    secrets: BTreeMap<String, Secret>,
    calls: Vec<Call>,
    failing_removals: BTreeSet<String>,
    update_warnings: Vec<String>,
    racing_writer: bool,
    registry_auth: Vec<Option<String>>,
    cancel_after: Option<(String, CancellationToken)>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    /// Fires the armed token once the named object has been written or removed.
    fn applied(&self, name: &str) {
        if let Some((target, token)) = &self.cancel_after {
            if target == name {
                token.cancel();
            }
        }
    }

    fn check_removal(&self, name: &str) -> Result<()> {
        if self.failing_removals.contains(name) {
            return Err(DockerError::api_error(500, format!("{name} is in use")).into());
        }
        Ok(())
    }
}

fn stack_labels(namespace: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_NAMESPACE.to_string(), namespace.to_string());
    labels
}

fn conflict(name: &str) -> crate::error::StackError {
    DockerError::api_error(409, format!("name {name} is already in use")).into()
}

fn out_of_sequence() -> crate::error::StackError {
    DockerError::api_error(500, "rpc error: update out of sequence").into()
}

/// Recording in-memory swarm.
#[derive(Debug)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    /// An empty cluster whose daemon is a manager.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                manager: true,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("cluster state lock")
    }

    pub fn set_manager(&self, manager: bool) {
        self.state().manager = manager;
    }

    /// Adds a network. `namespace` of `None` leaves it unlabelled.
    pub fn add_network(&self, name: &str, scope: &str, namespace: Option<&str>) {
        let mut state = self.state();
        let id = state.next_id("net");
        state.networks.insert(
            id.clone(),
            Network {
                id,
                name: name.to_string(),
                scope: scope.to_string(),
                driver: "overlay".to_string(),
                labels: namespace.map(stack_labels).unwrap_or_default(),
            },
        );
    }

    pub fn add_service(&self, name: &str, namespace: &str) {
        let mut state = self.state();
        let id = state.next_id("svc");
        state.services.insert(
            id.clone(),
            Service {
                id,
                version: Version { index: 1 },
                spec: SwarmServiceSpec {
                    name: name.to_string(),
                    labels: stack_labels(namespace),
                    ..SwarmServiceSpec::default()
                },
            },
        );
    }

    pub fn add_secret(&self, name: &str, namespace: Option<&str>) {
        let mut state = self.state();
        let id = state.next_id("sec");
        state.secrets.insert(
            id.clone(),
            Secret {
                id,
                version: Version { index: 1 },
                spec: SwarmSecretSpec {
                    name: name.to_string(),
                    labels: namespace.map(stack_labels).unwrap_or_default(),
                    data: String::new(),
                },
            },
        );
    }

    /// Makes removal of the named object fail.
    pub fn fail_removal_of(&self, name: &str) {
        self.state().failing_removals.insert(name.to_string());
    }

    /// Warnings returned by every service update.
    pub fn set_update_warnings(&self, warnings: &[&str]) {
        self.state().update_warnings = warnings.iter().map(ToString::to_string).collect();
    }

    /// Cancels `token` right after the named object is created, updated or removed.
    pub fn cancel_after(&self, name: &str, token: CancellationToken) {
        self.state().cancel_after = Some((name.to_string(), token));
    }

    /// Simulates another client writing each service right after it is read.
    pub fn race_service_writes(&self) {
        self.state().racing_writer = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn registry_auth(&self) -> Vec<Option<String>> {
        self.state().registry_auth.clone()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state()
            .services
            .values()
            .find(|s| s.spec.name == name)
            .cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().services.values().map(|s| s.spec.name.clone()).collect();
        names.sort();
        names
    }

    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().networks.values().map(|n| n.name.clone()).collect();
        names.sort();
        names
    }

    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().secrets.values().map(|s| s.spec.name.clone()).collect();
        names.sort();
        names
    }

    pub fn secret_version(&self, name: &str) -> Option<u64> {
        self.state()
            .secrets
            .values()
            .find(|s| s.spec.name == name)
            .map(|s| s.version.index)
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn daemon_info(&self) -> Result<SystemInfo> {
        let mut state = self.state();
        state.calls.push(Call::DaemonInfo);
        Ok(SystemInfo {
            swarm: SwarmInfo {
                node_id: "node1".to_string(),
                local_node_state: if state.manager { "active" } else { "inactive" }.to_string(),
                control_available: state.manager,
            },
        })
    }

    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>> {
        let mut state = self.state();
        state.calls.push(Call::ListServices(filters.clone()));
        let found: Vec<Service> = state
            .services
            .values()
            .filter(|s| filters.matches(&s.spec.name, &s.spec.labels))
            .cloned()
            .collect();

        if state.racing_writer && !filters.values("name").is_empty() {
            for service in &found {
                if let Some(live) = state.services.get_mut(&service.id) {
                    live.version.index += 1;
                }
            }
        }
        Ok(found)
    }

    async fn create_service(
        &self,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceCreateResponse> {
        let mut state = self.state();
        state.calls.push(Call::CreateService(spec.name.clone()));
        state.registry_auth.push(options.encoded_registry_auth.clone());
        if state.services.values().any(|s| s.spec.name == spec.name) {
            return Err(conflict(&spec.name));
        }

        let id = state.next_id("svc");
        state.services.insert(
            id.clone(),
            Service {
                id: id.clone(),
                version: Version { index: 1 },
                spec: spec.clone(),
            },
        );
        state.applied(&spec.name);
        Ok(ServiceCreateResponse {
            id,
            warnings: Vec::new(),
        })
    }

    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceUpdateResponse> {
        let mut state = self.state();
        state.calls.push(Call::UpdateService(spec.name.clone()));
        state.registry_auth.push(options.encoded_registry_auth.clone());
        let warnings = state.update_warnings.clone();

        let service = state
            .services
            .get_mut(id)
            .ok_or_else(|| DockerError::not_found(format!("service {id}")))?;
        if service.version != version {
            return Err(out_of_sequence());
        }
        service.version.index += 1;
        service.spec = spec.clone();
        state.applied(&spec.name);
        Ok(ServiceUpdateResponse { warnings })
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = state
            .services
            .get(id)
            .map(|s| s.spec.name.clone())
            .ok_or_else(|| DockerError::not_found(format!("service {id}")))?;
        state.calls.push(Call::RemoveService(name.clone()));
        state.check_removal(&name)?;
        state.services.remove(id);
        state.applied(&name);
        Ok(())
    }

    async fn list_networks(&self, filters: &Filters) -> Result<Vec<Network>> {
        let mut state = self.state();
        state.calls.push(Call::ListNetworks(filters.clone()));
        Ok(state
            .networks
            .values()
            .filter(|n| filters.matches(&n.name, &n.labels))
            .cloned()
            .collect())
    }

    async fn inspect_network(&self, name: &str) -> Result<Network> {
        let mut state = self.state();
        state.calls.push(Call::InspectNetwork(name.to_string()));
        state
            .networks
            .values()
            .find(|n| n.name == name || n.id == name)
            .cloned()
            .ok_or_else(|| DockerError::not_found(format!("network {name}")).into())
    }

    async fn create_network(&self, request: &NetworkCreateRequest) -> Result<String> {
        let mut state = self.state();
        state.calls.push(Call::CreateNetwork(request.name.clone()));
        if state.networks.values().any(|n| n.name == request.name) {
            return Err(conflict(&request.name));
        }

        let id = state.next_id("net");
        state.networks.insert(
            id.clone(),
            Network {
                id: id.clone(),
                name: request.name.clone(),
                scope: "swarm".to_string(),
                driver: request.driver.clone(),
                labels: request.labels.clone(),
            },
        );
        state.applied(&request.name);
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = state
            .networks
            .get(id)
            .map(|n| n.name.clone())
            .ok_or_else(|| DockerError::not_found(format!("network {id}")))?;
        state.calls.push(Call::RemoveNetwork(name.clone()));
        state.check_removal(&name)?;
        state.networks.remove(id);
        state.applied(&name);
        Ok(())
    }

    async fn list_secrets(&self, filters: &Filters) -> Result<Vec<Secret>> {
        let mut state = self.state();
        state.calls.push(Call::ListSecrets(filters.clone()));
        Ok(state
            .secrets
            .values()
            .filter(|s| filters.matches(&s.spec.name, &s.spec.labels))
            .cloned()
            .collect())
    }

    async fn inspect_secret(&self, name: &str) -> Result<Secret> {
        let mut state = self.state();
        state.calls.push(Call::InspectSecret(name.to_string()));
        state
            .secrets
            .values()
            .find(|s| s.spec.name == name || s.id == name)
            .cloned()
            .ok_or_else(|| DockerError::not_found(format!("secret {name}")).into())
    }

    async fn create_secret(&self, spec: &SwarmSecretSpec) -> Result<String> {
        let mut state = self.state();
        state.calls.push(Call::CreateSecret(spec.name.clone()));
        if state.secrets.values().any(|s| s.spec.name == spec.name) {
            return Err(conflict(&spec.name));
        }

        let id = state.next_id("sec");
        state.secrets.insert(
            id.clone(),
            Secret {
                id: id.clone(),
                version: Version { index: 1 },
                spec: spec.clone(),
            },
        );
        state.applied(&spec.name);
        Ok(id)
    }

    async fn update_secret(&self, id: &str, version: Version, spec: &SwarmSecretSpec) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::UpdateSecret(spec.name.clone()));
        let secret = state
            .secrets
            .get_mut(id)
            .ok_or_else(|| DockerError::not_found(format!("secret {id}")))?;
        if secret.version != version {
            return Err(out_of_sequence());
        }
        secret.version.index += 1;
        secret.spec = spec.clone();
        state.applied(&spec.name);
        Ok(())
    }

    async fn remove_secret(&self, id: &str) -> Result<()> {
        let mut state = self.state();
        let name = state
            .secrets
            .get(id)
            .map(|s| s.spec.name.clone())
            .ok_or_else(|| DockerError::not_found(format!("secret {id}")))?;
        state.calls.push(Call::RemoveSecret(name.clone()));
        state.check_removal(&name)?;
        state.secrets.remove(id);
        state.applied(&name);
        Ok(())
    }
}
