//! Cluster gateway trait definition.
//!
//! This module defines the interface the deploy and teardown engines use to
//! talk to the cluster. [`DockerClient`](super::DockerClient) implements it
//! over the Engine HTTP API; tests implement it in memory.

use async_trait::async_trait;

use crate::error::Result;
use super::types::{
    Filters, Network, NetworkCreateRequest, Secret, Service, ServiceCreateResponse,
    ServiceUpdateResponse, ServiceWriteOptions, SwarmSecretSpec, SwarmServiceSpec, SystemInfo,
    Version,
};

/// Operations on the swarm control plane.
///
/// Reads that target a single object by name return
/// [`DockerError::NotFound`](crate::error::DockerError::NotFound) when the
/// object does not exist. Updates carry the version last read; a stale
/// version is rejected by the cluster and surfaced unchanged.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Returns daemon information, including swarm membership.
    async fn daemon_info(&self) -> Result<SystemInfo>;

    /// Lists services matching the filters.
    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>>;

    /// Creates a service and returns its ID and warnings.
    async fn create_service(
        &self,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceCreateResponse>;

    /// Replaces the specification of a service.
    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceUpdateResponse>;

    /// Removes a service.
    async fn remove_service(&self, id: &str) -> Result<()>;

    /// Lists networks matching the filters.
    async fn list_networks(&self, filters: &Filters) -> Result<Vec<Network>>;

    /// Inspects a network by name or ID.
    async fn inspect_network(&self, name: &str) -> Result<Network>;

    /// Creates a network and returns its ID.
    async fn create_network(&self, request: &NetworkCreateRequest) -> Result<String>;

    /// Removes a network.
    async fn remove_network(&self, id: &str) -> Result<()>;

    /// Lists secrets matching the filters.
    async fn list_secrets(&self, filters: &Filters) -> Result<Vec<Secret>>;

    /// Inspects a secret by name or ID.
    async fn inspect_secret(&self, name: &str) -> Result<Secret>;

    /// Creates a secret and returns its ID.
    async fn create_secret(&self, spec: &SwarmSecretSpec) -> Result<String>;

    /// Replaces the specification of a secret.
    async fn update_secret(&self, id: &str, version: Version, spec: &SwarmSecretSpec) -> Result<()>;

    /// Removes a secret.
    async fn remove_secret(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl ClusterGateway for Box<dyn ClusterGateway> {
    async fn daemon_info(&self) -> Result<SystemInfo> {
        (**self).daemon_info().await
    }

    async fn list_services(&self, filters: &Filters) -> Result<Vec<Service>> {
        (**self).list_services(filters).await
    }

    async fn create_service(
        &self,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceCreateResponse> {
        (**self).create_service(spec, options).await
    }

    async fn update_service(
        &self,
        id: &str,
        version: Version,
        spec: &SwarmServiceSpec,
        options: &ServiceWriteOptions,
    ) -> Result<ServiceUpdateResponse> {
        (**self).update_service(id, version, spec, options).await
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        (**self).remove_service(id).await
    }

    async fn list_networks(&self, filters: &Filters) -> Result<Vec<Network>> {
        (**self).list_networks(filters).await
    }

    async fn inspect_network(&self, name: &str) -> Result<Network> {
        (**self).inspect_network(name).await
    }

    async fn create_network(&self, request: &NetworkCreateRequest) -> Result<String> {
        (**self).create_network(request).await
    }

    async fn remove_network(&self, id: &str) -> Result<()> {
        (**self).remove_network(id).await
    }

    async fn list_secrets(&self, filters: &Filters) -> Result<Vec<Secret>> {
        (**self).list_secrets(filters).await
    }

    async fn inspect_secret(&self, name: &str) -> Result<Secret> {
        (**self).inspect_secret(name).await
    }

    async fn create_secret(&self, spec: &SwarmSecretSpec) -> Result<String> {
        (**self).create_secret(spec).await
    }

    async fn update_secret(&self, id: &str, version: Version, spec: &SwarmSecretSpec) -> Result<()> {
        (**self).update_secret(id, version, spec).await
    }

    async fn remove_secret(&self, id: &str) -> Result<()> {
        (**self).remove_secret(id).await
    }
}
