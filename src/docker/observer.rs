//! Stack observer for querying live cluster objects.
//!
//! Stack membership is decided only by the namespace label; names are never
//! used to discover objects, so a stack can never see another stack's
//! resources even when their names share a prefix.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::Result;
use crate::namespace::{LABEL_NAMESPACE, Namespace};

use super::gateway::ClusterGateway;
use super::types::{Network, Secret, Service};

/// Read-only view of the stacks on a cluster.
#[derive(Debug)]
pub struct StackObserver<'a, G: ClusterGateway + ?Sized> {
    /// Cluster gateway.
    gateway: &'a G,
}

/// A stack and the number of services it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackSummary {
    /// Stack name.
    pub name: String,
    /// Number of services labelled with the stack.
    pub services: usize,
}

impl<'a, G: ClusterGateway + ?Sized> StackObserver<'a, G> {
    /// Creates an observer over a gateway.
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Lists the services of a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn stack_services(&self, namespace: &Namespace) -> Result<Vec<Service>> {
        let services = self.gateway.list_services(&namespace.label_filter()).await?;
        debug!("Found {} services in stack {namespace}", services.len());
        Ok(services)
    }

    /// Lists the networks of a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn stack_networks(&self, namespace: &Namespace) -> Result<Vec<Network>> {
        let networks = self.gateway.list_networks(&namespace.label_filter()).await?;
        debug!("Found {} networks in stack {namespace}", networks.len());
        Ok(networks)
    }

    /// Lists the secrets of a stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn stack_secrets(&self, namespace: &Namespace) -> Result<Vec<Secret>> {
        let secrets = self.gateway.list_secrets(&namespace.label_filter()).await?;
        debug!("Found {} secrets in stack {namespace}", secrets.len());
        Ok(secrets)
    }

    /// Finds a stack service by its exact scoped name.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn find_service(
        &self,
        namespace: &Namespace,
        scoped_name: &str,
    ) -> Result<Option<Service>> {
        let filters = namespace.label_filter().with("name", scoped_name);
        let services = self.gateway.list_services(&filters).await?;
        Ok(services.into_iter().find(|s| s.spec.name == scoped_name))
    }

    /// Lists every stack that runs at least one service.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails.
    pub async fn list_stacks(&self) -> Result<Vec<StackSummary>> {
        let services = self
            .gateway
            .list_services(&Namespace::all_stacks_filter())
            .await?;

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for service in &services {
            if let Some(stack) = service.spec.labels.get(LABEL_NAMESPACE) {
                *counts.entry(stack.clone()).or_default() += 1;
            }
        }

        Ok(counts
            .into_iter()
            .map(|(name, services)| StackSummary { name, services })
            .collect())
    }
}
