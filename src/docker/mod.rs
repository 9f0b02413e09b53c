//! Docker Engine API integration.
//!
//! This module provides:
//! - The [`ClusterGateway`] trait the engines are written against
//! - An HTTP client for the Engine API
//! - Label-scoped stack queries
//! - Registry credential resolution

mod auth;
mod client;
mod gateway;
mod observer;
pub mod types;

pub use auth::{DEFAULT_REGISTRY, DockerConfigAuth, RegistryAuthResolver, registry_host};
pub use client::{DEFAULT_API_VERSION, DEFAULT_DOCKER_HOST, DockerClient, DockerSettings};
pub use gateway::ClusterGateway;
pub use observer::{StackObserver, StackSummary};
pub use types::{Filters, LiveResource, ResourceKind, Version};

#[cfg(test)]
pub use auth::MockRegistryAuthResolver;
#[cfg(test)]
pub use gateway::MockClusterGateway;
