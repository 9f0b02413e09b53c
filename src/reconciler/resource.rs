//! Per-resource reconciliation.
//!
//! Secrets and services share one flow: read the live object by name, then
//! update it with the version just read or create it when absent. Each kind
//! plugs its payload into that flow through [`Reconcile`]. Removal is the
//! best-effort counterpart used by prune and teardown.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::docker::{ClusterGateway, LiveResource, ResourceKind};
use crate::error::{DeployError, Result, StackError};

/// What a create or update call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Written {
    /// ID of the written object.
    pub id: String,
    /// Warnings returned by the cluster.
    pub warnings: Vec<String>,
}

/// Whether a resource was created or updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The resource did not exist.
    Created,
    /// The resource existed and was updated in place.
    Updated,
}

/// Outcome of reconciling one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Create or update.
    pub action: Action,
    /// The written object.
    pub resource: LiveResource,
    /// Warnings returned by the cluster.
    pub warnings: Vec<String>,
}

/// Read, create and update for one kind of resource.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Desired specification.
    type Desired: Send + Sync;
    /// Live object, carrying the identity and version needed to update it.
    type Live: Send;

    /// Kind of resource handled.
    const KIND: ResourceKind;

    /// Cluster name of a desired resource.
    fn name(desired: &Self::Desired) -> &str;

    /// Reads the live object, `None` when it does not exist.
    async fn read(&self, desired: &Self::Desired) -> Result<Option<Self::Live>>;

    /// Creates the resource.
    async fn create(&self, desired: &Self::Desired) -> Result<Written>;

    /// Updates the resource using the identity and version of `live`.
    async fn update(&self, live: Self::Live, desired: &Self::Desired) -> Result<Written>;
}

/// Brings one resource in line with its desired specification.
///
/// # Errors
///
/// Returns [`DeployError::ResourceRead`], [`DeployError::ResourceCreate`] or
/// [`DeployError::ResourceUpdate`] wrapping the gateway failure. Deploy
/// errors raised by the handler, such as registry auth failures, are
/// returned unchanged.
pub async fn reconcile_one<H: Reconcile + ?Sized>(
    handler: &H,
    desired: &H::Desired,
) -> Result<Applied> {
    let name = H::name(desired);

    let live = handler
        .read(desired)
        .await
        .map_err(|e| wrap(e, |reason| DeployError::ResourceRead {
            kind: H::KIND.to_string(),
            name: name.to_string(),
            reason,
        }))?;

    let (action, written) = match live {
        Some(live) => {
            let written = handler.update(live, desired).await.map_err(|e| {
                wrap(e, |reason| DeployError::ResourceUpdate {
                    kind: H::KIND.to_string(),
                    name: name.to_string(),
                    reason,
                })
            })?;
            (Action::Updated, written)
        }
        None => {
            let written = handler.create(desired).await.map_err(|e| {
                wrap(e, |reason| DeployError::ResourceCreate {
                    kind: H::KIND.to_string(),
                    name: name.to_string(),
                    reason,
                })
            })?;
            (Action::Created, written)
        }
    };

    Ok(Applied {
        action,
        resource: LiveResource {
            kind: H::KIND,
            id: written.id,
            name: name.to_string(),
        },
        warnings: written.warnings,
    })
}

fn wrap(err: StackError, into: impl FnOnce(String) -> DeployError) -> StackError {
    match err {
        StackError::Deploy(_) => err,
        other => into(other.to_string()).into(),
    }
}

/// A removal that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovalFailure {
    /// The resource that could not be removed.
    pub resource: LiveResource,
    /// Reason reported by the cluster.
    pub reason: String,
}

/// Result of a best-effort removal batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalOutcome {
    /// Resources removed.
    pub removed: Vec<LiveResource>,
    /// Resources that could not be removed.
    pub failed: Vec<RemovalFailure>,
}

impl RemovalOutcome {
    /// Returns true if any removal failed.
    #[must_use]
    pub fn had_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Removes each resource in order, continuing past failures.
///
/// Results are appended to `outcome` as they happen, so it also holds the
/// partial result when the batch is cancelled.
///
/// # Errors
///
/// Returns [`DeployError::Cancelled`] if `cancel` fires; removals already
/// made stay made. Individual removal failures are recorded in the outcome.
pub async fn remove_all<G: ClusterGateway + ?Sized>(
    gateway: &G,
    resources: &[LiveResource],
    cancel: &CancellationToken,
    outcome: &mut RemovalOutcome,
) -> Result<()> {
    for resource in resources {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled.into());
        }

        info!("Removing {} {}", resource.kind, resource.name);
        let result = match resource.kind {
            ResourceKind::Service => gateway.remove_service(&resource.id).await,
            ResourceKind::Network => gateway.remove_network(&resource.id).await,
            ResourceKind::Secret => gateway.remove_secret(&resource.id).await,
        };

        match result {
            Ok(()) => outcome.removed.push(resource.clone()),
            Err(e) => {
                error!("Failed to remove {} {}: {}", resource.kind, resource.id, e);
                outcome.failed.push(RemovalFailure {
                    resource: resource.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(())
}
