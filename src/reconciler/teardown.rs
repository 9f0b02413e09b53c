//! Stack teardown.
//!
//! Removal is driven only by the namespace label. Services go first so the
//! networks and secrets they hold can be released afterwards.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::docker::{ClusterGateway, LiveResource, StackObserver};
use crate::error::{DeployError, Result};
use crate::namespace::Namespace;

use super::resource::{RemovalOutcome, remove_all};

/// What a teardown did.
#[derive(Debug, Clone, Serialize)]
pub struct TeardownReport {
    /// Stack name.
    pub namespace: String,
    /// When the teardown finished.
    pub finished_at: DateTime<Utc>,
    /// Removed and failed resources, in removal order.
    pub outcome: RemovalOutcome,
}

impl TeardownReport {
    /// Returns true if any removal failed.
    #[must_use]
    pub fn had_failures(&self) -> bool {
        self.outcome.had_failures()
    }

    /// Returns true if the stack had no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcome.removed.is_empty() && self.outcome.failed.is_empty()
    }
}

/// Removes stacks through a cluster gateway.
#[derive(Debug)]
pub struct StackRemover<'a, G: ClusterGateway + ?Sized> {
    /// Cluster gateway.
    gateway: &'a G,
    /// Checked between cluster operations.
    cancel: CancellationToken,
}

impl<'a, G: ClusterGateway + ?Sized> StackRemover<'a, G> {
    /// Creates a remover.
    #[must_use]
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Removes every service, network and secret labelled with `namespace`.
    ///
    /// Individual removal failures are logged and reported through
    /// [`TeardownReport::had_failures`]; the remaining resources are still
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack's resources cannot be listed, or
    /// [`DeployError::Cancelled`] once cancellation is observed.
    pub async fn remove(&self, namespace: &Namespace) -> Result<TeardownReport> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled.into());
        }

        let observer = StackObserver::new(self.gateway);
        let services = observer.stack_services(namespace).await?;
        let networks = observer.stack_networks(namespace).await?;
        let secrets = observer.stack_secrets(namespace).await?;

        if services.is_empty() && networks.is_empty() && secrets.is_empty() {
            info!("Nothing found in stack: {namespace}");
        } else {
            info!("Removing stack: {namespace}");
        }

        let mut outcome = RemovalOutcome::default();
        let batches: [Vec<LiveResource>; 3] = [
            services.iter().map(LiveResource::from).collect(),
            networks.iter().map(LiveResource::from).collect(),
            secrets.iter().map(LiveResource::from).collect(),
        ];
        for batch in &batches {
            if let Err(e) = remove_all(self.gateway, batch, &self.cancel, &mut outcome).await {
                warn!(
                    "Teardown of stack {namespace} stopped after removing {} resources",
                    outcome.removed.len()
                );
                for resource in &outcome.removed {
                    warn!("Already removed: {} {}", resource.kind, resource.name);
                }
                return Err(e);
            }
        }

        if outcome.had_failures() {
            warn!(
                "Failed to remove {} resources from stack {namespace}",
                outcome.failed.len()
            );
        }

        Ok(TeardownReport {
            namespace: namespace.name().to_string(),
            finished_at: Utc::now(),
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::ResourceKind;
    use crate::error::StackError;
    use crate::reconciler::testing::{Call, FakeCluster};

    fn populated() -> FakeCluster {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_web", "ns");
        cluster.add_service("ns_db", "ns");
        cluster.add_network("ns_default", "swarm", Some("ns"));
        cluster.add_secret("ns_token", Some("ns"));
        cluster.add_service("other_web", "other");
        cluster.add_network("other_default", "swarm", Some("other"));
        cluster
    }

    #[tokio::test]
    async fn test_removes_services_before_networks_and_secrets() {
        let cluster = populated();
        let report = StackRemover::new(&cluster)
            .remove(&Namespace::new("ns"))
            .await
            .expect("teardown");

        assert!(!report.had_failures());
        let calls: Vec<Call> = cluster.calls().into_iter().filter(Call::is_mutation).collect();
        let last_service = calls
            .iter()
            .rposition(|call| matches!(call, Call::RemoveService(_)))
            .expect("service removals");
        assert_eq!(last_service, 1);
        assert_eq!(
            &calls[2..],
            &[
                Call::RemoveNetwork("ns_default".to_string()),
                Call::RemoveSecret("ns_token".to_string()),
            ]
        );
        assert_eq!(cluster.service_names(), vec!["other_web"]);
        assert_eq!(cluster.network_names(), vec!["other_default"]);
        assert!(cluster.secret_names().is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_going() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_a", "ns");
        cluster.add_service("ns_b", "ns");
        cluster.add_network("ns_default", "swarm", Some("ns"));
        cluster.fail_removal_of("ns_a");

        let report = StackRemover::new(&cluster)
            .remove(&Namespace::new("ns"))
            .await
            .expect("best effort");

        let calls: Vec<Call> = cluster.calls().into_iter().filter(Call::is_mutation).collect();
        assert_eq!(
            calls,
            vec![
                Call::RemoveService("ns_a".to_string()),
                Call::RemoveService("ns_b".to_string()),
                Call::RemoveNetwork("ns_default".to_string()),
            ]
        );
        assert!(report.had_failures());
        assert_eq!(report.outcome.failed.len(), 1);
        assert_eq!(report.outcome.failed[0].resource.kind, ResourceKind::Service);
        assert_eq!(report.outcome.removed.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_stack() {
        let cluster = populated();
        let report = StackRemover::new(&cluster)
            .remove(&Namespace::new("ghost"))
            .await
            .expect("teardown");
        assert!(report.is_empty());
        assert!(!report.had_failures());
        assert!(cluster.calls().iter().all(|call| !call.is_mutation()));
    }

    #[tokio::test]
    async fn test_teardown_does_not_require_a_manager_check() {
        let cluster = populated();
        StackRemover::new(&cluster)
            .remove(&Namespace::new("ns"))
            .await
            .expect("teardown");
        assert!(!cluster.calls().contains(&Call::DaemonInfo));
    }

    #[tokio::test]
    async fn test_cancelled_teardown() {
        let cluster = populated();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = StackRemover::new(&cluster)
            .with_cancellation(cancel)
            .remove(&Namespace::new("ns"))
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert_eq!(cluster.service_names().len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_mid_teardown_stops_further_removals() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_a", "ns");
        cluster.add_service("ns_b", "ns");
        cluster.add_network("ns_default", "swarm", Some("ns"));
        let cancel = CancellationToken::new();
        cluster.cancel_after("ns_a", cancel.clone());

        let err = StackRemover::new(&cluster)
            .with_cancellation(cancel)
            .remove(&Namespace::new("ns"))
            .await
            .expect_err("cancelled");

        assert!(matches!(err, StackError::Deploy(DeployError::Cancelled)));
        let calls: Vec<Call> = cluster.calls().into_iter().filter(Call::is_mutation).collect();
        assert_eq!(calls, vec![Call::RemoveService("ns_a".to_string())]);
        assert_eq!(cluster.service_names(), vec!["ns_b"]);
        assert_eq!(cluster.network_names(), vec!["ns_default"]);
    }
}
