//! Stack deployment.
//!
//! A deploy runs in a fixed order: manager check, optional prune, external
//! network validation, network creation, secrets, then services. Every step
//! reads live state by namespace label; nothing is remembered between runs.
//! A hard error stops the run where it is. Nothing already applied is
//! rolled back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::docker::types::{Secret, Service, ServiceWriteOptions, SwarmServiceSpec};
use crate::docker::{ClusterGateway, LiveResource, RegistryAuthResolver, ResourceKind, StackObserver};
use crate::error::{DeployError, Result, StackError};
use crate::namespace::Namespace;
use crate::resolver::{DesiredStackSpec, ExternalNetworkRef, ManagedNetworkSpec, SecretSpec, ServiceSpec};

use super::guard::ensure_manager;
use super::resource::{Action, Applied, Reconcile, RemovalOutcome, Written, reconcile_one, remove_all};

/// Scope a network must have to be usable by services.
const SWARM_SCOPE: &str = "swarm";

/// Deploy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Remove stack services that are no longer declared.
    pub prune: bool,
    /// Send registry credentials with service writes.
    pub send_registry_auth: bool,
}

/// What a deploy did.
#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    /// Stack name.
    pub namespace: String,
    /// When the deploy started.
    pub started_at: DateTime<Utc>,
    /// When the deploy finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Resources created.
    pub created: Vec<LiveResource>,
    /// Resources updated in place.
    pub updated: Vec<LiveResource>,
    /// Services pruned, and those that could not be.
    pub pruned: RemovalOutcome,
    /// Warnings returned by the cluster, prefixed with the resource name.
    pub warnings: Vec<String>,
}

impl DeployReport {
    fn new(namespace: &Namespace) -> Self {
        Self {
            namespace: namespace.name().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            created: Vec::new(),
            updated: Vec::new(),
            pruned: RemovalOutcome::default(),
            warnings: Vec::new(),
        }
    }

    fn record(&mut self, applied: Applied) {
        for warning in &applied.warnings {
            warn!("{}: {warning}", applied.resource.name);
            self.warnings.push(format!("{}: {warning}", applied.resource.name));
        }
        match applied.action {
            Action::Created => self.created.push(applied.resource),
            Action::Updated => self.updated.push(applied.resource),
        }
    }

    /// Returns true if pruning left services behind.
    #[must_use]
    pub fn prune_failed(&self) -> bool {
        self.pruned.had_failures()
    }
}

/// Deploys stacks through a cluster gateway.
pub struct StackDeployer<'a, G: ClusterGateway + ?Sized> {
    /// Cluster gateway.
    gateway: &'a G,
    /// Registry credential source, used when registry auth is requested.
    auth: Option<&'a dyn RegistryAuthResolver>,
    /// Checked between cluster operations.
    cancel: CancellationToken,
}

impl<'a, G: ClusterGateway + ?Sized> StackDeployer<'a, G> {
    /// Creates a deployer without registry credentials.
    #[must_use]
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            auth: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the registry credential source.
    #[must_use]
    pub fn with_registry_auth(mut self, auth: &'a dyn RegistryAuthResolver) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Brings the stack `namespace` in line with `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::NotManager`] before any change if the daemon
    /// is not a manager, an external network error before any creation, a
    /// resource error for the first failing read or write, or
    /// [`DeployError::Cancelled`] once cancellation is observed.
    pub async fn deploy(
        &self,
        namespace: &Namespace,
        desired: &DesiredStackSpec,
        options: DeployOptions,
    ) -> Result<DeployReport> {
        let auth = if options.send_registry_auth {
            Some(self.auth.ok_or_else(|| {
                StackError::internal("registry auth requested without a credential source")
            })?)
        } else {
            None
        };

        info!("Deploying stack {namespace}");
        let mut report = DeployReport::new(namespace);

        self.checkpoint()?;
        ensure_manager(self.gateway).await?;

        if options.prune {
            report.pruned = self.prune(namespace, desired).await?;
        }

        self.validate_external_networks(&desired.external_networks).await?;
        self.create_networks(namespace, &desired.networks, &mut report).await?;
        let secret_ids = self.reconcile_secrets(&desired.secrets, &mut report).await?;
        let services = self.link_secrets(&desired.services, secret_ids).await?;

        let handler = ServiceHandler {
            gateway: self.gateway,
            namespace,
            auth,
        };
        for spec in &services {
            self.checkpoint()?;
            let applied = reconcile_one(&handler, spec).await?;
            report.record(applied);
        }

        report.finished_at = Some(Utc::now());
        info!(
            "Stack {namespace} deployed: {} created, {} updated",
            report.created.len(),
            report.updated.len()
        );
        Ok(report)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Deploy cancelled");
            return Err(DeployError::Cancelled.into());
        }
        Ok(())
    }

    /// Removes stack services that are not desired, continuing past failures.
    async fn prune(&self, namespace: &Namespace, desired: &DesiredStackSpec) -> Result<RemovalOutcome> {
        self.checkpoint()?;
        let wanted = desired.service_names();
        let live = StackObserver::new(self.gateway)
            .stack_services(namespace)
            .await
            .map_err(|e| read_error(ResourceKind::Service, namespace.name(), &e))?;

        let orphans: Vec<LiveResource> = live
            .iter()
            .filter(|service| match namespace.descope(&service.spec.name) {
                Ok(name) => !wanted.contains(name),
                Err(e) => {
                    warn!("Not pruning {}: {e}", service.spec.name);
                    false
                }
            })
            .map(LiveResource::from)
            .collect();

        if orphans.is_empty() {
            debug!("Nothing to prune in stack {namespace}");
        }

        let mut outcome = RemovalOutcome::default();
        remove_all(self.gateway, &orphans, &self.cancel, &mut outcome).await?;
        if outcome.had_failures() {
            warn!("Failed to remove some services from stack {namespace}");
        }
        Ok(outcome)
    }

    async fn validate_external_networks(&self, networks: &[ExternalNetworkRef]) -> Result<()> {
        for network in networks {
            self.checkpoint()?;
            match self.gateway.inspect_network(&network.name).await {
                Ok(live) if live.scope == SWARM_SCOPE => {
                    debug!("External network {} is available", network.name);
                }
                Ok(live) => {
                    return Err(DeployError::ExternalNetworkScopeMismatch {
                        name: network.name.clone(),
                        scope: live.scope,
                    }
                    .into());
                }
                Err(e) if e.is_not_found() => {
                    return Err(DeployError::ExternalNetworkNotFound {
                        name: network.name.clone(),
                    }
                    .into());
                }
                Err(e) => return Err(read_error(ResourceKind::Network, &network.name, &e)),
            }
        }
        Ok(())
    }

    /// Creates the managed networks that do not exist yet. Existing networks
    /// are left as they are.
    async fn create_networks(
        &self,
        namespace: &Namespace,
        networks: &[ManagedNetworkSpec],
        report: &mut DeployReport,
    ) -> Result<()> {
        self.checkpoint()?;
        let existing: BTreeSet<String> = StackObserver::new(self.gateway)
            .stack_networks(namespace)
            .await
            .map_err(|e| read_error(ResourceKind::Network, namespace.name(), &e))?
            .into_iter()
            .map(|network| network.name)
            .collect();

        for network in networks {
            if existing.contains(&network.name) {
                debug!("Network {} already exists", network.name);
                continue;
            }

            self.checkpoint()?;
            info!("Creating network {}", network.name);
            let id = self
                .gateway
                .create_network(&network.create_request())
                .await
                .map_err(|e| DeployError::ResourceCreate {
                    kind: ResourceKind::Network.to_string(),
                    name: network.name.clone(),
                    reason: e.to_string(),
                })?;
            report.created.push(LiveResource {
                kind: ResourceKind::Network,
                id,
                name: network.name.clone(),
            });
        }
        Ok(())
    }

    /// Creates or updates every secret and returns their IDs by name.
    async fn reconcile_secrets(
        &self,
        secrets: &[SecretSpec],
        report: &mut DeployReport,
    ) -> Result<BTreeMap<String, String>> {
        let handler = SecretHandler {
            gateway: self.gateway,
        };
        let mut ids = BTreeMap::new();

        for secret in secrets {
            self.checkpoint()?;
            let applied = reconcile_one(&handler, secret).await?;
            ids.insert(applied.resource.name.clone(), applied.resource.id.clone());
            report.record(applied);
        }
        Ok(ids)
    }

    /// Fills in the secret IDs of every service secret reference. Secrets
    /// the stack does not manage are looked up by name.
    async fn link_secrets(
        &self,
        services: &[ServiceSpec],
        mut ids: BTreeMap<String, String>,
    ) -> Result<Vec<SwarmServiceSpec>> {
        let mut linked = Vec::with_capacity(services.len());

        for service in services {
            let mut spec = service.spec.clone();
            for reference in &mut spec.task_template.container_spec.secrets {
                if let Some(id) = ids.get(&reference.secret_name) {
                    reference.secret_id.clone_from(id);
                    continue;
                }

                self.checkpoint()?;
                let secret = self
                    .gateway
                    .inspect_secret(&reference.secret_name)
                    .await
                    .map_err(|e| read_error(ResourceKind::Secret, &reference.secret_name, &e))?;
                reference.secret_id.clone_from(&secret.id);
                ids.insert(reference.secret_name.clone(), secret.id);
            }
            linked.push(spec);
        }
        Ok(linked)
    }
}

fn read_error(kind: ResourceKind, name: &str, err: &StackError) -> StackError {
    DeployError::ResourceRead {
        kind: kind.to_string(),
        name: name.to_string(),
        reason: err.to_string(),
    }
    .into()
}

/// Secrets are found by name and updated in place.
struct SecretHandler<'a, G: ClusterGateway + ?Sized> {
    gateway: &'a G,
}

#[async_trait]
impl<G: ClusterGateway + ?Sized> Reconcile for SecretHandler<'_, G> {
    type Desired = SecretSpec;
    type Live = Secret;

    const KIND: ResourceKind = ResourceKind::Secret;

    fn name(desired: &SecretSpec) -> &str {
        &desired.name
    }

    async fn read(&self, desired: &SecretSpec) -> Result<Option<Secret>> {
        match self.gateway.inspect_secret(&desired.name).await {
            Ok(secret) => Ok(Some(secret)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, desired: &SecretSpec) -> Result<Written> {
        info!("Creating secret {}", desired.name);
        let id = self.gateway.create_secret(&desired.swarm_spec()).await?;
        Ok(Written {
            id,
            warnings: Vec::new(),
        })
    }

    async fn update(&self, live: Secret, desired: &SecretSpec) -> Result<Written> {
        info!("Updating secret {} (id: {})", desired.name, live.id);
        self.gateway
            .update_secret(&live.id, live.version, &desired.swarm_spec())
            .await?;
        Ok(Written {
            id: live.id,
            warnings: Vec::new(),
        })
    }
}

/// Services are found by exact scoped name among the stack's services.
struct ServiceHandler<'a, G: ClusterGateway + ?Sized> {
    gateway: &'a G,
    namespace: &'a Namespace,
    auth: Option<&'a dyn RegistryAuthResolver>,
}

impl<G: ClusterGateway + ?Sized> ServiceHandler<'_, G> {
    fn write_options(&self, image: &str) -> Result<ServiceWriteOptions> {
        let Some(auth) = self.auth else {
            return Ok(ServiceWriteOptions::default());
        };

        let encoded = auth.encoded_auth(image).map_err(|e| match e {
            StackError::Deploy(DeployError::RegistryAuth { .. }) => e,
            other => DeployError::RegistryAuth {
                image: image.to_string(),
                reason: other.to_string(),
            }
            .into(),
        })?;
        Ok(ServiceWriteOptions {
            encoded_registry_auth: Some(encoded).filter(|token| !token.is_empty()),
        })
    }
}

#[async_trait]
impl<G: ClusterGateway + ?Sized> Reconcile for ServiceHandler<'_, G> {
    type Desired = SwarmServiceSpec;
    type Live = Service;

    const KIND: ResourceKind = ResourceKind::Service;

    fn name(desired: &SwarmServiceSpec) -> &str {
        &desired.name
    }

    async fn read(&self, desired: &SwarmServiceSpec) -> Result<Option<Service>> {
        StackObserver::new(self.gateway)
            .find_service(self.namespace, &desired.name)
            .await
    }

    async fn create(&self, desired: &SwarmServiceSpec) -> Result<Written> {
        let options = self.write_options(&desired.task_template.container_spec.image)?;
        info!("Creating service {}", desired.name);
        let response = self.gateway.create_service(desired, &options).await?;
        Ok(Written {
            id: response.id,
            warnings: response.warnings,
        })
    }

    async fn update(&self, live: Service, desired: &SwarmServiceSpec) -> Result<Written> {
        let options = self.write_options(&desired.task_template.container_spec.image)?;
        info!("Updating service {} (id: {})", desired.name, live.id);
        let response = self
            .gateway
            .update_service(&live.id, live.version, desired, &options)
            .await?;
        Ok(Written {
            id: live.id,
            warnings: response.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::docker::MockRegistryAuthResolver;
    use crate::namespace::LABEL_NAMESPACE;
    use crate::reconciler::testing::{Call, FakeCluster};
    use crate::resolver::resolve;

    const WEB: &str = r"
services:
  web:
    image: nginx:alpine
";

    fn desired(yaml: &str) -> DesiredStackSpec {
        let config = ConfigParser::new()
            .with_environment([("API_TOKEN", "t0k3n")])
            .parse_yaml(yaml, None)
            .expect("load");
        resolve(&config, &Namespace::new("ns")).expect("resolve")
    }

    fn mutations(cluster: &FakeCluster) -> Vec<Call> {
        cluster.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn position(calls: &[Call], wanted: &Call) -> usize {
        calls
            .iter()
            .position(|call| call == wanted)
            .unwrap_or_else(|| panic!("{wanted:?} not called in {calls:?}"))
    }

    async fn deploy(cluster: &FakeCluster, spec: &DesiredStackSpec, options: DeployOptions) -> Result<DeployReport> {
        StackDeployer::new(cluster)
            .deploy(&Namespace::new("ns"), spec, options)
            .await
    }

    #[tokio::test]
    async fn test_fresh_deploy() {
        let cluster = FakeCluster::new();
        let report = deploy(&cluster, &desired(WEB), DeployOptions::default())
            .await
            .expect("deploy");

        assert_eq!(
            mutations(&cluster),
            vec![
                Call::CreateNetwork("ns_default".to_string()),
                Call::CreateService("ns_web".to_string()),
            ]
        );
        assert_eq!(report.created.len(), 2);
        assert!(report.updated.is_empty());
        assert!(report.finished_at.is_some());

        let service = cluster.service("ns_web").expect("service");
        assert_eq!(
            service.spec.labels.get(LABEL_NAMESPACE).map(String::as_str),
            Some("ns")
        );
    }

    #[tokio::test]
    async fn test_redeploy_is_idempotent() {
        let cluster = FakeCluster::new();
        let spec = desired(
            r"
services:
  web:
    image: nginx
    secrets: [token]
secrets:
  token:
    environment: API_TOKEN
",
        );

        deploy(&cluster, &spec, DeployOptions::default()).await.expect("first deploy");
        cluster.clear_calls();
        let report = deploy(&cluster, &spec, DeployOptions::default())
            .await
            .expect("second deploy");

        let calls = mutations(&cluster);
        assert!(calls.iter().all(|call| !call.is_creation()), "{calls:?}");
        assert_eq!(
            calls,
            vec![
                Call::UpdateSecret("ns_token".to_string()),
                Call::UpdateService("ns_web".to_string()),
            ]
        );
        assert!(report.created.is_empty());
        assert_eq!(report.updated.len(), 2);
        assert_eq!(cluster.secret_version("ns_token"), Some(2));
        assert_eq!(cluster.service_names(), vec!["ns_web"]);
        assert_eq!(cluster.network_names(), vec!["ns_default"]);
    }

    #[tokio::test]
    async fn test_external_network_with_local_scope_is_rejected() {
        let cluster = FakeCluster::new();
        cluster.add_network("edge", "local", None);
        let spec = desired(
            r"
services:
  web:
    image: nginx
    networks: [edge]
networks:
  edge:
    external: true
",
        );

        let err = deploy(&cluster, &spec, DeployOptions::default())
            .await
            .expect_err("scope mismatch");
        assert!(matches!(
            err,
            StackError::Deploy(DeployError::ExternalNetworkScopeMismatch { ref scope, .. }) if scope == "local"
        ));
        assert!(cluster.calls().iter().all(|call| !call.is_creation()));
    }

    #[tokio::test]
    async fn test_missing_external_network_blocks_all_creation() {
        let cluster = FakeCluster::new();
        let spec = desired(
            r"
services:
  web:
    image: nginx
    networks: [edge, back]
networks:
  back:
  edge:
    external: true
",
        );

        let err = deploy(&cluster, &spec, DeployOptions::default())
            .await
            .expect_err("not found");
        assert!(matches!(
            err,
            StackError::Deploy(DeployError::ExternalNetworkNotFound { ref name }) if name == "edge"
        ));
        assert!(mutations(&cluster).is_empty());
        assert!(cluster.network_names().is_empty());
    }

    #[tokio::test]
    async fn test_external_network_with_swarm_scope_is_used() {
        let cluster = FakeCluster::new();
        cluster.add_network("edge", "swarm", None);
        let spec = desired(
            r"
services:
  web:
    image: nginx
    networks: [edge]
networks:
  edge:
    external: true
",
        );

        deploy(&cluster, &spec, DeployOptions::default()).await.expect("deploy");
        assert_eq!(cluster.network_names(), vec!["edge"]);
        let service = cluster.service("ns_web").expect("service");
        assert_eq!(service.spec.task_template.networks[0].target, "edge");
    }

    #[tokio::test]
    async fn test_prune_runs_before_writes_and_tolerates_failures() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_orphan", "ns");
        cluster.fail_removal_of("ns_orphan");

        let report = deploy(
            &cluster,
            &desired(WEB),
            DeployOptions {
                prune: true,
                send_registry_auth: false,
            },
        )
        .await
        .expect("deploy continues after prune failure");

        let calls = mutations(&cluster);
        let removal = position(&calls, &Call::RemoveService("ns_orphan".to_string()));
        let create = position(&calls, &Call::CreateService("ns_web".to_string()));
        assert!(removal < create);
        assert!(calls[..removal].iter().all(|call| !call.is_creation()));
        assert!(report.prune_failed());
        assert_eq!(report.pruned.failed[0].resource.name, "ns_orphan");
    }

    #[tokio::test]
    async fn test_prune_removes_orphans() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_orphan", "ns");
        cluster.add_service("ns_web", "ns");

        let report = deploy(
            &cluster,
            &desired(WEB),
            DeployOptions {
                prune: true,
                send_registry_auth: false,
            },
        )
        .await
        .expect("deploy");

        assert!(!report.prune_failed());
        assert_eq!(report.pruned.removed.len(), 1);
        assert_eq!(cluster.service_names(), vec!["ns_web"]);
    }

    #[tokio::test]
    async fn test_prune_never_touches_other_stacks() {
        let cluster = FakeCluster::new();
        cluster.add_service("other_web", "other");
        cluster.add_service("ns_stale", "other");

        deploy(
            &cluster,
            &desired(WEB),
            DeployOptions {
                prune: true,
                send_registry_auth: false,
            },
        )
        .await
        .expect("deploy");

        let calls = cluster.calls();
        for filters in calls.iter().filter_map(Call::filters) {
            assert_eq!(filters.values("label"), vec!["com.docker.stack.namespace=ns"]);
        }
        assert!(calls.iter().all(|call| call.object_name() != Some("other_web")));
        assert!(!calls.contains(&Call::RemoveService("ns_stale".to_string())));
        assert_eq!(cluster.service_names(), vec!["ns_stale", "ns_web", "other_web"]);
    }

    #[tokio::test]
    async fn test_non_manager_aborts_before_any_change() {
        let cluster = FakeCluster::new();
        cluster.set_manager(false);
        cluster.add_service("ns_orphan", "ns");

        let err = deploy(
            &cluster,
            &desired(WEB),
            DeployOptions {
                prune: true,
                send_registry_auth: false,
            },
        )
        .await
        .expect_err("not a manager");
        assert!(matches!(err, StackError::Deploy(DeployError::NotManager)));
        assert_eq!(cluster.calls(), vec![Call::DaemonInfo]);
    }

    #[tokio::test]
    async fn test_networks_and_secrets_precede_services() {
        let cluster = FakeCluster::new();
        let spec = desired(
            r"
services:
  web:
    image: nginx
    networks: [front]
    secrets: [token]
  api:
    image: api
networks:
  front:
secrets:
  token:
    environment: API_TOKEN
",
        );

        deploy(&cluster, &spec, DeployOptions::default()).await.expect("deploy");

        let calls = mutations(&cluster);
        let first_service = calls
            .iter()
            .position(Call::is_service_write)
            .expect("service writes");
        assert!(calls[first_service..].iter().all(Call::is_service_write));
        assert_eq!(first_service, 3);

        let web = cluster.service("ns_web").expect("web");
        let reference = &web.spec.task_template.container_spec.secrets[0];
        assert_eq!(reference.secret_name, "ns_token");
        assert!(!reference.secret_id.is_empty());
    }

    #[tokio::test]
    async fn test_external_secrets_are_linked_by_name() {
        let cluster = FakeCluster::new();
        cluster.add_secret("corp_cert", None);
        let spec = desired(
            r"
services:
  web:
    image: nginx
    secrets: [cert]
secrets:
  cert:
    external: true
    name: corp_cert
",
        );

        deploy(&cluster, &spec, DeployOptions::default()).await.expect("deploy");
        let web = cluster.service("ns_web").expect("web");
        let reference = &web.spec.task_template.container_spec.secrets[0];
        assert_eq!(reference.secret_name, "corp_cert");
        assert!(reference.secret_id.starts_with("sec"));
        assert_eq!(cluster.secret_names(), vec!["corp_cert"]);
    }

    #[tokio::test]
    async fn test_missing_external_secret_fails_before_services() {
        let cluster = FakeCluster::new();
        let spec = desired(
            r"
services:
  web:
    image: nginx
    secrets: [cert]
secrets:
  cert:
    external: true
",
        );

        let err = deploy(&cluster, &spec, DeployOptions::default())
            .await
            .expect_err("missing secret");
        assert!(matches!(err, StackError::Deploy(DeployError::ResourceRead { .. })));
        assert!(cluster.calls().iter().all(|call| !call.is_service_write()));
    }

    #[tokio::test]
    async fn test_stale_version_fails_the_update() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_web", "ns");
        cluster.race_service_writes();

        let err = deploy(&cluster, &desired(WEB), DeployOptions::default())
            .await
            .expect_err("stale version");
        assert!(matches!(
            err,
            StackError::Deploy(DeployError::ResourceUpdate { ref name, .. }) if name == "ns_web"
        ));
        assert_eq!(
            cluster
                .calls()
                .iter()
                .filter(|call| call.is_service_write())
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_warnings_are_reported() {
        let cluster = FakeCluster::new();
        cluster.add_service("ns_web", "ns");
        cluster.set_update_warnings(&["image could not be accessed on a registry"]);

        let report = deploy(&cluster, &desired(WEB), DeployOptions::default())
            .await
            .expect("warnings are not fatal");
        assert_eq!(
            report.warnings,
            vec!["ns_web: image could not be accessed on a registry".to_string()]
        );
    }

    #[tokio::test]
    async fn test_registry_auth_is_sent() {
        let cluster = FakeCluster::new();
        let mut auth = MockRegistryAuthResolver::new();
        auth.expect_encoded_auth()
            .withf(|image| image == "nginx:alpine")
            .times(1)
            .returning(|_| Ok("encoded".to_string()));

        StackDeployer::new(&cluster)
            .with_registry_auth(&auth)
            .deploy(
                &Namespace::new("ns"),
                &desired(WEB),
                DeployOptions {
                    prune: false,
                    send_registry_auth: true,
                },
            )
            .await
            .expect("deploy");
        assert_eq!(cluster.registry_auth(), vec![Some("encoded".to_string())]);
    }

    #[tokio::test]
    async fn test_registry_auth_failure_stops_the_service() {
        let cluster = FakeCluster::new();
        let mut auth = MockRegistryAuthResolver::new();
        auth.expect_encoded_auth().returning(|image| {
            Err(DeployError::RegistryAuth {
                image: image.to_string(),
                reason: "malformed config".to_string(),
            }
            .into())
        });

        let err = StackDeployer::new(&cluster)
            .with_registry_auth(&auth)
            .deploy(
                &Namespace::new("ns"),
                &desired(WEB),
                DeployOptions {
                    prune: false,
                    send_registry_auth: true,
                },
            )
            .await
            .expect_err("auth failure");
        assert!(matches!(err, StackError::Deploy(DeployError::RegistryAuth { .. })));
        assert!(cluster.calls().iter().all(|call| !call.is_service_write()));
        assert!(cluster.registry_auth().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_deploy_makes_no_calls() {
        let cluster = FakeCluster::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = StackDeployer::new(&cluster)
            .with_cancellation(cancel)
            .deploy(&Namespace::new("ns"), &desired(WEB), DeployOptions::default())
            .await
            .expect_err("cancelled");
        assert!(err.is_cancelled());
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_deploy_keeps_applied_changes() {
        let cluster = FakeCluster::new();
        let cancel = CancellationToken::new();
        cluster.cancel_after("ns_default", cancel.clone());

        let err = StackDeployer::new(&cluster)
            .with_cancellation(cancel)
            .deploy(&Namespace::new("ns"), &desired(WEB), DeployOptions::default())
            .await
            .expect_err("cancelled");

        assert!(matches!(err, StackError::Deploy(DeployError::Cancelled)));
        assert_eq!(
            mutations(&cluster),
            vec![Call::CreateNetwork("ns_default".to_string())]
        );
        assert_eq!(cluster.network_names(), vec!["ns_default"]);
        assert!(cluster.service_names().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_after_a_secret_stops_before_services() {
        let yaml = r"
services:
  web:
    image: nginx:alpine
    secrets:
      - token
secrets:
  token:
    environment: API_TOKEN
";
        let cluster = FakeCluster::new();
        let cancel = CancellationToken::new();
        cluster.cancel_after("ns_token", cancel.clone());

        let err = StackDeployer::new(&cluster)
            .with_cancellation(cancel)
            .deploy(&Namespace::new("ns"), &desired(yaml), DeployOptions::default())
            .await
            .expect_err("cancelled");

        assert!(err.is_cancelled());
        assert_eq!(cluster.secret_names(), vec!["ns_token"]);
        assert!(!cluster.calls().iter().any(Call::is_service_write));
    }
}
