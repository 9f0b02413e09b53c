//! Service resolution.
//!
//! Converts compose service definitions into swarm service specifications.
//! Secret references are emitted with an empty secret ID; the deploy engine
//! fills it in once the secrets exist.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{
    ComposeFile, DEFAULT_NETWORK, DeployConfig, ResourceAmounts, ServiceConfig, ServiceSecret,
    StringOrList, VolumeConfig, external_name,
};
use crate::docker::types::{
    ContainerSpec, DriverConfig, EndpointSpec, GlobalService, Mount, NetworkAttachment, Placement,
    ReplicatedService, ResourceRequirements, Resources, RestartPolicy, SecretReference,
    SecretReferenceFile, ServiceMode, SwarmServiceSpec, TaskTemplate, UpdateConfig, VolumeOptions,
};
use crate::error::{ConfigError, Result, StackError};
use crate::namespace::{LABEL_IMAGE, Namespace};

use super::desired::ServiceSpec;
use super::networks::network_target;
use super::secrets::secret_target;
use super::units::{parse_duration, parse_memory, parse_nano_cpus, parse_port};

/// Default owner of secret files.
const SECRET_OWNER: &str = "0";

/// Default mode of secret files.
const SECRET_MODE: u32 = 0o444;

/// Everything a service conversion needs besides the service itself.
struct Context<'a> {
    namespace: &'a Namespace,
    file: &'a ComposeFile,
    environment: &'a BTreeMap<String, String>,
    working_dir: &'a Path,
}

/// Converts every service of a compose document.
///
/// # Errors
///
/// Returns an error if a duration, size, CPU amount, port or mount cannot
/// be parsed.
pub fn convert_services(
    namespace: &Namespace,
    file: &ComposeFile,
    environment: &BTreeMap<String, String>,
    working_dir: &Path,
) -> Result<Vec<ServiceSpec>> {
    let context = Context {
        namespace,
        file,
        environment,
        working_dir,
    };

    file.services
        .iter()
        .map(|(name, service)| {
            Ok(ServiceSpec {
                internal_name: name.clone(),
                spec: context.convert(name, service)?,
            })
        })
        .collect()
}

impl Context<'_> {
    fn convert(&self, name: &str, service: &ServiceConfig) -> Result<SwarmServiceSpec> {
        let deploy = service.deploy.clone().unwrap_or_default();

        let mut labels = self.namespace.add_stack_label(&deploy.labels.to_map());
        labels.insert(LABEL_IMAGE.to_string(), service.image.clone());

        let container_spec = ContainerSpec {
            image: service.image.clone(),
            labels: self.namespace.add_stack_label(&service.labels.to_map()),
            command: service
                .entrypoint
                .as_ref()
                .map(StringOrList::to_args)
                .unwrap_or_default(),
            args: service
                .command
                .as_ref()
                .map(StringOrList::to_args)
                .unwrap_or_default(),
            env: service.environment.resolve(self.environment),
            dir: service.working_dir.clone(),
            user: service.user.clone(),
            hostname: service.hostname.clone(),
            stop_grace_period: service
                .stop_grace_period
                .as_deref()
                .map(parse_duration)
                .transpose()?,
            secrets: self.secret_references(&service.secrets),
            mounts: service
                .volumes
                .iter()
                .map(|volume| self.mount(volume))
                .collect::<Result<_>>()?,
        };

        Ok(SwarmServiceSpec {
            name: self.namespace.scope(name),
            labels,
            task_template: TaskTemplate {
                container_spec,
                resources: convert_resources(&deploy)?,
                restart_policy: convert_restart_policy(&deploy)?,
                placement: deploy
                    .placement
                    .as_ref()
                    .filter(|p| !p.constraints.is_empty())
                    .map(|p| Placement {
                        constraints: p.constraints.clone(),
                    }),
                networks: self.network_attachments(name, service),
            },
            mode: Some(convert_mode(&deploy)),
            update_config: convert_update_config(&deploy)?,
            endpoint_spec: convert_endpoint(service, &deploy)?,
        })
    }

    fn network_attachments(&self, name: &str, service: &ServiceConfig) -> Vec<NetworkAttachment> {
        let networks = if service.networks.is_empty() {
            vec![DEFAULT_NETWORK]
        } else {
            service.networks.names()
        };

        let mut attachments: Vec<NetworkAttachment> = networks
            .into_iter()
            .map(|network| {
                let mut aliases = service.networks.aliases(network);
                aliases.push(name.to_string());
                NetworkAttachment {
                    target: network_target(self.namespace, &self.file.networks, network),
                    aliases,
                }
            })
            .collect();
        attachments.sort_by(|a, b| a.target.cmp(&b.target));
        attachments
    }

    fn secret_references(&self, secrets: &[ServiceSecret]) -> Vec<SecretReference> {
        secrets
            .iter()
            .map(|secret| {
                let source = secret.source();
                let (target, uid, gid, mode) = match secret {
                    ServiceSecret::Short(_) => (None, None, None, None),
                    ServiceSecret::Long(long) => (
                        long.target.clone(),
                        long.uid.clone(),
                        long.gid.clone(),
                        long.mode,
                    ),
                };
                SecretReference {
                    file: SecretReferenceFile {
                        name: target.unwrap_or_else(|| source.to_string()),
                        uid: uid.unwrap_or_else(|| SECRET_OWNER.to_string()),
                        gid: gid.unwrap_or_else(|| SECRET_OWNER.to_string()),
                        mode: mode.unwrap_or(SECRET_MODE),
                    },
                    secret_id: String::new(),
                    secret_name: secret_target(self.namespace, &self.file.secrets, source),
                }
            })
            .collect()
    }

    /// Converts a short-syntax mount: `target`, `source:target` or
    /// `source:target:mode`.
    fn mount(&self, volume: &str) -> Result<Mount> {
        let parts: Vec<&str> = volume.split(':').collect();
        let (source, target, mode) = match parts.as_slice() {
            [target] => ("", *target, None),
            [source, target] => (*source, *target, None),
            [source, target, mode] => (*source, *target, Some(*mode)),
            _ => return Err(invalid_mount(volume)),
        };
        if target.is_empty() {
            return Err(invalid_mount(volume));
        }

        let read_only = match mode {
            None | Some("rw") => false,
            Some("ro") => true,
            Some(_) => return Err(invalid_mount(volume)),
        };

        if source.is_empty() {
            return Ok(Mount {
                kind: "volume".to_string(),
                source: String::new(),
                target: target.to_string(),
                read_only,
                volume_options: None,
            });
        }

        if is_path(source) {
            return Ok(Mount {
                kind: "bind".to_string(),
                source: self.bind_source(source).display().to_string(),
                target: target.to_string(),
                read_only,
                volume_options: None,
            });
        }

        let config = self
            .file
            .volumes
            .get(source)
            .and_then(Option::as_ref)
            .cloned()
            .unwrap_or_default();

        if let Some(name) = external_name(source, config.external.as_ref(), config.name.as_deref()) {
            return Ok(Mount {
                kind: "volume".to_string(),
                source: name.to_string(),
                target: target.to_string(),
                read_only,
                volume_options: None,
            });
        }

        Ok(Mount {
            kind: "volume".to_string(),
            source: config
                .name
                .clone()
                .unwrap_or_else(|| self.namespace.scope(source)),
            target: target.to_string(),
            read_only,
            volume_options: Some(self.volume_options(&config)),
        })
    }

    fn volume_options(&self, config: &VolumeConfig) -> VolumeOptions {
        VolumeOptions {
            labels: self.namespace.add_stack_label(&config.labels.to_map()),
            driver_config: config.driver.as_ref().map(|driver| DriverConfig {
                name: driver.clone(),
                options: config.driver_opts.clone(),
            }),
        }
    }

    fn bind_source(&self, source: &str) -> PathBuf {
        if let Some(rest) = source.strip_prefix('~') {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest.trim_start_matches('/'));
            }
        }

        let path = Path::new(source);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(source.strip_prefix("./").unwrap_or(source))
        }
    }
}

fn is_path(source: &str) -> bool {
    source.starts_with('/') || source.starts_with('.') || source.starts_with('~')
}

fn invalid_mount(volume: &str) -> StackError {
    ConfigError::validation(format!("invalid volume specification {volume:?}"), "volumes").into()
}

fn convert_mode(deploy: &DeployConfig) -> ServiceMode {
    if deploy.mode.as_deref() == Some("global") {
        ServiceMode {
            replicated: None,
            global: Some(GlobalService {}),
        }
    } else {
        ServiceMode {
            replicated: Some(ReplicatedService {
                replicas: deploy.replicas.unwrap_or(1),
            }),
            global: None,
        }
    }
}

fn convert_amounts(amounts: Option<&ResourceAmounts>) -> Result<Option<Resources>> {
    let Some(amounts) = amounts else {
        return Ok(None);
    };

    Ok(Some(Resources {
        nano_cpus: amounts
            .cpus
            .as_ref()
            .map(parse_nano_cpus)
            .transpose()?
            .unwrap_or_default(),
        memory_bytes: amounts
            .memory
            .as_ref()
            .map(parse_memory)
            .transpose()?
            .unwrap_or_default(),
    }))
}

fn convert_resources(deploy: &DeployConfig) -> Result<Option<ResourceRequirements>> {
    let Some(resources) = &deploy.resources else {
        return Ok(None);
    };

    Ok(Some(ResourceRequirements {
        limits: convert_amounts(resources.limits.as_ref())?,
        reservations: convert_amounts(resources.reservations.as_ref())?,
    }))
}

fn convert_restart_policy(deploy: &DeployConfig) -> Result<Option<RestartPolicy>> {
    let Some(policy) = &deploy.restart_policy else {
        return Ok(None);
    };

    Ok(Some(RestartPolicy {
        condition: policy.condition.clone(),
        delay: policy.delay.as_deref().map(parse_duration).transpose()?,
        max_attempts: policy.max_attempts,
        window: policy.window.as_deref().map(parse_duration).transpose()?,
    }))
}

fn convert_update_config(deploy: &DeployConfig) -> Result<Option<UpdateConfig>> {
    let Some(update) = &deploy.update_config else {
        return Ok(None);
    };

    Ok(Some(UpdateConfig {
        parallelism: update.parallelism.unwrap_or(1),
        delay: update.delay.as_deref().map(parse_duration).transpose()?,
        failure_action: update.failure_action.clone(),
        monitor: update.monitor.as_deref().map(parse_duration).transpose()?,
        max_failure_ratio: update.max_failure_ratio,
    }))
}

fn convert_endpoint(service: &ServiceConfig, deploy: &DeployConfig) -> Result<Option<EndpointSpec>> {
    let mut ports = Vec::new();
    for entry in &service.ports {
        ports.extend(parse_port(entry)?);
    }

    if ports.is_empty() && deploy.endpoint_mode.is_none() {
        return Ok(None);
    }

    Ok(Some(EndpointSpec {
        mode: deploy.endpoint_mode.clone(),
        ports,
    }))
}
