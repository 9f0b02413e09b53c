//! Network resolution.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{DEFAULT_NETWORK, NetworkConfig, ServiceConfig, external_name};
use crate::docker::types::{Ipam, IpamPool};
use crate::namespace::Namespace;

use super::desired::{ExternalNetworkRef, ManagedNetworkSpec};

/// Networks referenced by at least one service.
///
/// A service without networks joins the stack's implicit `default` network.
#[must_use]
pub fn service_networks(services: &BTreeMap<String, ServiceConfig>) -> BTreeSet<String> {
    let mut networks = BTreeSet::new();
    for service in services.values() {
        if service.networks.is_empty() {
            networks.insert(DEFAULT_NETWORK.to_string());
        } else {
            networks.extend(service.networks.names().into_iter().map(str::to_string));
        }
    }
    networks
}

/// Splits the used networks into those the stack creates and those that
/// must already exist.
///
/// Networks that are declared but unused are ignored.
#[must_use]
pub fn convert_networks(
    namespace: &Namespace,
    declared: &BTreeMap<String, Option<NetworkConfig>>,
    used: &BTreeSet<String>,
) -> (Vec<ManagedNetworkSpec>, Vec<ExternalNetworkRef>) {
    let mut managed = Vec::new();
    let mut external = Vec::new();
    let empty = NetworkConfig::default();

    for internal_name in used {
        let config = declared
            .get(internal_name)
            .and_then(Option::as_ref)
            .unwrap_or(&empty);

        if let Some(name) =
            external_name(internal_name, config.external.as_ref(), config.name.as_deref())
        {
            external.push(ExternalNetworkRef {
                internal_name: internal_name.clone(),
                name: name.to_string(),
            });
            continue;
        }

        managed.push(ManagedNetworkSpec {
            internal_name: internal_name.clone(),
            name: network_name(namespace, internal_name, config),
            driver: config.driver.clone(),
            options: config.driver_opts.clone(),
            labels: namespace.add_stack_label(&config.labels.to_map()),
            attachable: config.attachable,
            internal: config.internal,
            ipam: config.ipam.as_ref().map(|ipam| Ipam {
                driver: ipam.driver.clone(),
                config: ipam
                    .config
                    .iter()
                    .map(|pool| IpamPool {
                        subnet: pool.subnet.clone(),
                        ip_range: pool.ip_range.clone(),
                        gateway: pool.gateway.clone(),
                    })
                    .collect(),
            }),
        });
    }

    (managed, external)
}

/// The cluster name a service attaches to for an internal network name.
#[must_use]
pub fn network_target(
    namespace: &Namespace,
    declared: &BTreeMap<String, Option<NetworkConfig>>,
    internal_name: &str,
) -> String {
    match declared.get(internal_name).and_then(Option::as_ref) {
        Some(config) => external_name(internal_name, config.external.as_ref(), config.name.as_deref())
            .map_or_else(|| network_name(namespace, internal_name, config), str::to_string),
        None => namespace.scope(internal_name),
    }
}

fn network_name(namespace: &Namespace, internal_name: &str, config: &NetworkConfig) -> String {
    config
        .name
        .clone()
        .unwrap_or_else(|| namespace.scope(internal_name))
}
