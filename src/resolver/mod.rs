//! Desired-state resolution.
//!
//! Turns a loaded compose document into a [`DesiredStackSpec`]. Resolution
//! is a pure transform: every input, including secret payloads, has already
//! been read by the loader.

mod desired;
mod networks;
mod secrets;
mod services;
mod units;

pub use desired::{
    DEFAULT_NETWORK_DRIVER, DesiredStackSpec, ExternalNetworkRef, ManagedNetworkSpec, SecretSpec,
    ServiceSpec,
};
pub use units::{parse_duration, parse_memory, parse_nano_cpus, parse_port};

use tracing::debug;

use crate::config::LoadedConfig;
use crate::error::Result;
use crate::namespace::Namespace;

/// Resolves a loaded document into the desired state of a stack.
///
/// # Errors
///
/// Returns an error if a value in the document cannot be converted or a
/// secret payload is missing.
pub fn resolve(config: &LoadedConfig, namespace: &Namespace) -> Result<DesiredStackSpec> {
    let file = &config.file;

    let used_networks = networks::service_networks(&file.services);
    let (managed_networks, external_networks) =
        networks::convert_networks(namespace, &file.networks, &used_networks);
    let secrets = secrets::convert_secrets(namespace, &file.secrets, &config.secret_payloads)?;
    let services = services::convert_services(
        namespace,
        file,
        &config.environment,
        &config.working_dir,
    )?;

    debug!(
        "Resolved stack {namespace}: {} networks ({} external), {} secrets, {} services",
        managed_networks.len(),
        external_networks.len(),
        secrets.len(),
        services.len()
    );

    Ok(DesiredStackSpec {
        networks: managed_networks,
        external_networks,
        secrets,
        services,
    })
}
