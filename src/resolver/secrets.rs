//! Secret resolution.

use std::collections::BTreeMap;

use crate::config::{SecretConfig, external_name};
use crate::error::{ConfigError, Result};
use crate::namespace::Namespace;

use super::desired::SecretSpec;

/// Converts the stack-managed secrets into desired secrets.
///
/// External secrets are skipped; services reference them by name.
///
/// # Errors
///
/// Returns an error if a managed secret has no loaded payload.
pub fn convert_secrets(
    namespace: &Namespace,
    declared: &BTreeMap<String, SecretConfig>,
    payloads: &BTreeMap<String, Vec<u8>>,
) -> Result<Vec<SecretSpec>> {
    let mut secrets = Vec::new();

    for (internal_name, config) in declared {
        if external_name(internal_name, config.external.as_ref(), config.name.as_deref()).is_some() {
            continue;
        }

        let data = payloads
            .get(internal_name)
            .cloned()
            .ok_or_else(|| ConfigError::SecretSource {
                name: internal_name.clone(),
                message: "payload was not loaded".to_string(),
            })?;

        secrets.push(SecretSpec {
            internal_name: internal_name.clone(),
            name: secret_name(namespace, internal_name, config),
            labels: namespace.add_stack_label(&config.labels.to_map()),
            data,
        });
    }

    Ok(secrets)
}

/// The cluster name of a secret referenced by a service.
#[must_use]
pub fn secret_target(
    namespace: &Namespace,
    declared: &BTreeMap<String, SecretConfig>,
    internal_name: &str,
) -> String {
    match declared.get(internal_name) {
        Some(config) => external_name(internal_name, config.external.as_ref(), config.name.as_deref())
            .map_or_else(|| secret_name(namespace, internal_name, config), str::to_string),
        None => namespace.scope(internal_name),
    }
}

fn secret_name(namespace: &Namespace, internal_name: &str, config: &SecretConfig) -> String {
    config
        .name
        .clone()
        .unwrap_or_else(|| namespace.scope(internal_name))
}
