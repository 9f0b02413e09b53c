//! Manager capability check.

use tracing::debug;

use crate::docker::ClusterGateway;
use crate::error::{DeployError, Result};

/// Fails unless the daemon behind `gateway` can accept swarm control-plane
/// requests.
///
/// # Errors
///
/// Returns [`DeployError::NotManager`] if the node is not a manager, or the
/// gateway error if the daemon cannot be queried.
pub async fn ensure_manager<G: ClusterGateway + ?Sized>(gateway: &G) -> Result<()> {
    let info = gateway.daemon_info().await?;
    debug!(
        "Daemon swarm state: {:?}, control available: {}",
        info.swarm.local_node_state, info.swarm.control_available
    );

    if info.swarm.control_available {
        Ok(())
    } else {
        Err(DeployError::NotManager.into())
    }
}
