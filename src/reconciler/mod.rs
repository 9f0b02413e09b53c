//! Stack reconciliation engine.
//!
//! This module contains:
//! - The manager capability check run before any deploy
//! - The deploy engine, which converges a stack on its desired state
//! - The teardown engine, which removes everything a stack owns
//! - The shared read/create/update and best-effort removal flows

mod deploy;
mod guard;
mod resource;
mod teardown;

#[cfg(test)]
mod testing;

pub use deploy::{DeployOptions, DeployReport, StackDeployer};
pub use guard::ensure_manager;
pub use resource::{
    Action, Applied, Reconcile, RemovalFailure, RemovalOutcome, Written, reconcile_one, remove_all,
};
pub use teardown::{StackRemover, TeardownReport};
