// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # stackctl
//!
//! Declarative deployment of compose stacks onto a Docker Swarm cluster.
//!
//! ## Overview
//!
//! A stack is a named group of services, networks and secrets. Every object
//! a stack owns is named `<stack>_<name>` and carries the
//! `com.docker.stack.namespace` label, so the stack can be found, updated and
//! removed again without any local state.
//!
//! ## Architecture
//!
//! 1. **Load**: a compose file is parsed, interpolated and validated
//! 2. **Resolve**: the document becomes a [`resolver::DesiredStackSpec`]
//!    with scoped names, labels and swarm specifications
//! 3. **Reconcile**: the deploy engine creates what is missing and updates
//!    what exists, optionally pruning services that are no longer wanted
//! 4. **Teardown**: everything carrying the stack label is removed
//!
//! ## Modules
//!
//! - [`config`]: Compose file parsing, interpolation and validation
//! - [`namespace`]: Stack scoping of names and labels
//! - [`resolver`]: Conversion into cluster specifications
//! - [`docker`]: Engine API client and the cluster gateway seam
//! - [`reconciler`]: Deploy and teardown engines
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! version: "3.8"
//! services:
//!   web:
//!     image: nginx:alpine
//!     ports:
//!       - "8080:80"
//!     secrets:
//!       - token
//! secrets:
//!   token:
//!     file: ./token.txt
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod docker;
pub mod error;
pub mod namespace;
pub mod reconciler;
pub mod resolver;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, LoadedConfig};
pub use docker::{ClusterGateway, DockerClient, DockerSettings, StackObserver};
pub use error::{Result, StackError};
pub use namespace::Namespace;
pub use reconciler::{DeployOptions, DeployReport, StackDeployer, StackRemover, TeardownReport};
pub use resolver::{DesiredStackSpec, resolve};
