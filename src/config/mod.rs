//! Compose document handling.
//!
//! This module handles everything between a compose file on disk and a
//! typed, validated document:
//! - Parsing YAML and loading `.env`
//! - Variable interpolation
//! - Forbidden, unsupported and deprecated property detection
//! - Structural validation and secret payload loading

mod interpolate;
mod parser;
mod spec;
mod validator;

pub use interpolate::Interpolator;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, LoadedConfig, find_config_file};
pub use spec::{
    ComposeFile, DeployConfig, Environment, External, IpamConfig, IpamPoolConfig, Labels,
    NetworkConfig, PlacementConfig, PortEntry, PortLong, ResourceAmounts, ResourcesConfig,
    RestartPolicyConfig, Scalar, SecretConfig, ServiceConfig, ServiceNetworkConfig,
    ServiceNetworks, ServiceSecret, ServiceSecretLong, StringOrList, UpdateConfigSpec,
    VolumeConfig, external_name, split_command,
};
pub use validator::{
    ConfigValidator, PropertyWarning, ValidationError, ValidationResult, named_volume_source,
};

/// Name of the network every service without explicit networks joins.
pub const DEFAULT_NETWORK: &str = "default";
