//! Configuration
//!
//! Environment variable parsing for every pipeline component

pub mod cluster;
pub mod env;
pub mod pipeline;
pub mod project;

pub use cluster::{AzureCredentials, DecommissionConfig, DeployConfig};
pub use env::{CommandConfig, Secret};
pub use pipeline::{BuildConfig, DockerfileConfig, RegistryConfig, RegistryCredentials};
pub use project::{BootstrapConfig, LockConfig, RemoteProtocol};
