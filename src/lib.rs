//! aks-shipper - build, publish and deploy a containerized web service to AKS
//!
//! Components:
//! - bootstrap: create the hosted repository and push the initial tree
//! - locker: lock Python dependencies and export pinned requirements
//! - builder / verifier: build the image and optionally test it
//! - publisher: push the build-id tag and `latest`
//! - deployer: apply manifests and restart the deployment
//! - decommissioner: delete the cluster and its service principal

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

#[cfg(test)]
pub mod test_utils;

pub use error::{ShipError, ShipResult};
