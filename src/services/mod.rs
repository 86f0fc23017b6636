//! Pipeline services
//!
//! One module per component; each takes a [`PipelineContext`] and its own
//! config and does nothing outside its stage.

pub mod bootstrap;
pub mod builder;
pub mod context;
pub mod decommissioner;
pub mod deployer;
pub mod dockerfile;
pub mod locker;
pub mod pipeline;
pub mod publisher;
pub mod verifier;

pub use context::PipelineContext;
pub use decommissioner::{DeletionJob, DeletionState};
pub use deployer::RolloutReport;
pub use locker::LockReport;
pub use pipeline::{PipelineConfig, PipelineReport};
pub use publisher::PublishOutcome;
