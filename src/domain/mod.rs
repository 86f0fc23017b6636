//! Domain model
//!
//! Plain data types, no process or network access

pub mod cluster;
pub mod image;
pub mod requirements;
pub mod stage;

pub use cluster::{ClusterRef, ServicePrincipalId};
pub use image::{BuildId, BuiltImage, ImageRef, PublishedImage};
pub use requirements::{PinnedRequirements, Requirement};
pub use stage::{LogLine, LogStream, PipelineStage, RunStatus, StageOutcome, StageStatus};
