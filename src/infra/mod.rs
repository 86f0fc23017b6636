//! Infrastructure layer
//!
//! Child processes, HTTP clients and the log file sink

pub mod command;
pub mod github;
pub mod log_file;

pub use command::{CommandExecutor, CommandOutput, CommandRunner, CommandSpec};
pub use github::{CreatedRepository, GithubClient, RepoDescriptor, RepositoryHost};
