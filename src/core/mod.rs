//! Core engine - package model, task state machine, scheduling, execution

mod executor;
mod package;
mod scheduler;
mod task;

pub use executor::{Executor, ProgressCallback};
pub(crate) use executor::{notify, panic_message};
pub use package::{validate_dependencies, validate_packages, DependencyIssue, PackageDescriptor, Priority};
pub use scheduler::{missing_dependencies, priority_order, skip_reason, Scheduler};
pub use task::{
    truncate_chars, InstallStatus, InstallTask, TransitionError, DEFAULT_MAX_RETRIES,
    MAX_DIAGNOSTIC_CHARS,
};
