//! SwiftInstall - batch installation orchestrator
//!
//! Installs many packages through the platform package manager (winget or
//! Homebrew) with priority ordering, dependency gating between packages,
//! a bounded worker pool and post-install environment updates.

pub mod adapters;
pub mod config;
pub mod core;
pub mod environment;
pub mod error;
pub mod export;
pub mod installer;
pub mod session;

// Re-exports
pub use adapters::{
    detect_package_manager, AdapterReport, BrewAdapter, InstallOutcome, InstallRequest,
    PackageManager, UnsupportedPlatform, WingetAdapter,
};
pub use config::InstallerConfig;
pub use core::{
    validate_dependencies, validate_packages, DependencyIssue, InstallStatus, InstallTask,
    PackageDescriptor, Priority, ProgressCallback,
};
pub use environment::{EnvironmentManager, ProcessEnvironment};
pub use error::{BatchError, ErrorCategory, Result};
pub use export::{ConfigDocument, ConfigFormat, ScriptKind};
pub use installer::{BatchInstaller, CancelToken, MAX_WORKERS};
pub use session::InstallSession;
