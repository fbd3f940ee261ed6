//! Error types and failure classification

use crate::core::TransitionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structural errors - the only errors that reach the caller of a batch run.
///
/// Per-package failures never show up here; they are recorded on the task.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Duplicate package id: {0}")]
    DuplicatePackage(String),

    #[error("Invalid package '{id}': {reason}")]
    InvalidPackage { id: String, reason: String },

    #[error("Unknown config format for {0} (expected .json, .yml or .yaml)")]
    UnknownFormat(String),

    #[error("No active session")]
    NoSession,

    #[error("Invalid task transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to render script: {0}")]
    Render(#[from] fmt::Error),
}

impl BatchError {
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPackage {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BatchError>;

/// Broad category of an install failure, derived from its diagnostic text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Permission,
    Dependency,
    Installation,
    Configuration,
    System,
    Unknown,
}

const NETWORK_HINTS: &[&str] = &[
    "connection", "network", "timeout", "timed out", "socket", "ssl", "http", "url",
    "download", "fetch", "404", "403", "500",
];
const PERMISSION_HINTS: &[&str] = &[
    "permission", "access is denied", "denied", "unauthorized", "forbidden", "privilege",
    "administrator", "elevated", "sudo",
];
const DEPENDENCY_HINTS: &[&str] = &["missing dependencies", "dependency", "requires", "conflict"];
const CONFIGURATION_HINTS: &[&str] = &["no package found", "no available formula", "invalid", "config"];
const SYSTEM_HINTS: &[&str] = &["disk", "space", "no such file", "not found", "unsupported platform"];

impl ErrorCategory {
    /// Classify a diagnostic by keyword, first match wins.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |hints: &[&str]| hints.iter().any(|h| lower.contains(h));

        if lower.trim().is_empty() {
            Self::Unknown
        } else if matches(NETWORK_HINTS) {
            Self::Network
        } else if matches(PERMISSION_HINTS) {
            Self::Permission
        } else if matches(DEPENDENCY_HINTS) {
            Self::Dependency
        } else if matches(CONFIGURATION_HINTS) {
            Self::Configuration
        } else if matches(SYSTEM_HINTS) {
            Self::System
        } else {
            Self::Installation
        }
    }

    /// Short remediation hints shown next to failed packages
    pub fn suggestions(&self) -> &'static [&'static str] {
        match self {
            Self::Network => &[
                "Check your internet connection",
                "Verify proxy and firewall settings",
                "Try again later or use a mirror source",
            ],
            Self::Permission => &[
                "Run the installer with administrator privileges",
                "Check file and folder permissions",
            ],
            Self::Dependency => &[
                "Install the required dependency first",
                "Check the package's dependency list",
            ],
            Self::Installation => &[
                "Check the error output for details",
                "Try installing the package manually",
                "Check available disk space",
            ],
            Self::Configuration => &[
                "Verify the package id is correct for this package manager",
                "Check the configuration file",
            ],
            Self::System => &[
                "Check that the package manager is installed and on PATH",
                "Check available disk space",
            ],
            Self::Unknown => &["Re-run with RUST_LOG=debug for more detail"],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Permission => write!(f, "permission"),
            Self::Dependency => write!(f, "dependency"),
            Self::Installation => write!(f, "installation"),
            Self::Configuration => write!(f, "configuration"),
            Self::System => write!(f, "system"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
