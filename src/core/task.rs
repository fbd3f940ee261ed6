//! Install tasks - per-run records and their status state machine
//!
//! ```text
//! Pending ──► Downloading ──► Installing ──► Success
//!    │             │              ├────────► AlreadyInstalled
//!    │             │              └────────► Failed
//!    ├──► Skipped  │
//!    └──► Cancelled ◄─┘
//! ```
//!
//! All terminal states are final for an attempt. `begin_retry` is the one
//! way back to `Pending`, from `Failed` only.

use super::package::PackageDescriptor;
use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Upper bound on stored diagnostics, in characters
pub const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Default number of explicit retries allowed per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Pending,
    Downloading,
    Installing,
    Success,
    AlreadyInstalled,
    Failed,
    Skipped,
    Cancelled,
}

impl InstallStatus {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::AlreadyInstalled | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }

    /// Whether a dependent package may rely on this one
    #[inline]
    pub const fn satisfies_dependents(self) -> bool {
        matches!(self, Self::Success | Self::AlreadyInstalled)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        match next {
            Self::Pending => false,
            Self::Downloading | Self::Skipped => matches!(self, Self::Pending),
            Self::Installing | Self::Cancelled => matches!(self, Self::Pending | Self::Downloading),
            Self::Success | Self::AlreadyInstalled | Self::Failed => {
                matches!(self, Self::Installing)
            }
        }
    }

    /// Single-character marker used in reports
    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::AlreadyInstalled => "≡",
            Self::Failed => "✗",
            Self::Skipped => "○",
            Self::Pending => "·",
            Self::Installing => "◉",
            Self::Downloading => "↓",
            Self::Cancelled => "⊗",
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Downloading => write!(f, "downloading"),
            Self::Installing => write!(f, "installing"),
            Self::Success => write!(f, "success"),
            Self::AlreadyInstalled => write!(f, "already-installed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{id}: cannot move from {from} to {to}")]
    Invalid {
        id: String,
        from: InstallStatus,
        to: InstallStatus,
    },

    #[error("{id}: only failed tasks can be retried (status is {status})")]
    NotRetryable { id: String, status: InstallStatus },

    #[error("{id}: retry limit of {max_retries} reached")]
    RetryLimit { id: String, max_retries: u32 },
}

/// One attempt at installing a descriptor within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallTask {
    pub package: PackageDescriptor,
    pub status: InstallStatus,
    pub progress: u8,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub error_category: Option<ErrorCategory>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub output: Vec<String>,
}

impl InstallTask {
    pub fn new(package: PackageDescriptor) -> Self {
        Self {
            package,
            status: InstallStatus::Pending,
            progress: 0,
            start_time: None,
            end_time: None,
            error_message: None,
            error_category: None,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            output: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.package.id
    }

    /// Move to `next`, rejecting backward or out-of-terminal moves
    pub fn transition(&mut self, next: InstallStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::Invalid {
                id: self.package.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn set_progress(&mut self, progress: u8) {
        self.progress = progress.min(100);
    }

    pub fn mark_installing(&mut self) -> Result<(), TransitionError> {
        self.transition(InstallStatus::Installing)?;
        self.start_time = Some(Utc::now());
        self.progress = 0;
        Ok(())
    }

    /// Finish with `Success` or `AlreadyInstalled`
    pub fn finish_ok(&mut self, status: InstallStatus) -> Result<(), TransitionError> {
        debug_assert!(status.satisfies_dependents());
        self.transition(status)?;
        self.end_time = Some(Utc::now());
        self.progress = 100;
        Ok(())
    }

    pub fn finish_failed(&mut self, diagnostic: &str) -> Result<(), TransitionError> {
        self.transition(InstallStatus::Failed)?;
        self.record_failure(diagnostic);
        Ok(())
    }

    /// Gate failure: never dispatched
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(InstallStatus::Skipped)?;
        self.error_message = Some(reason.into());
        self.error_category = Some(ErrorCategory::Dependency);
        self.end_time = Some(Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(InstallStatus::Cancelled)?;
        self.error_message = Some("Cancelled before dispatch".to_string());
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Force the task to `Failed` regardless of where it was. Used at the
    /// worker boundary after a panic, when the state may be mid-update.
    pub fn force_failed(&mut self, diagnostic: &str) {
        self.status = InstallStatus::Failed;
        self.record_failure(diagnostic);
    }

    fn record_failure(&mut self, diagnostic: &str) {
        let diagnostic = truncate_chars(diagnostic.trim(), MAX_DIAGNOSTIC_CHARS);
        self.error_category = Some(ErrorCategory::classify(&diagnostic));
        self.error_message = Some(diagnostic);
        self.end_time = Some(Utc::now());
        self.progress = 0;
    }

    /// Reset a failed task for a new attempt
    pub fn begin_retry(&mut self) -> Result<(), TransitionError> {
        if self.status != InstallStatus::Failed {
            return Err(TransitionError::NotRetryable {
                id: self.package.id.clone(),
                status: self.status,
            });
        }
        if self.retry_count >= self.max_retries {
            return Err(TransitionError::RetryLimit {
                id: self.package.id.clone(),
                max_retries: self.max_retries,
            });
        }
        self.retry_count += 1;
        self.status = InstallStatus::Pending;
        self.progress = 0;
        self.start_time = None;
        self.end_time = None;
        self.error_message = None;
        self.error_category = None;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.status == InstallStatus::Failed && self.retry_count < self.max_retries
    }
}

/// Truncate on a char boundary
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
