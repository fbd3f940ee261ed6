//! Package manager adapters - the only code that talks to winget or brew
//!
//! Adapters turn a package request into an [`InstallOutcome`] value. They
//! never panic or return errors for a failed install; a failure is just
//! another outcome carrying its diagnostic text.

mod brew;
mod winget;

pub use brew::BrewAdapter;
pub use winget::WingetAdapter;

use crate::core::{truncate_chars, PackageDescriptor, MAX_DIAGNOSTIC_CHARS};
use regex::Regex;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// What the orchestrator asks an adapter to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub id: String,
    pub version: Option<String>,
    pub source: Option<String>,
    /// Suppress prompts and license dialogs
    pub non_interactive: bool,
}

impl InstallRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: None,
            source: None,
            non_interactive: true,
        }
    }

    /// Request for a descriptor's id, version and source
    pub fn for_package(package: &PackageDescriptor, non_interactive: bool) -> Self {
        Self {
            id: package.id.clone(),
            version: package.version.clone(),
            source: package.source.clone(),
            non_interactive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed,
    AlreadyInstalled,
    /// Combined stdout+stderr, truncated to [`MAX_DIAGNOSTIC_CHARS`]
    Failed(String),
}

/// Outcome plus the captured output lines of the invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterReport {
    pub outcome: InstallOutcome,
    pub output: Vec<String>,
}

impl AdapterReport {
    pub fn new(outcome: InstallOutcome) -> Self {
        Self {
            outcome,
            output: Vec::new(),
        }
    }

    pub fn failed(diagnostic: impl AsRef<str>) -> Self {
        Self::new(InstallOutcome::Failed(truncate_chars(
            diagnostic.as_ref(),
            MAX_DIAGNOSTIC_CHARS,
        )))
    }
}

/// Capability to install one package with the platform package manager.
///
/// Implementations block until the package manager exits and are called
/// from worker threads, so they must be `Send + Sync`.
pub trait PackageManager: Send + Sync {
    /// Short name for logs ("winget", "brew")
    fn name(&self) -> &'static str;

    /// Install a single package
    fn install(&self, request: &InstallRequest) -> AdapterReport;

    /// Whether the package manager binary can be executed at all
    fn is_available(&self) -> bool {
        true
    }
}

/// Fallback for platforms without a supported package manager
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl PackageManager for UnsupportedPlatform {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn install(&self, request: &InstallRequest) -> AdapterReport {
        log::error!("No package manager for this platform, cannot install {}", request.id);
        AdapterReport::failed("Unsupported platform")
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Pick the adapter for the running OS
pub fn detect_package_manager() -> Box<dyn PackageManager> {
    match std::env::consts::OS {
        "windows" => Box::new(WingetAdapter::new()),
        "macos" | "linux" => Box::new(BrewAdapter::new()),
        other => {
            log::warn!("Unsupported platform: {}", other);
            Box::new(UnsupportedPlatform)
        }
    }
}

/// Captured result of one package-manager process
#[derive(Debug, Clone)]
pub(crate) struct CapturedRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CapturedRun {
    /// stdout lines followed by stderr lines
    pub fn combined(&self) -> Vec<String> {
        self.stdout.iter().chain(self.stderr.iter()).cloned().collect()
    }

    pub fn mentions_already_installed(&self) -> bool {
        self.combined().iter().any(|line| already_installed_pattern().is_match(line))
    }

    /// Map the run onto an outcome. Spawn failures never reach here.
    pub fn into_report(self) -> AdapterReport {
        let output = self.combined();
        let outcome = if self.mentions_already_installed() {
            InstallOutcome::AlreadyInstalled
        } else if self.success {
            InstallOutcome::Installed
        } else if output.is_empty() {
            InstallOutcome::Failed(match self.exit_code {
                Some(code) => format!("Package manager exited with code {}", code),
                None => "Package manager terminated by signal".to_string(),
            })
        } else {
            InstallOutcome::Failed(truncate_chars(&output.join("\n"), MAX_DIAGNOSTIC_CHARS))
        };
        AdapterReport { outcome, output }
    }
}

/// Run a package-manager command to completion, capturing both streams
pub(crate) fn run_captured(command: &mut Command) -> std::io::Result<CapturedRun> {
    log::debug!("Running: {:?}", command);
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    Ok(CapturedRun {
        success: output.status.success(),
        exit_code: output.status.code(),
        stdout: clean_lines(&String::from_utf8_lossy(&output.stdout)),
        stderr: clean_lines(&String::from_utf8_lossy(&output.stderr)),
    })
}

/// Strip ANSI escapes and winget's spinner/progress noise, drop blank lines
pub(crate) fn clean_lines(raw: &str) -> Vec<String> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("valid regex"));

    raw.split(['\n', '\r'])
        .map(|line| ansi.replace_all(line, "").trim().to_string())
        .filter(|line| !line.is_empty() && !is_spinner_line(line))
        .collect()
}

fn is_spinner_line(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '-' | '\\' | '|' | '/' | ' '))
}

fn already_installed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)already\s+installed|no\s+newer\s+package\s+versions\s+are\s+available")
            .expect("valid regex")
    })
}

/// Probe a binary with `--version`
pub(crate) fn binary_responds(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
