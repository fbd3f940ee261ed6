//! Homebrew adapter (macOS and Linuxbrew)

use super::{binary_responds, run_captured, AdapterReport, InstallRequest, PackageManager};
use std::process::Command;

/// Installs formulae with `brew install <id>`
#[derive(Debug, Clone)]
pub struct BrewAdapter {
    program: String,
}

impl Default for BrewAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BrewAdapter {
    pub fn new() -> Self {
        Self {
            program: "brew".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Formula reference: `tap/name` when a source tap is given,
    /// `name@version` for versioned formulae
    pub fn formula(request: &InstallRequest) -> String {
        let name = match &request.version {
            Some(version) => format!("{}@{}", request.id, version),
            None => request.id.clone(),
        };
        match &request.source {
            Some(tap) if !request.id.contains('/') => format!("{}/{}", tap.trim_end_matches('/'), name),
            _ => name,
        }
    }
}

impl PackageManager for BrewAdapter {
    fn name(&self) -> &'static str {
        "brew"
    }

    fn install(&self, request: &InstallRequest) -> AdapterReport {
        let formula = Self::formula(request);
        log::info!("brew install {}", formula);

        let mut command = Command::new(&self.program);
        command.arg("install").arg(&formula);
        if request.non_interactive {
            command
                .env("NONINTERACTIVE", "1")
                .env("HOMEBREW_NO_AUTO_UPDATE", "1")
                .env("HOMEBREW_NO_ENV_HINTS", "1");
        }

        match run_captured(&mut command) {
            Ok(run) => run.into_report(),
            Err(e) => {
                log::error!("Failed to run {}: {}", self.program, e);
                AdapterReport::failed(format!("Failed to run {}: {}", self.program, e))
            }
        }
    }

    fn is_available(&self) -> bool {
        binary_responds(&self.program)
    }
}
