//! Windows Package Manager adapter

use super::{binary_responds, run_captured, AdapterReport, InstallRequest, PackageManager};
use std::process::Command;

/// Installs packages with `winget install --id <id>`
#[derive(Debug, Clone)]
pub struct WingetAdapter {
    program: String,
}

impl Default for WingetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WingetAdapter {
    pub fn new() -> Self {
        Self {
            program: "winget".to_string(),
        }
    }

    /// Use a different executable (tests, portable installs)
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one install, in the order winget expects them
    pub fn install_args(request: &InstallRequest) -> Vec<String> {
        let mut args = vec![
            "install".to_string(),
            "--id".to_string(),
            request.id.clone(),
            "--exact".to_string(),
        ];
        if let Some(version) = &request.version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if let Some(source) = &request.source {
            args.push("--source".to_string());
            args.push(source.clone());
        }
        if request.non_interactive {
            args.extend(
                [
                    "--silent",
                    "--disable-interactivity",
                    "--accept-source-agreements",
                    "--accept-package-agreements",
                ]
                .map(String::from),
            );
        }
        args
    }
}

impl PackageManager for WingetAdapter {
    fn name(&self) -> &'static str {
        "winget"
    }

    fn install(&self, request: &InstallRequest) -> AdapterReport {
        log::info!("winget install {}", request.id);

        let mut command = Command::new(&self.program);
        command.args(Self::install_args(request));

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
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
