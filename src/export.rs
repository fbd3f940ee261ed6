//! Automation export - install scripts and package list documents
//!
//! Scripts replay a package list without this tool installed. Config
//! documents are the interchange format the CLI reads package lists from.

use crate::adapters::{BrewAdapter, InstallRequest, WingetAdapter};
use crate::core::{validate_packages, PackageDescriptor};
use crate::error::{BatchError, Result};
use crate::session::session_id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Current config document version
pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    PowerShell,
    Bash,
    Python,
}

impl ScriptKind {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::PowerShell => "ps1",
            Self::Bash => "sh",
            Self::Python => "py",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerShell => write!(f, "powershell"),
            Self::Bash => write!(f, "bash"),
            Self::Python => write!(f, "python"),
        }
    }
}

impl FromStr for ScriptKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "powershell" | "ps1" | "pwsh" => Ok(Self::PowerShell),
            "bash" | "sh" => Ok(Self::Bash),
            "python" | "py" => Ok(Self::Python),
            other => Err(format!("unknown script type '{}' (powershell, bash, python)", other)),
        }
    }
}

/// Render an install script. Output depends only on the arguments.
pub fn generate_script(
    packages: &[PackageDescriptor],
    kind: ScriptKind,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let timestamp = generated_at.to_rfc3339();
    let session = session_id(&generated_at, packages.len());
    let script = match kind {
        ScriptKind::PowerShell => powershell_script(packages, &timestamp, &session),
        ScriptKind::Bash => bash_script(packages, &timestamp, &session),
        ScriptKind::Python => python_script(packages, &timestamp, &session),
    }?;
    Ok(script)
}

/// Render and write a script, returning its text
pub fn write_script(
    path: &Path,
    packages: &[PackageDescriptor],
    kind: ScriptKind,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let script = generate_script(packages, kind, generated_at)?;
    fs::write(path, &script)?;
    log::info!("Wrote {} script for {} packages to {}", kind, packages.len(), path.display());
    Ok(script)
}

fn request(package: &PackageDescriptor) -> InstallRequest {
    InstallRequest::for_package(package, true)
}

fn powershell_script(
    packages: &[PackageDescriptor],
    timestamp: &str,
    session: &str,
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "# SwiftInstall Automation Script")?;
    writeln!(out, "# Generated: {}", timestamp)?;
    writeln!(out, "# Session: {}", session)?;
    out.push_str(
        r#"
$ErrorActionPreference = "Continue"

function Write-Log {
    param([string]$Message)
    $timestamp = Get-Date -Format "yyyy-MM-dd HH:mm:ss"
    Write-Host "[$timestamp] $Message"
}

"#,
    );
    writeln!(out, "Write-Log \"Starting SwiftInstall Automation...\"")?;
    writeln!(out, "Write-Log \"Session ID: {}\"", session)?;
    out.push_str("\n$successCount = 0\n$failedCount = 0\n$skippedCount = 0\n\n");

    for package in packages {
        let name = ps_quote(&package.name);
        let args: Vec<String> = WingetAdapter::install_args(&request(package))
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                // subcommand and flags stay bare, values are quoted
                if i == 0 || arg.starts_with("--") {
                    arg.clone()
                } else {
                    ps_quote(arg)
                }
            })
            .collect();

        writeln!(out, "# Installing: {}", package.name)?;
        writeln!(out, "Write-Log (\"Installing \" + {})", name)?;
        writeln!(out, "$result = winget {} 2>&1", args.join(" "))?;
        writeln!(out, "if ($result -match \"already installed\") {{")?;
        writeln!(out, "    $skippedCount++")?;
        writeln!(out, "    Write-Log (\"Already installed: \" + {})", name)?;
        writeln!(out, "}} elseif ($LASTEXITCODE -eq 0) {{")?;
        writeln!(out, "    $successCount++")?;
        writeln!(out, "    Write-Log (\"Successfully installed: \" + {})", name)?;
        writeln!(out, "}} else {{")?;
        writeln!(out, "    $failedCount++")?;
        writeln!(out, "    Write-Log (\"Failed to install: \" + {})", name)?;
        writeln!(out, "}}")?;
        out.push('\n');
    }

    out.push_str("Write-Log \"Automation completed.\"\n");
    out.push_str("Write-Log \"Success: $successCount, Failed: $failedCount, Skipped: $skippedCount\"\n");
    Ok(out)
}

fn bash_script(
    packages: &[PackageDescriptor],
    timestamp: &str,
    session: &str,
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::from("#!/bin/bash\n");
    writeln!(out, "# SwiftInstall Automation Script")?;
    writeln!(out, "# Generated: {}", timestamp)?;
    writeln!(out, "# Session: {}", session)?;
    out.push_str(
        r#"
log() {
    echo "[$(date '+%Y-%m-%d %H:%M:%S')] $1"
}

"#,
    );
    out.push_str("log \"Starting SwiftInstall Automation...\"\n");
    writeln!(out, "log \"Session ID: {}\"", session)?;
    out.push_str("\nsuccess_count=0\nfailed_count=0\nskipped_count=0\n\n");

    for package in packages {
        let name = sh_quote(&package.name);
        let formula = sh_quote(&BrewAdapter::formula(&request(package)));

        writeln!(out, "# Installing: {}", package.name.replace('\n', " "))?;
        writeln!(out, "log \"Installing \"{}", name)?;
        writeln!(out, "if brew list {} >/dev/null 2>&1; then", formula)?;
        out.push_str("    skipped_count=$((skipped_count + 1))\n");
        writeln!(out, "    log \"Already installed: \"{}", name)?;
        writeln!(out, "elif NONINTERACTIVE=1 brew install {}; then", formula)?;
        out.push_str("    success_count=$((success_count + 1))\n");
        writeln!(out, "    log \"Successfully installed: \"{}", name)?;
        out.push_str("else\n");
        out.push_str("    failed_count=$((failed_count + 1))\n");
        writeln!(out, "    log \"Failed to install: \"{}", name)?;
        out.push_str("fi\n\n");
    }

    out.push_str("log \"Automation completed.\"\n");
    out.push_str("log \"Success: $success_count, Failed: $failed_count, Skipped: $skipped_count\"\n");
    Ok(out)
}

fn python_script(
    packages: &[PackageDescriptor],
    timestamp: &str,
    session: &str,
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::from("#!/usr/bin/env python3\n\"\"\"\nSwiftInstall Automation Script\n");
    writeln!(out, "Generated: {}", timestamp)?;
    writeln!(out, "Session: {}", session)?;
    out.push_str(
        r#""""

import subprocess
import sys
from datetime import datetime


def log(message):
    timestamp = datetime.now().strftime("%Y-%m-%d %H:%M:%S")
    print(f"[{timestamp}] {message}")


def install_package(winget_args, formula):
    """Install one package; returns "installed", "present" or "failed"."""
    if sys.platform == "win32":
        cmd = ["winget"] + winget_args
    else:
        cmd = ["brew", "install", formula]
    try:
        result = subprocess.run(cmd, capture_output=True, text=True)
    except OSError as e:
        log(f"Error running {cmd[0]}: {e}")
        return "failed"
    if "already installed" in (result.stdout + result.stderr).lower():
        return "present"
    return "installed" if result.returncode == 0 else "failed"


"#,
    );
    out.push_str("log(\"Starting SwiftInstall Automation...\")\n");
    writeln!(out, "log(\"Session ID: {}\")", session)?;
    out.push_str("\nsuccess_count = 0\nfailed_count = 0\nskipped_count = 0\n\n");

    for package in packages {
        let request = request(package);
        let name = py_quote(&package.name);
        let args: Vec<String> = WingetAdapter::install_args(&request)
            .iter()
            .map(|arg| py_quote(arg))
            .collect();

        writeln!(out, "# Installing: {}", package.name.replace('\n', " "))?;
        writeln!(out, "log(\"Installing \" + {})", name)?;
        writeln!(
            out,
            "outcome = install_package([{}], {})",
            args.join(", "),
            py_quote(&BrewAdapter::formula(&request))
        )?;
        out.push_str("if outcome == \"installed\":\n");
        out.push_str("    success_count += 1\n");
        writeln!(out, "    log(\"Successfully installed: \" + {})", name)?;
        out.push_str("elif outcome == \"present\":\n");
        out.push_str("    skipped_count += 1\n");
        writeln!(out, "    log(\"Already installed: \" + {})", name)?;
        out.push_str("else:\n");
        out.push_str("    failed_count += 1\n");
        writeln!(out, "    log(\"Failed to install: \" + {})", name)?;
        out.push('\n');
    }

    out.push_str("log(\"Automation completed.\")\n");
    out.push_str("log(f\"Success: {success_count}, Failed: {failed_count}, Skipped: {skipped_count}\")\n");
    Ok(out)
}

/// Double-quoted PowerShell string
fn ps_quote(value: &str) -> String {
    let escaped = value
        .replace('`', "``")
        .replace('"', "`\"")
        .replace('$', "`$");
    format!("\"{}\"", escaped)
}

/// Single-quoted POSIX shell string
fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// JSON string literals are valid Python string literals
fn py_quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Serialization format of a config document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("yml") | Some("yaml") => Ok(Self::Yaml),
            _ => Err(BatchError::UnknownFormat(path.display().to_string())),
        }
    }
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

/// A saved package list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub packages: Vec<PackageDescriptor>,
}

impl ConfigDocument {
    pub fn new(packages: Vec<PackageDescriptor>, generated_at: DateTime<Utc>) -> Self {
        Self {
            version: default_version(),
            generated: Some(generated_at),
            packages,
        }
    }
}

pub fn dump_config(document: &ConfigDocument, format: ConfigFormat) -> Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(document)?,
        ConfigFormat::Yaml => serde_yaml::to_string(document)?,
    })
}

/// Parse and validate a document
pub fn load_config(text: &str, format: ConfigFormat) -> Result<ConfigDocument> {
    let document: ConfigDocument = match format {
        ConfigFormat::Json => serde_json::from_str(text)?,
        ConfigFormat::Yaml => serde_yaml::from_str(text)?,
    };
    if document.version.split('.').next() != CONFIG_VERSION.split('.').next() {
        log::warn!(
            "Config version {} differs from supported {}, loading anyway",
            document.version,
            CONFIG_VERSION
        );
    }
    validate_packages(&document.packages)?;
    Ok(document)
}

pub fn write_config(path: &Path, document: &ConfigDocument) -> Result<()> {
    let text = dump_config(document, ConfigFormat::from_path(path)?)?;
    fs::write(path, text)?;
    log::info!("Wrote {} packages to {}", document.packages.len(), path.display());
    Ok(())
}

pub fn read_config(path: &Path) -> Result<ConfigDocument> {
    let format = ConfigFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let document = load_config(&text, format)?;
    log::info!("Loaded {} packages from {}", document.packages.len(), path.display());
    Ok(document)
}
