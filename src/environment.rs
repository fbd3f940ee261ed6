//! Environment side effects - PATH additions, variables and hot-refresh
//!
//! Workers only *record* changes through [`EnvironmentManager`]; nothing
//! touches the process environment until the orchestrator calls
//! `hot_refresh` once, after every worker has finished.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Capability used for post-install environment actions
pub trait EnvironmentManager: Send + Sync {
    /// Append a directory to PATH. Appending an entry that is already
    /// present (compared normalized, case-insensitively) is a no-op that
    /// still returns `true`.
    fn append_to_path(&self, path: &str) -> bool;

    /// Set a variable; `false` if the name or value is unusable
    fn set_env(&self, name: &str, value: &str) -> bool;

    /// Publish recorded changes to the running process
    fn hot_refresh(&self) -> bool;
}

/// One recorded change, for reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    PathAppended(PathBuf),
    VarSet { name: String, value: String },
}

#[derive(Debug, Default)]
struct EnvState {
    path: Vec<PathBuf>,
    appended: Vec<PathBuf>,
    vars: BTreeMap<String, String>,
    changes: Vec<EnvChange>,
    dirty: bool,
}

/// Environment manager backed by the current process.
///
/// Changes are buffered in memory and applied with `std::env::set_var` on
/// hot-refresh. When a profile path is configured, hot-refresh also writes
/// a sourceable shell snippet so new terminals pick the changes up.
#[derive(Debug)]
pub struct ProcessEnvironment {
    state: Mutex<EnvState>,
    profile_path: Option<PathBuf>,
}

impl Default for ProcessEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEnvironment {
    /// Start from the current process PATH
    pub fn new() -> Self {
        let path = std::env::var_os("PATH")
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default();
        Self::with_base_path(path)
    }

    /// Start from an explicit PATH list
    pub fn with_base_path(path: Vec<PathBuf>) -> Self {
        Self {
            state: Mutex::new(EnvState {
                path,
                ..EnvState::default()
            }),
            profile_path: None,
        }
    }

    pub fn with_profile_path(mut self, profile_path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(profile_path.into());
        self
    }

    /// Current PATH entries including not-yet-published additions
    pub fn path_entries(&self) -> Vec<PathBuf> {
        self.lock().path.clone()
    }

    /// Every change recorded so far, in order
    pub fn changes(&self) -> Vec<EnvChange> {
        self.lock().changes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EnvState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_profile(&self, profile: &Path, state: &EnvState) -> std::io::Result<()> {
        if let Some(parent) = profile.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(profile, render_profile(&state.appended, &state.vars))?;
        log::info!("Wrote environment profile to {}", profile.display());
        Ok(())
    }
}

impl EnvironmentManager for ProcessEnvironment {
    fn append_to_path(&self, path: &str) -> bool {
        let Some(entry) = normalize_path(path) else {
            log::warn!("Refusing to add empty path to PATH");
            return false;
        };

        let mut state = self.lock();
        if state.path.iter().any(|existing| same_path(existing, &entry)) {
            log::debug!("{} already on PATH", entry.display());
            return true;
        }

        log::info!("Adding {} to PATH", entry.display());
        state.path.push(entry.clone());
        state.appended.push(entry.clone());
        state.changes.push(EnvChange::PathAppended(entry));
        state.dirty = true;
        true
    }

    fn set_env(&self, name: &str, value: &str) -> bool {
        if name.is_empty() || name.contains('=') || name.contains('\0') || value.contains('\0') {
            log::warn!("Invalid environment variable: {:?}", name);
            return false;
        }

        let mut state = self.lock();
        state.vars.insert(name.to_string(), value.to_string());
        state.changes.push(EnvChange::VarSet {
            name: name.to_string(),
            value: value.to_string(),
        });
        state.dirty = true;
        true
    }

    fn hot_refresh(&self) -> bool {
        let mut state = self.lock();
        if !state.dirty {
            log::debug!("Environment unchanged, nothing to refresh");
            return true;
        }

        let mut ok = true;
        if !state.appended.is_empty() {
            match std::env::join_paths(&state.path) {
                Ok(joined) => set_process_var("PATH", &joined),
                Err(e) => {
                    log::error!("Cannot rebuild PATH: {}", e);
                    ok = false;
                }
            }
        }
        for (name, value) in &state.vars {
            set_process_var(name, &OsString::from(value));
        }

        #[cfg(windows)]
        persist_windows_user_env(&state);

        if let Some(profile) = &self.profile_path {
            if let Err(e) = self.write_profile(profile, &state) {
                log::warn!("Failed to write environment profile {}: {}", profile.display(), e);
                ok = false;
            }
        }

        state.dirty = false;
        log::info!(
            "Environment refreshed: {} PATH additions, {} variables",
            state.appended.len(),
            state.vars.len()
        );
        ok
    }
}

fn set_process_var(name: &str, value: &OsString) {
    std::env::set_var(name, value);
}

/// Persist changes to the user environment so new shells see them
#[cfg(windows)]
fn persist_windows_user_env(state: &EnvState) {
    use std::process::Command;

    let mut commands: Vec<String> = state
        .vars
        .iter()
        .map(|(name, value)| {
            format!(
                "[Environment]::SetEnvironmentVariable('{}', '{}', 'User')",
                name.replace('\'', "''"),
                value.replace('\'', "''")
            )
        })
        .collect();
    for entry in &state.appended {
        let entry = entry.display().to_string().replace('\'', "''");
        commands.push(format!(
            "$p = [Environment]::GetEnvironmentVariable('PATH', 'User'); \
             if (-not (($p -split ';') -contains '{0}')) {{ \
             [Environment]::SetEnvironmentVariable('PATH', ($p.TrimEnd(';') + ';{0}'), 'User') }}",
            entry
        ));
    }

    for script in commands {
        let result = Command::new("powershell")
            .args(["-NoProfile", "-Command", &script])
            .output();
        match result {
            Ok(output) if output.status.success() => {}
            Ok(output) => log::warn!(
                "Failed to persist environment change: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Err(e) => log::warn!("Failed to run powershell: {}", e),
        }
    }
}

/// Normalize a PATH entry: expand `~`, make absolute, drop `.` and
/// trailing separators. Does not touch the filesystem.
pub fn normalize_path(raw: &str) -> Option<PathBuf> {
    let trimmed = raw.trim().trim_matches('"');
    if trimmed.is_empty() {
        return None;
    }

    let expanded = match trimmed.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '\\']) => {
            let home = dirs::home_dir()?;
            home.join(rest.trim_start_matches(['/', '\\']))
        }
        _ => PathBuf::from(trimmed),
    };

    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir().ok()?.join(expanded)
    };

    Some(
        absolute
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect(),
    )
}

fn same_path(a: &Path, b: &Path) -> bool {
    let key = |p: &Path| {
        p.to_string_lossy()
            .trim_end_matches(['/', '\\'])
            .to_lowercase()
    };
    key(a) == key(b)
}

fn render_profile(appended: &[PathBuf], vars: &BTreeMap<String, String>) -> String {
    let mut lines = vec!["# Generated by swiftinstall - source this file from your shell profile".to_string()];
    if !appended.is_empty() {
        let joined: Vec<String> = appended
            .iter()
            .map(|p| shell_escape(&p.display().to_string()))
            .collect();
        lines.push(format!("export PATH=\"$PATH:{}\"", joined.join(":")));
    }
    for (name, value) in vars {
        lines.push(format!("export {}=\"{}\"", name, shell_escape(value)));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Escape for use inside a double-quoted shell string
fn shell_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$")
        .replace('`', "\\`")
}
