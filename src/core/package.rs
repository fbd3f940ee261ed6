//! Package descriptors - the immutable templates a batch is built from

use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Install priority. Lower ordinal is dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.ordinal()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Critical),
            1 => Ok(Self::High),
            2 => Ok(Self::Normal),
            3 => Ok(Self::Low),
            other => Err(format!("invalid priority ordinal {} (expected 0-3)", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

fn default_category() -> String {
    "Other".to_string()
}

/// One installable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package-manager identifier (`Git.Git`, `ripgrep`, ...)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Package source: winget source name or brew tap
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    /// Ids of sibling packages that must succeed first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Shell commands run after a successful install
    #[serde(default)]
    pub post_install: Vec<String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub path_additions: Vec<String>,
}

impl PackageDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: None,
            source: None,
            category: default_category(),
            priority: Priority::Normal,
            dependencies: Vec::new(),
            post_install: Vec::new(),
            env_vars: BTreeMap::new(),
            path_additions: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
        self
    }

    pub fn with_post_install(mut self, command: impl Into<String>) -> Self {
        self.post_install.push(command.into());
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_path_addition(mut self, path: impl Into<String>) -> Self {
        self.path_additions.push(path.into());
        self
    }

    /// Check the descriptor on its own. Called when packages are loaded
    /// and when a session is created.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(BatchError::invalid(&self.id, "id must not be empty"));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(BatchError::invalid(&self.id, "id must not contain whitespace"));
        }
        if self.name.trim().is_empty() {
            return Err(BatchError::invalid(&self.id, "name must not be empty"));
        }
        if self.dependencies.iter().any(|dep| dep == &self.id) {
            return Err(BatchError::invalid(&self.id, "package depends on itself"));
        }
        if let Some(name) = self.env_vars.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(BatchError::invalid(
                &self.id,
                format!("invalid environment variable name '{}'", name),
            ));
        }
        Ok(())
    }

    /// Dependencies with duplicates dropped, declaration order kept
    pub fn unique_dependencies(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.dependencies
            .iter()
            .filter(|dep| seen.insert(dep.as_str()))
            .map(String::as_str)
            .collect()
    }
}

/// Validate every descriptor and reject duplicate ids
pub fn validate_packages(packages: &[PackageDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for package in packages {
        package.validate()?;
        if !seen.insert(package.id.as_str()) {
            return Err(BatchError::DuplicatePackage(package.id.clone()));
        }
    }
    Ok(())
}

/// A problem in the dependency graph of a package list.
///
/// The orchestrator tolerates these (affected packages end up skipped);
/// they are reported so callers can fix their lists up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyIssue {
    /// `package` depends on an id that is not in the list
    Unknown { package: String, dependency: String },
    /// Dependency cycle, first id repeated at the end
    Cycle(Vec<String>),
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown { package, dependency } => {
                write!(f, "'{}' depends on unknown package '{}'", package, dependency)
            }
            Self::Cycle(path) => write!(f, "dependency cycle: {}", path.join(" -> ")),
        }
    }
}

/// Find unknown dependencies and cycles. Packages are visited in list
/// order so the report is deterministic.
pub fn validate_dependencies(packages: &[PackageDescriptor]) -> Vec<DependencyIssue> {
    let edges: HashMap<&str, Vec<&str>> = packages
        .iter()
        .map(|p| (p.id.as_str(), p.unique_dependencies()))
        .collect();

    let mut issues = Vec::new();
    for package in packages {
        for dep in package.unique_dependencies() {
            if !edges.contains_key(dep) {
                issues.push(DependencyIssue::Unknown {
                    package: package.id.clone(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let mut visited = HashSet::new();
    for package in packages {
        let mut stack = Vec::new();
        if !visited.contains(package.id.as_str()) {
            if let Some(cycle) = find_cycle(package.id.as_str(), &edges, &mut visited, &mut stack) {
                issues.push(DependencyIssue::Cycle(cycle));
            }
        }
    }

    issues
}

fn find_cycle<'a>(
    node: &'a str,
    edges: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    stack.push(node);

    for &dep in edges.get(node).map(Vec::as_slice).unwrap_or_default() {
        if let Some(pos) = stack.iter().position(|n| *n == dep) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(dep.to_string());
            return Some(cycle);
        }
        if edges.contains_key(dep) && !visited.contains(dep) {
            if let Some(cycle) = find_cycle(dep, edges, visited, stack) {
                return Some(cycle);
            }
        }
    }

    stack.pop();
    None
}
