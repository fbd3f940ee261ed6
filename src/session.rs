//! Install sessions - the record of one batch run

use crate::core::{InstallStatus, InstallTask, PackageDescriptor};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Max characters of a task error shown in the session report
const REPORT_ERROR_CHARS: usize = 100;

const RULE_WIDTH: usize = 60;

/// A session represents one batch run. It is built once, mutated by the
/// dispatch loop only, and discarded afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct InstallSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_packages: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Tasks in submission order
    tasks: Vec<InstallTask>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl InstallSession {
    /// Create a session with one pending task per package. Ids must
    /// already be validated as unique.
    pub fn new(packages: &[PackageDescriptor], max_retries: u32) -> Self {
        let start_time = Utc::now();
        let tasks: Vec<InstallTask> = packages
            .iter()
            .cloned()
            .map(|pkg| InstallTask::new(pkg).with_max_retries(max_retries))
            .collect();
        let index = tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.id().to_string(), i))
            .collect();

        Self {
            session_id: session_id(&start_time, packages.len()),
            start_time,
            end_time: None,
            total_packages: packages.len(),
            completed: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            tasks,
            index,
        }
    }

    pub fn task(&self, id: &str) -> Option<&InstallTask> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut InstallTask> {
        self.index.get(id).map(|&i| &mut self.tasks[i])
    }

    /// Tasks in submission order
    pub fn tasks(&self) -> impl Iterator<Item = &InstallTask> {
        self.tasks.iter()
    }

    pub fn status_of(&self, id: &str) -> Option<InstallStatus> {
        self.task(id).map(|t| t.status)
    }

    /// Replace a task record with the one handed back by a worker
    pub(crate) fn store(&mut self, task: InstallTask) {
        if let Some(&i) = self.index.get(task.id()) {
            self.tasks[i] = task;
        }
    }

    /// Fold one terminal status into the counters
    pub(crate) fn record(&mut self, status: InstallStatus) {
        match status {
            InstallStatus::Success | InstallStatus::AlreadyInstalled => self.completed += 1,
            InstallStatus::Failed => self.failed += 1,
            InstallStatus::Skipped => self.skipped += 1,
            InstallStatus::Cancelled => self.cancelled += 1,
            other => log::warn!("Ignoring non-terminal status in counters: {}", other),
        }
    }

    /// Take a failed task out of the failure count before it is re-run
    pub(crate) fn unrecord_failure(&mut self) {
        self.failed = self.failed.saturating_sub(1);
    }

    pub(crate) fn end(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Number of tasks whose package was already present
    pub fn already_installed(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == InstallStatus::AlreadyInstalled)
            .count()
    }

    /// Sum of all terminal counters
    pub fn resolved(&self) -> usize {
        self.completed + self.failed + self.skipped + self.cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(|t| t.status.is_terminal())
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled > 0
    }

    /// Plain-text report: header, summary, one line per task
    pub fn report(&self) -> String {
        let rule = "=".repeat(RULE_WIDTH);
        let mut lines = vec![
            rule.clone(),
            "Installation Session Report".to_string(),
            format!("Session ID: {}", self.session_id),
            format!("Start Time: {}", self.start_time.to_rfc3339()),
            rule.clone(),
            String::new(),
            "Summary:".to_string(),
            format!("  Total Packages: {}", self.total_packages),
            format!("  Completed: {}", self.completed),
            format!("  Failed: {}", self.failed),
            format!("  Skipped: {}", self.skipped),
        ];
        if self.cancelled > 0 {
            lines.push(format!("  Cancelled: {}", self.cancelled));
        }
        lines.push(String::new());
        lines.push("Package Details:".to_string());

        for task in &self.tasks {
            lines.push(format!("  [{}] {}", task.status.glyph(), task.package.name));
            if let Some(error) = &task.error_message {
                let shown = crate::core::truncate_chars(error, REPORT_ERROR_CHARS);
                lines.push(format!("      Error: {}", shown.replace('\n', " ")));
            }
        }

        lines.push(String::new());
        lines.push(rule);
        lines.join("\n")
    }
}

/// First 12 hex chars of SHA-256 over creation time and task count
pub(crate) fn session_id(start_time: &DateTime<Utc>, task_count: usize) -> String {
    let digest = Sha256::digest(format!("{}_{}", start_time.to_rfc3339(), task_count));
    digest
        .iter()
        .take(6)
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packages() -> Vec<PackageDescriptor> {
        vec![
            PackageDescriptor::new("git", "Git"),
            PackageDescriptor::new("ripgrep", "ripgrep"),
        ]
    }

    #[test]
    fn test_session_creation() {
        let session = InstallSession::new(&packages(), 3);
        assert_eq!(session.total_packages, 2);
        assert_eq!(session.session_id.len(), 12);
        assert!(session.session_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(session.end_time.is_none());

        let ids: Vec<&str> = session.tasks().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["git", "ripgrep"]);
        assert!(session.tasks().all(|t| t.status == InstallStatus::Pending));
    }

    #[test]
    fn test_empty_session() {
        let session = InstallSession::new(&[], 3);
        assert_eq!(session.total_packages, 0);
        assert!(session.is_finished());
        assert_eq!(session.resolved(), 0);
    }

    #[test]
    fn test_record_counters() {
        let mut session = InstallSession::new(&packages(), 3);
        session.record(InstallStatus::Success);
        session.record(InstallStatus::AlreadyInstalled);
        session.record(InstallStatus::Failed);
        session.record(InstallStatus::Skipped);
        session.record(InstallStatus::Installing);
        assert_eq!(session.completed, 2);
        assert_eq!(session.failed, 1);
        assert_eq!(session.skipped, 1);
        assert_eq!(session.cancelled, 0);
    }

    #[test]
    fn test_store_replaces_task() {
        let mut session = InstallSession::new(&packages(), 3);
        let mut task = session.task("git").unwrap().clone();
        task.mark_installing().unwrap();
        task.finish_ok(InstallStatus::Success).unwrap();
        session.store(task);
        assert_eq!(session.status_of("git"), Some(InstallStatus::Success));
        assert_eq!(session.status_of("missing"), None);
    }

    #[test]
    fn test_report_format() {
        let mut session = InstallSession::new(&packages(), 3);
        let task = session.task_mut("ripgrep").unwrap();
        task.mark_installing().unwrap();
        task.finish_failed(&"e".repeat(300)).unwrap();
        session.record(InstallStatus::Failed);

        let report = session.report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "=".repeat(60));
        assert_eq!(lines[1], "Installation Session Report");
        assert!(lines[2].starts_with("Session ID: "));
        assert!(report.contains("  Total Packages: 2"));
        assert!(report.contains("  Failed: 1"));
        assert!(!report.contains("Cancelled"));
        assert!(report.contains("  [·] Git"));
        assert!(report.contains("  [✗] ripgrep"));
        assert!(report.contains(&format!("      Error: {}", "e".repeat(100))));
        assert!(!report.contains(&"e".repeat(101)));
    }
}
