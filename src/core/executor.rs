//! Task Executor - runs one install task on a blocking worker thread
//!
//! The executor owns nothing but handles to the adapter and environment
//! services. The dispatch loop hands it a task record, it drives the record
//! through its states and hands it back. Panics anywhere in that sequence
//! are caught here and turned into a FAILED task.

use super::task::{InstallStatus, InstallTask, TransitionError};
use crate::adapters::{run_captured, InstallOutcome, InstallRequest, PackageManager};
use crate::environment::EnvironmentManager;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::process::Command;
use std::sync::Arc;

/// Progress observer: `(task_id, status, progress)`.
///
/// Called synchronously on the thread executing the task.
pub type ProgressCallback = Arc<dyn Fn(&str, InstallStatus, u8) + Send + Sync>;

/// Progress reported once the package manager has returned and post-install
/// actions are about to run
const POST_INSTALL_PROGRESS: u8 = 80;

/// Invoke the callback, containing any panic it raises
pub(crate) fn notify(callback: Option<&ProgressCallback>, id: &str, status: InstallStatus, progress: u8) {
    let Some(callback) = callback else {
        return;
    };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(id, status, progress))) {
        log::error!(
            "Progress callback panicked for {} ({}): {}",
            id,
            status,
            panic_message(payload.as_ref())
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs tasks against the configured services
#[derive(Clone)]
pub struct Executor {
    adapter: Arc<dyn PackageManager>,
    env: Arc<dyn EnvironmentManager>,
    non_interactive: bool,
    progress: Option<ProgressCallback>,
}

impl Executor {
    pub fn new(adapter: Arc<dyn PackageManager>, env: Arc<dyn EnvironmentManager>) -> Self {
        Self {
            adapter,
            env,
            non_interactive: true,
            progress: None,
        }
    }

    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Execute one task to a terminal state. Never panics.
    pub fn run(&self, mut task: InstallTask) -> InstallTask {
        let id = task.id().to_string();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(&mut task)));
        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("Internal error: {}", e)),
            Err(payload) => Some(format!("Unexpected error: {}", panic_message(payload.as_ref()))),
        };

        if let Some(diagnostic) = failure {
            log::error!("Installation of {} aborted: {}", id, diagnostic);
            task.force_failed(&diagnostic);
            self.notify(&id, InstallStatus::Failed, 0);
        }
        task
    }

    fn execute(&self, task: &mut InstallTask) -> Result<(), TransitionError> {
        let id = task.id().to_string();
        task.mark_installing()?;
        self.notify(&id, InstallStatus::Installing, 0);
        log::info!("Starting installation: {} via {}", task.package.name, self.adapter.name());

        let request = InstallRequest::for_package(&task.package, self.non_interactive);
        let report = self.adapter.install(&request);
        task.output.extend(report.output);

        let status = match report.outcome {
            InstallOutcome::Installed => InstallStatus::Success,
            InstallOutcome::AlreadyInstalled => InstallStatus::AlreadyInstalled,
            InstallOutcome::Failed(diagnostic) => {
                task.finish_failed(&diagnostic)?;
                log::warn!("Failed to install {}: {}", task.package.name, first_line(&diagnostic));
                self.notify(&id, InstallStatus::Failed, 0);
                return Ok(());
            }
        };

        task.set_progress(POST_INSTALL_PROGRESS);
        self.notify(&id, InstallStatus::Installing, POST_INSTALL_PROGRESS);
        self.post_install(task);

        task.finish_ok(status)?;
        match status {
            InstallStatus::AlreadyInstalled => log::info!("Already installed: {}", task.package.name),
            _ => log::info!("Successfully installed: {}", task.package.name),
        }
        self.notify(&id, status, 100);
        Ok(())
    }

    /// PATH additions, variables, then follow-up commands. Every step is
    /// best-effort: failures are logged and never change the task outcome.
    fn post_install(&self, task: &mut InstallTask) {
        let package = &task.package;

        for path in &package.path_additions {
            if !self.env.append_to_path(path) {
                log::warn!("Failed to add to PATH for {}: {}", package.id, path);
            }
        }

        for (name, value) in &package.env_vars {
            if !self.env.set_env(name, value) {
                log::warn!("Failed to set env var for {}: {}", package.id, name);
            }
        }

        let mut lines = Vec::new();
        for command in &package.post_install {
            log::debug!("Post-install for {}: {}", package.id, command);
            match run_captured(&mut shell_command(command)) {
                Ok(run) if run.success => lines.extend(run.combined()),
                Ok(run) => {
                    log::warn!(
                        "Post-install command failed for {} (exit {:?}): {}",
                        package.id,
                        run.exit_code,
                        command
                    );
                    lines.extend(run.combined());
                }
                Err(e) => log::warn!("Post-install command failed for {}: {} ({})", package.id, command, e),
            }
        }
        task.output.extend(lines);
    }

    fn notify(&self, id: &str, status: InstallStatus, progress: u8) {
        notify(self.progress.as_ref(), id, status, progress);
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterReport;
    use crate::core::PackageDescriptor;
    use crate::error::ErrorCategory;
    use std::sync::Mutex;

    struct FixedAdapter(InstallOutcome);

    impl PackageManager for FixedAdapter {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn install(&self, _request: &InstallRequest) -> AdapterReport {
            AdapterReport {
                outcome: self.0.clone(),
                output: vec!["adapter output".to_string()],
            }
        }
    }

    struct PanickingAdapter;

    impl PackageManager for PanickingAdapter {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn install(&self, _request: &InstallRequest) -> AdapterReport {
            panic!("adapter exploded")
        }
    }

    #[derive(Default)]
    struct RecordingEnv {
        ops: Mutex<Vec<String>>,
    }

    impl EnvironmentManager for RecordingEnv {
        fn append_to_path(&self, path: &str) -> bool {
            self.ops.lock().unwrap().push(format!("path:{}", path));
            true
        }

        fn set_env(&self, name: &str, value: &str) -> bool {
            self.ops.lock().unwrap().push(format!("env:{}={}", name, value));
            false
        }

        fn hot_refresh(&self) -> bool {
            true
        }
    }

    fn package() -> PackageDescriptor {
        PackageDescriptor::new("jdk", "JDK")
            .with_path_addition("/opt/jdk/bin")
            .with_env_var("JAVA_HOME", "/opt/jdk")
    }

    fn executor(adapter: impl PackageManager + 'static, env: Arc<RecordingEnv>) -> Executor {
        Executor::new(Arc::new(adapter), env)
    }

    #[test]
    fn test_success_runs_post_install() {
        let env = Arc::new(RecordingEnv::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ProgressCallback = Arc::new(move |id: &str, status: InstallStatus, progress: u8| {
            sink.lock().unwrap().push((id.to_string(), status, progress));
        });

        let task = executor(FixedAdapter(InstallOutcome::Installed), env.clone())
            .with_progress(Some(callback))
            .run(InstallTask::new(package()));

        assert_eq!(task.status, InstallStatus::Success);
        assert_eq!(task.progress, 100);
        assert!(task.start_time.is_some() && task.end_time.is_some());
        assert_eq!(task.output, vec!["adapter output"]);
        // set_env failing is only a warning
        assert_eq!(
            *env.ops.lock().unwrap(),
            vec!["path:/opt/jdk/bin", "env:JAVA_HOME=/opt/jdk"]
        );

        let events = events.lock().unwrap();
        assert_eq!(events.first().unwrap().1, InstallStatus::Installing);
        assert_eq!(*events.last().unwrap(), ("jdk".to_string(), InstallStatus::Success, 100));
    }

    #[test]
    fn test_already_installed_still_runs_post_install() {
        let env = Arc::new(RecordingEnv::default());
        let task = executor(FixedAdapter(InstallOutcome::AlreadyInstalled), env.clone())
            .run(InstallTask::new(package()));
        assert_eq!(task.status, InstallStatus::AlreadyInstalled);
        assert_eq!(env.ops.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_failure_skips_post_install() {
        let env = Arc::new(RecordingEnv::default());
        let task = executor(
            FixedAdapter(InstallOutcome::Failed("network timeout while downloading".to_string())),
            env.clone(),
        )
        .run(InstallTask::new(package()));

        assert_eq!(task.status, InstallStatus::Failed);
        assert_eq!(task.progress, 0);
        assert_eq!(task.error_category, Some(ErrorCategory::Network));
        assert!(env.ops.lock().unwrap().is_empty());
    }

    #[test]
    fn test_adapter_panic_becomes_failed() {
        let env = Arc::new(RecordingEnv::default());
        let task = executor(PanickingAdapter, env).run(InstallTask::new(package()));
        assert_eq!(task.status, InstallStatus::Failed);
        assert!(task.error_message.unwrap().contains("adapter exploded"));
        assert!(task.end_time.is_some());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let env = Arc::new(RecordingEnv::default());
        let callback: ProgressCallback = Arc::new(|_: &str, _: InstallStatus, _: u8| panic!("observer bug"));
        let task = executor(FixedAdapter(InstallOutcome::Installed), env)
            .with_progress(Some(callback))
            .run(InstallTask::new(package()));
        assert_eq!(task.status, InstallStatus::Success);
    }

    #[test]
    fn test_non_pending_task_fails_cleanly() {
        let env = Arc::new(RecordingEnv::default());
        let mut finished = InstallTask::new(PackageDescriptor::new("git", "Git"));
        finished.mark_installing().unwrap();
        finished.finish_ok(InstallStatus::Success).unwrap();

        let task = executor(FixedAdapter(InstallOutcome::Installed), env).run(finished);
        assert_eq!(task.status, InstallStatus::Failed);
        assert!(task.error_message.unwrap().starts_with("Internal error"));
    }

    #[cfg(unix)]
    #[test]
    fn test_post_install_commands_capture_output() {
        let env = Arc::new(RecordingEnv::default());
        let pkg = PackageDescriptor::new("tool", "Tool")
            .with_post_install("echo configured")
            .with_post_install("exit 3");
        let task = executor(FixedAdapter(InstallOutcome::Installed), env).run(InstallTask::new(pkg));
        assert_eq!(task.status, InstallStatus::Success);
        assert!(task.output.contains(&"configured".to_string()));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
