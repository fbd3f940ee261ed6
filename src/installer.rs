//! Batch installer - priority dispatch over a bounded worker pool
//!
//! The dispatch loop is the single owner of the [`InstallSession`]. Each
//! submitted task is cloned into a blocking worker and the finished record
//! comes back through a [`JoinSet`]; counters, gating and cancellation are
//! only ever touched by the loop.

use crate::adapters::PackageManager;
use crate::core::{
    self, Executor, InstallStatus, InstallTask, PackageDescriptor, ProgressCallback, Scheduler,
    DEFAULT_MAX_RETRIES,
};
use crate::environment::EnvironmentManager;
use crate::error::{BatchError, Result};
use crate::session::InstallSession;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Hard cap on concurrent package-manager invocations
pub const MAX_WORKERS: usize = 4;

/// Cooperative cancellation flag shared between the installer and callers.
///
/// Cancelling stops new dispatch. Adapter calls already in flight run to
/// completion and are still folded into the session.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RunMode {
    parallel: bool,
    stop_on_error: bool,
}

impl Default for RunMode {
    fn default() -> Self {
        Self {
            parallel: true,
            stop_on_error: false,
        }
    }
}

/// A worker's result as seen by the dispatch loop
struct Completion {
    id: String,
    result: std::result::Result<InstallTask, String>,
}

/// Orchestrates one batch at a time
pub struct BatchInstaller {
    adapter: Arc<dyn PackageManager>,
    env: Arc<dyn EnvironmentManager>,
    max_workers: usize,
    max_retries: u32,
    non_interactive: bool,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
    mode: RunMode,
    session: Option<InstallSession>,
}

impl BatchInstaller {
    pub fn new(adapter: Arc<dyn PackageManager>, env: Arc<dyn EnvironmentManager>) -> Self {
        Self {
            adapter,
            env,
            max_workers: MAX_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            non_interactive: true,
            progress: None,
            cancel: CancelToken::new(),
            mode: RunMode::default(),
            session: None,
        }
    }

    /// Pool width, clamped to `1..=MAX_WORKERS`
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.clamp(1, MAX_WORKERS);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_non_interactive(mut self, non_interactive: bool) -> Self {
        self.non_interactive = non_interactive;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Observe every status/progress transition. The callback runs on the
    /// worker executing the task; a panic inside it is logged and ignored.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(&str, InstallStatus, u8) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
    }

    /// Request cancellation of the run in progress
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.cancel.cancel();
    }

    /// Handle for cancelling from another task, thread or callback
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The most recent session, if any
    pub fn session(&self) -> Option<&InstallSession> {
        self.session.as_ref()
    }

    /// Build a fresh session with one pending task per package
    pub fn create_session(&mut self, packages: &[PackageDescriptor]) -> Result<&InstallSession> {
        let session = self.new_session(packages)?;
        Ok(&*self.session.insert(session))
    }

    /// Install every package and wait for the batch to drain.
    ///
    /// Returns `Err` only for structural problems with the package list;
    /// per-package failures are recorded on the session.
    pub async fn install_all(
        &mut self,
        packages: &[PackageDescriptor],
        parallel: bool,
        stop_on_error: bool,
    ) -> Result<InstallSession> {
        let mut session = self.new_session(packages)?;
        let mode = RunMode {
            parallel,
            stop_on_error,
        };

        log::info!(
            "Installing {} packages ({}, session {})",
            session.total_packages,
            if parallel {
                format!("parallel, {} workers", self.max_workers)
            } else {
                "sequential".to_string()
            },
            session.session_id
        );

        self.cancel.reset();
        self.dispatch(&mut session, core::priority_order(packages), mode).await;
        self.mode = mode;
        self.session = Some(session.clone());
        Ok(session)
    }

    /// Re-run FAILED tasks of the current session that still have retries
    /// left, using the mode of the last run. Dependents that were skipped
    /// are not re-evaluated.
    pub async fn retry_failed(&mut self) -> Result<InstallSession> {
        let mut session = self.session.take().ok_or(BatchError::NoSession)?;

        let candidates: Vec<String> = session
            .tasks()
            .filter(|t| t.can_retry())
            .map(|t| t.id().to_string())
            .collect();

        let mut retried = Vec::new();
        for id in candidates {
            let Some(task) = session.task_mut(&id) else {
                continue;
            };
            match task.begin_retry() {
                Ok(()) => {
                    log::info!("Retrying {} (attempt {})", id, task.retry_count + 1);
                    retried.push(task.package.clone());
                    session.unrecord_failure();
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        if retried.is_empty() {
            log::info!("Nothing to retry");
        } else {
            self.cancel.reset();
            self.dispatch(&mut session, core::priority_order(&retried), self.mode)
                .await;
        }

        self.session = Some(session.clone());
        Ok(session)
    }

    /// Plain-text report of the current session
    pub fn get_session_report(&self) -> String {
        self.session
            .as_ref()
            .map(InstallSession::report)
            .unwrap_or_else(|| "No active session".to_string())
    }

    fn new_session(&self, packages: &[PackageDescriptor]) -> Result<InstallSession> {
        core::validate_packages(packages)?;
        for issue in core::validate_dependencies(packages) {
            log::warn!("{}", issue);
        }
        Ok(InstallSession::new(packages, self.max_retries))
    }

    fn executor(&self) -> Executor {
        Executor::new(self.adapter.clone(), self.env.clone())
            .with_non_interactive(self.non_interactive)
            .with_progress(self.progress.clone())
    }

    /// Run `order` to completion, then publish environment changes once
    async fn dispatch(&self, session: &mut InstallSession, order: Vec<String>, mode: RunMode) {
        let executor = self.executor();
        let mut scheduler = Scheduler::new(order);

        if mode.parallel {
            self.run_parallel(&executor, session, &mut scheduler, mode.stop_on_error)
                .await;
        } else {
            self.run_sequential(&executor, session, &mut scheduler, mode.stop_on_error)
                .await;
        }

        for id in scheduler.get_running() {
            log::error!("Worker for {} never reported back", id);
            if let Some(task) = session.task_mut(&id) {
                task.force_failed("Worker lost before reporting a result");
            }
            session.record(InstallStatus::Failed);
        }

        if !self.env.hot_refresh() {
            log::warn!("Environment refresh failed, open a new terminal to pick up changes");
        }
        session.end();

        log::info!(
            "Batch finished: {} completed, {} failed, {} skipped, {} cancelled",
            session.completed,
            session.failed,
            session.skipped,
            session.cancelled
        );
    }

    async fn run_parallel(
        &self,
        executor: &Executor,
        session: &mut InstallSession,
        scheduler: &mut Scheduler,
        stop_on_error: bool,
    ) {
        let mut in_flight: JoinSet<Completion> = JoinSet::new();

        loop {
            let (id, released) = match scheduler.next() {
                Some(id) => (id, false),
                None if scheduler.has_parked() => {
                    if self.collect_next(session, scheduler, &mut in_flight, stop_on_error).await {
                        continue;
                    }
                    // Nothing in flight: what is left only waits on other parked tasks
                    match scheduler.release_parked() {
                        Some(id) => (id, true),
                        None => break,
                    }
                }
                None => break,
            };

            if self.cancel_if_requested(session, &id) {
                continue;
            }
            let Some(package) = session.task(&id).map(|t| t.package.clone()) else {
                continue;
            };

            // Dependencies still in flight: judge the gate once they settle
            if !released && scheduler.is_blocked(&package) {
                log::debug!("Parking {} until its dependencies settle", id);
                scheduler.park(package);
                continue;
            }
            if !self.passes_gate(session, &package) {
                continue;
            }

            while in_flight.len() >= self.max_workers {
                if !self.collect_next(session, scheduler, &mut in_flight, stop_on_error).await {
                    break;
                }
            }
            if self.cancel_if_requested(session, &id) {
                continue;
            }

            if let Some(task) = session.task(&id).cloned() {
                scheduler.mark_started(&id);
                in_flight.spawn(run_on_worker(executor.clone(), task));
            }
        }

        while self.collect_next(session, scheduler, &mut in_flight, stop_on_error).await {}
    }

    async fn run_sequential(
        &self,
        executor: &Executor,
        session: &mut InstallSession,
        scheduler: &mut Scheduler,
        stop_on_error: bool,
    ) {
        while let Some(id) = scheduler.next() {
            if self.cancel_if_requested(session, &id) {
                continue;
            }
            let Some(task) = session.task(&id).cloned() else {
                continue;
            };
            if !self.passes_gate(session, &task.package) {
                continue;
            }

            scheduler.mark_started(&id);
            let completion = run_on_worker(executor.clone(), task).await;
            self.fold(session, scheduler, completion, stop_on_error);
        }
    }

    /// Wait for one worker and fold it. `false` once nothing is in flight.
    async fn collect_next(
        &self,
        session: &mut InstallSession,
        scheduler: &mut Scheduler,
        in_flight: &mut JoinSet<Completion>,
        stop_on_error: bool,
    ) -> bool {
        match in_flight.join_next().await {
            None => false,
            Some(Ok(completion)) => {
                self.fold(session, scheduler, completion, stop_on_error);
                true
            }
            Some(Err(e)) => {
                log::error!("Worker task failed to join: {}", e);
                true
            }
        }
    }

    fn fold(
        &self,
        session: &mut InstallSession,
        scheduler: &mut Scheduler,
        completion: Completion,
        stop_on_error: bool,
    ) {
        let Completion { id, result } = completion;
        scheduler.mark_done(&id);

        let task = match result {
            Ok(task) => task,
            Err(diagnostic) => {
                let Some(mut task) = session.task(&id).cloned() else {
                    return;
                };
                log::error!("Installation of {} crashed: {}", id, diagnostic);
                task.force_failed(&diagnostic);
                core::notify(self.progress.as_ref(), &id, InstallStatus::Failed, 0);
                task
            }
        };

        let status = task.status;
        session.store(task);
        session.record(status);
        log::debug!("{} -> {} ({}/{})", id, status, session.resolved(), session.total_packages);

        if status == InstallStatus::Failed && stop_on_error && !self.cancel.is_cancelled() {
            log::warn!("Stopping batch after failure of {}", id);
            self.cancel.cancel();
        }
    }

    /// Evaluate the dependency gate, skipping the task when it fails
    fn passes_gate(&self, session: &mut InstallSession, package: &PackageDescriptor) -> bool {
        let missing = core::missing_dependencies(package, |dep| session.status_of(dep));
        if missing.is_empty() {
            return true;
        }

        let reason = core::skip_reason(&missing);
        log::warn!("Skipping {}: {}", package.name, reason);
        let Some(task) = session.task_mut(&package.id) else {
            return false;
        };
        match task.skip(reason) {
            Ok(()) => {
                session.record(InstallStatus::Skipped);
                core::notify(self.progress.as_ref(), &package.id, InstallStatus::Skipped, 0);
            }
            Err(e) => log::error!("{}", e),
        }
        false
    }

    /// Mark an undispatched task CANCELLED if cancellation was requested
    fn cancel_if_requested(&self, session: &mut InstallSession, id: &str) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        let Some(task) = session.task_mut(id) else {
            return true;
        };
        match task.cancel() {
            Ok(()) => {
                session.record(InstallStatus::Cancelled);
                core::notify(self.progress.as_ref(), id, InstallStatus::Cancelled, 0);
            }
            Err(e) => log::error!("{}", e),
        }
        true
    }
}

/// Run the blocking executor on tokio's blocking pool
async fn run_on_worker(executor: Executor, task: InstallTask) -> Completion {
    let id = task.id().to_string();
    let result = tokio::task::spawn_blocking(move || executor.run(task))
        .await
        .map_err(|e| format!("Worker failed: {}", e));
    Completion { id, result }
}
