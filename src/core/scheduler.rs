//! Dispatch scheduling - priority order and the dependency gate

use super::package::PackageDescriptor;
use super::task::InstallStatus;
use std::collections::{HashSet, VecDeque};

/// Ids in dispatch order: priority ascending, ties in submission order
pub fn priority_order(packages: &[PackageDescriptor]) -> Vec<String> {
    let mut ordered: Vec<&PackageDescriptor> = packages.iter().collect();
    // sort_by_key is stable
    ordered.sort_by_key(|p| p.priority);
    ordered.into_iter().map(|p| p.id.clone()).collect()
}

/// Dependencies of `package` that are not satisfied, in declaration order.
///
/// `status_of` looks a sibling up in the current session; an id the session
/// does not know counts as missing.
pub fn missing_dependencies<F>(package: &PackageDescriptor, status_of: F) -> Vec<String>
where
    F: Fn(&str) -> Option<InstallStatus>,
{
    package
        .unique_dependencies()
        .into_iter()
        .filter(|dep| !status_of(dep).is_some_and(InstallStatus::satisfies_dependents))
        .map(str::to_string)
        .collect()
}

/// Reason recorded on a task that fails its gate
pub fn skip_reason(missing: &[String]) -> String {
    format!("Missing dependencies: {}", missing.join(", "))
}

/// Tracks what is queued, parked and in flight during one dispatch pass.
///
/// A package whose dependency is still in flight is parked instead of
/// blocking the queue. Parked packages are handed out again, ahead of the
/// queue and in the order they were parked, once nothing they depend on is
/// running or parked.
#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<String>,
    parked: Vec<PackageDescriptor>,
    running: HashSet<String>,
}

impl Scheduler {
    /// Queue ids in the given order
    pub fn new(order: Vec<String>) -> Self {
        Self {
            queue: order.into(),
            parked: Vec::new(),
            running: HashSet::new(),
        }
    }

    /// Next id to consider for dispatch: the first parked package that is no
    /// longer blocked, otherwise the head of the queue
    pub fn next(&mut self) -> Option<String> {
        let ready = self
            .parked
            .iter()
            .position(|package| !self.is_blocked(package));
        match ready {
            Some(index) => Some(self.parked.remove(index).id),
            None => self.queue.pop_front(),
        }
    }

    pub fn mark_started(&mut self, id: &str) {
        self.running.insert(id.to_string());
    }

    /// Returns `false` if the id was not in flight
    pub fn mark_done(&mut self, id: &str) -> bool {
        self.running.remove(id)
    }

    /// Whether any dependency of `package` is in flight or itself parked
    pub fn is_blocked(&self, package: &PackageDescriptor) -> bool {
        package.unique_dependencies().iter().any(|dep| {
            *dep != package.id
                && (self.running.contains(*dep) || self.parked.iter().any(|p| p.id == *dep))
        })
    }

    /// Set a blocked package aside until its dependencies settle
    pub fn park(&mut self, package: PackageDescriptor) {
        self.parked.push(package);
    }

    pub fn has_parked(&self) -> bool {
        !self.parked.is_empty()
    }

    /// Hand out the oldest parked package regardless of its dependencies.
    /// Used once nothing is in flight and parked packages only wait on
    /// each other.
    pub fn release_parked(&mut self) -> Option<String> {
        if self.parked.is_empty() {
            None
        } else {
            Some(self.parked.remove(0).id)
        }
    }

    /// Ids still in flight, sorted for stable logs
    pub fn get_running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running.iter().cloned().collect();
        ids.sort();
        ids
    }
}
