//! Per-package mutual exclusion for concurrently dispatched tasks.
//!
//! Two tasks whose package sets intersect must never run at the same
//! time; tasks with disjoint sets never block each other. Acquisition is
//! atomic across the requested names: locks are taken in sorted order
//! (which rules out lock-order deadlock between workers) and any guards
//! already held are dropped if acquisition is cancelled midway.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Named-resource mutex shared by all workers of a run.
#[derive(Default)]
pub struct PackageGuard {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Holds the acquired package locks; dropping releases them. `release`
/// is idempotent and only ever releases locks this lease took.
pub struct PackageLease {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl PackageLease {
    /// Explicit release; dropping the lease is equivalent.
    pub fn release(&mut self) {
        self.guards.clear();
    }
}

impl PackageGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every lock in `packages` for `task_number`.
    ///
    /// Blocks until all locks are held or `cancel` fires; cancellation
    /// mid-acquire releases whatever was already taken.
    pub async fn acquire(
        &self,
        task_number: &str,
        packages: &[String],
        cancel: &CancellationToken,
    ) -> Result<PackageLease> {
        let mut names: Vec<&String> = packages.iter().collect();
        names.sort();
        names.dedup();

        let mut guards = Vec::with_capacity(names.len());
        for name in names {
            let lock = {
                let mut locks = self.locks.lock().await;
                Arc::clone(locks.entry(name.clone()).or_default())
            };

            let guard = tokio::select! {
                guard = lock.lock_owned() => guard,
                () = cancel.cancelled() => {
                    // Drop the partial set.
                    return Err(anyhow!(
                        "package lock acquisition for task {task_number} cancelled"
                    ));
                }
            };
            debug!(task = task_number, package = %name, "package lock acquired");
            guards.push(guard);
        }

        Ok(PackageLease { guards })
    }
}
