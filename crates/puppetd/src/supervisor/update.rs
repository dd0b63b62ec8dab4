//! Self-update workflow
//!
//! stop daemon -> drop old update log -> run updater -> start daemon.
//! At most one update runs at a time. The daemon is started again whatever
//! the stop or the updater did, and the in-flight flag is released on every
//! exit path.

use super::Supervisor;
use crate::error::Result;
use crate::task::BackgroundTask;
use puppet_common::logs::remove_log;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of a self-update request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The workflow ran; `success` is the updater's verdict
    Completed { success: bool },
    /// Another update was already in flight, nothing was done
    Rejected,
}

/// "An update is in flight" flag with atomic check-and-set
#[derive(Debug, Default, Clone)]
pub struct UpdateFlag(Arc<AtomicBool>);

impl UpdateFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Claim the flag; `None` if it is already held
    pub fn try_begin(&self) -> Option<UpdateGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UpdateGuard(Arc::clone(&self.0)))
    }
}

/// Holds the update flag; clears it on drop
#[derive(Debug)]
pub struct UpdateGuard(Arc<AtomicBool>);

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Supervisor {
    pub fn is_updating(&self) -> bool {
        self.update_flag.is_set()
    }

    /// Run the update in the caller's task
    pub async fn self_update(&self) -> Result<UpdateOutcome> {
        let Some(guard) = self.update_flag.try_begin() else {
            info!("Update already in progress, request ignored");
            return Ok(UpdateOutcome::Rejected);
        };

        let success = self.run_update(guard).await?;
        Ok(UpdateOutcome::Completed { success })
    }

    /// Run the update on a background task
    ///
    /// The flag is claimed before this returns, so `is_updating` is already
    /// true for the caller. `None` when an update is already in flight.
    pub fn spawn_self_update(self: &Arc<Self>) -> Option<BackgroundTask<Result<bool>>> {
        let Some(guard) = self.update_flag.try_begin() else {
            info!("Update already in progress, request ignored");
            return None;
        };

        let supervisor = Arc::clone(self);
        Some(BackgroundTask::spawn("self-update", async move {
            supervisor.run_update(guard).await
        }))
    }

    async fn run_update(&self, _guard: UpdateGuard) -> Result<bool> {
        let _lifecycle = self.lifecycle.lock().await;
        let log = PathBuf::from(self.store.load()?.update.logfile);

        info!("Self-update started");
        if let Err(e) = self.stop_unlocked().await {
            error!("Daemon did not stop cleanly, updating anyway: {}", e);
        }

        if let Err(e) = remove_log(&log) {
            warn!("Cannot remove old update log {}: {}", log.display(), e);
        }

        let success = match self.runner().run(&self.settings.update_command).await {
            Ok(()) => true,
            Err(e) => {
                error!("Update failed: {}", e);
                false
            }
        };

        self.start_unlocked().await?;
        info!("Self-update finished (success={})", success);
        Ok(success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_exclusive() {
        let flag = UpdateFlag::default();
        let guard = flag.try_begin().unwrap();
        assert!(flag.is_set());
        assert!(flag.try_begin().is_none());

        drop(guard);
        assert!(!flag.is_set());
        assert!(flag.try_begin().is_some());
    }

    #[test]
    fn test_flag_released_on_panic() {
        let flag = UpdateFlag::default();
        let cloned = flag.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = cloned.try_begin().unwrap();
            panic!("updater blew up");
        });
        assert!(result.is_err());
        assert!(!flag.is_set());
    }

    #[test]
    fn test_only_one_of_many_claims_wins() {
        let flag = UpdateFlag::default();
        let winners: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let flag = flag.clone();
                    scope.spawn(move || flag.try_begin().map(std::mem::forget).is_some())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });
        assert_eq!(winners, 1);
    }
}
