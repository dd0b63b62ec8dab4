//! Tracked background work
//!
//! The self-update and the delayed halt outlive the request that triggered
//! them. They run as spawned tasks whose handle is kept, so completion can
//! be observed (and awaited in tests). Cancellation is not supported.

use std::future::Future;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// A named unit of spawned work with a completion signal
#[derive(Debug)]
pub struct BackgroundTask<T> {
    name: &'static str,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> BackgroundTask<T> {
    pub fn spawn<F>(name: &'static str, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        debug!("Spawning background task '{}'", name);
        Self {
            name,
            handle: tokio::spawn(future),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to finish
    pub async fn wait(self) -> Result<T, JoinError> {
        self.handle.await
    }
}
