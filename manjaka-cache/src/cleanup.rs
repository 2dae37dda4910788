//! Periodic sweeping of expired entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info_span};

use crate::cache::{Inner, ResponseCache};

/// Handle to the background cleanup task of a [`ResponseCache`].
///
/// The task is aborted when the handle is stopped or dropped. It also exits on
/// its own once the cache it sweeps has been dropped.
#[derive(Debug)]
pub struct CleanupTask {
    handle: JoinHandle<()>,
}

impl CleanupTask {
    pub(crate) fn spawn<V>(cache: Weak<Inner<V>>, period: Duration) -> Self
    where
        V: Send + Sync + 'static,
    {
        let span = info_span!("cache_cleanup", period_ms = period.as_millis() as u64);
        let handle = tokio::spawn(
            async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let Some(inner) = cache.upgrade() else {
                        debug!("cache dropped, stopping cleanup task");
                        break;
                    };
                    ResponseCache { inner }.cleanup();
                }
            }
            .instrument(span),
        );
        Self { handle }
    }

    /// Returns `true` while the task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops the task.
    pub fn stop(self) {
        // Drop aborts.
    }
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
