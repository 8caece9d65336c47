use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::tracker::CommandTracker;
use super::{RETENTION_SWEEP_INTERVAL, RETENTION_WINDOW, TIMEOUT_SWEEP_INTERVAL};

/// Intervals for the two periodic sweeps.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often executing commands are checked for overrun
    pub timeout_interval: Duration,
    /// How often terminal-state contexts are garbage collected
    pub retention_interval: Duration,
    /// Age past which a terminal-state context is deleted
    pub retention_window: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            timeout_interval: TIMEOUT_SWEEP_INTERVAL,
            retention_interval: RETENTION_SWEEP_INTERVAL,
            retention_window: RETENTION_WINDOW,
        }
    }
}

/// Handles to the running sweeper tasks; abort on shutdown.
pub struct SweeperHandles {
    timeout_task: JoinHandle<()>,
    retention_task: JoinHandle<()>,
}

impl SweeperHandles {
    /// Start the fast timeout sweep and the slow retention sweep.
    pub fn spawn(tracker: Arc<CommandTracker>, config: SweeperConfig) -> Self {
        let SweeperConfig {
            timeout_interval,
            retention_interval,
            retention_window,
        } = config;

        let timeout_tracker = Arc::clone(&tracker);
        let timeout_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeout_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                timeout_tracker.sweep_timeouts_once().await;
            }
        });

        let retention_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(retention_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                tracker.sweep_retention_once(retention_window).await;
            }
        });

        Self {
            timeout_task,
            retention_task,
        }
    }

    pub fn abort(&self) {
        self.timeout_task.abort();
        self.retention_task.abort();
    }
}

impl Drop for SweeperHandles {
    fn drop(&mut self) {
        self.abort();
    }
}
