//! Background task that periodically flushes a dirty store to disk.

use crate::core::{Result, TallyError};
use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

/// Something the sweeper can flush on each tick.
#[async_trait]
pub trait Flush: Send + Sync + 'static {
    /// Name used in log lines.
    fn label(&self) -> &'static str;

    async fn flush(&self) -> Result<()>;
}

/// Edge-triggered health of the periodic flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SweepHealth {
    #[default]
    Ok,
    Failing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    /// No state change, nothing to report.
    Steady,
    /// First failure after a success.
    Failed,
    /// First success after a failure streak.
    Recovered,
}

impl SweepHealth {
    pub fn observe(&mut self, succeeded: bool) -> HealthTransition {
        let (next, transition) = match (*self, succeeded) {
            (SweepHealth::Ok, true) => (SweepHealth::Ok, HealthTransition::Steady),
            (SweepHealth::Ok, false) => (SweepHealth::Failing, HealthTransition::Failed),
            (SweepHealth::Failing, false) => (SweepHealth::Failing, HealthTransition::Steady),
            (SweepHealth::Failing, true) => (SweepHealth::Ok, HealthTransition::Recovered),
        };
        *self = next;
        transition
    }
}

/// Logs a flush result once per health transition.
pub(crate) fn report_flush(label: &str, health: &mut SweepHealth, result: &Result<()>) {
    match (health.observe(result.is_ok()), result) {
        (HealthTransition::Failed, Err(err)) => {
            error!(store = label, error = %err, "error when saving; suppressing repeats until a save succeeds");
        }
        (HealthTransition::Recovered, _) => {
            info!(store = label, "saving succeeded again");
        }
        _ => {}
    }
}

/// Handle to a running sweeper task.
///
/// The task holds only a weak reference to its target, so dropping the
/// target ends the loop on the next tick.
pub struct Sweeper {
    label: &'static str,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn<T: Flush>(target: Weak<T>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let label = target
            .upgrade()
            .map(|strong| strong.label())
            .unwrap_or("detached");
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let join_handle = tokio::spawn(async move {
            let mut health = SweepHealth::Ok;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        break;
                    }
                    _ = sleep(interval) => {
                        let Some(target) = target.upgrade() else { break };
                        let result = target.flush().await;
                        report_flush(label, &mut health, &result);
                    }
                }
            }
        });

        info!(store = label, interval_ms = interval.as_millis() as u64, "sweeper started");
        Self {
            label,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Signals the task to stop and waits for an in-flight flush to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await.map_err(|err| {
                TallyError::PersistFailed(format!("{} sweeper join: {}", self.label, err))
            })?;
        }
        info!(store = self.label, "sweeper stopped");
        Ok(())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}
