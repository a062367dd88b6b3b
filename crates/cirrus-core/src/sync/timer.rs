//! Periodic synchronization on a recurring timer.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::Synchronizer;

/// How often to run a full synchronization automatically.
///
/// Negative or zero intervals select manual-only synchronization; positive
/// intervals below one minute are rounded up to one minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPeriod {
    /// No automatic synchronization.
    #[default]
    Manual,
    /// A full synchronization every interval.
    Every(Duration),
}

impl SyncPeriod {
    /// The minimum supported timer granularity.
    pub const MIN_INTERVAL: Duration = Duration::from_secs(60);

    /// Standard choice: every minute.
    pub const EVERY_MINUTE: Self = Self::Every(Duration::from_secs(60));
    /// Standard choice: every 5 minutes.
    pub const EVERY_5_MINUTES: Self = Self::Every(Duration::from_secs(300));
    /// Standard choice: every 15 minutes.
    pub const EVERY_15_MINUTES: Self = Self::Every(Duration::from_secs(900));
    /// Standard choice: every hour.
    pub const EVERY_HOUR: Self = Self::Every(Duration::from_secs(3600));

    /// Build a period from a raw seconds value, clamping as documented.
    #[must_use]
    pub fn from_secs(secs: i64) -> Self {
        if secs <= 0 {
            return Self::Manual;
        }
        #[allow(clippy::cast_sign_loss)]
        let interval = Duration::from_secs(secs as u64);
        Self::Every(interval.max(Self::MIN_INTERVAL))
    }

    /// The timer interval, or `None` when disabled.
    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        match self {
            Self::Manual => None,
            Self::Every(interval) => Some(*interval),
        }
    }
}

/// Owns the recurring timer that triggers full synchronizations.
pub struct PeriodicSync {
    synchronizer: Synchronizer,
    running: Option<(Duration, JoinHandle<()>)>,
}

impl PeriodicSync {
    /// Create a periodic trigger with the timer disabled.
    #[must_use]
    pub const fn new(synchronizer: Synchronizer) -> Self {
        Self {
            synchronizer,
            running: None,
        }
    }

    /// Apply a period, recreating the timer only when the interval changed.
    pub fn set_period(&mut self, period: SyncPeriod) {
        let Some(interval) = period.interval() else {
            info!("Stop the timer for automatic synchronization");
            self.stop();
            return;
        };

        if let Some((current, _)) = &self.running {
            if *current == interval {
                info!(
                    interval_secs = interval.as_secs(),
                    "The timer for automatic synchronization is already running"
                );
                return;
            }
        }

        self.stop();
        info!(
            interval_secs = interval.as_secs(),
            "Create the timer for automatic synchronization"
        );

        let synchronizer = self.synchronizer.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                info!("Start an automatic synchronization");
                match synchronizer.synchronize().await {
                    Ok(report) => {
                        if report.has_errors() {
                            info!(
                                errors = report.errors.len(),
                                "Automatic synchronization finished with per-note failures"
                            );
                        }
                    }
                    Err(sync_error) => {
                        error!(error = %sync_error, "Automatic synchronization failed");
                    }
                }
            }
        });
        self.running = Some((interval, task));
    }

    /// Stop the timer if it is running.
    pub fn stop(&mut self) {
        if let Some((_, task)) = self.running.take() {
            task.abort();
        }
    }

    /// The currently running interval, if any.
    #[must_use]
    pub fn current_interval(&self) -> Option<Duration> {
        self.running.as_ref().map(|(interval, _)| *interval)
    }
}

impl Drop for PeriodicSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn from_secs_disables_on_non_positive_values() {
        assert_eq!(SyncPeriod::from_secs(0), SyncPeriod::Manual);
        assert_eq!(SyncPeriod::from_secs(-60), SyncPeriod::Manual);
    }

    #[test]
    fn from_secs_rounds_small_intervals_up_to_a_minute() {
        assert_eq!(
            SyncPeriod::from_secs(10),
            SyncPeriod::Every(Duration::from_secs(60))
        );
        assert_eq!(SyncPeriod::from_secs(60), SyncPeriod::EVERY_MINUTE);
    }

    #[test]
    fn from_secs_keeps_standard_intervals() {
        assert_eq!(SyncPeriod::from_secs(300), SyncPeriod::EVERY_5_MINUTES);
        assert_eq!(SyncPeriod::from_secs(900), SyncPeriod::EVERY_15_MINUTES);
        assert_eq!(SyncPeriod::from_secs(3600), SyncPeriod::EVERY_HOUR);
    }

    #[test]
    fn interval_is_none_for_manual() {
        assert_eq!(SyncPeriod::Manual.interval(), None);
        assert_eq!(
            SyncPeriod::EVERY_MINUTE.interval(),
            Some(Duration::from_secs(60))
        );
    }
}
