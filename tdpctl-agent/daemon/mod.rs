//! Reconciliation daemon
//!
//! Holds a desired power limit target and re-applies it on a timer, so
//! transient firmware/hardware resets get corrected within one interval.
//! Every hardware touch (periodic tick, API-triggered apply, API read) goes
//! through one async mutex: the critical section covers the whole
//! units-read + decode + encode + write sequence, because the MMIO dual-half
//! write is not atomic and interleaving two callers could leave a worse
//! intermediate state than any single ordered sequence.

pub mod config;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::limits::types::{PowerLimit, PowerLimitUpdate};
use crate::platform::{Platform, RegisterSpace};
use config::DaemonConfig;

struct DaemonState {
    target: Option<PowerLimitUpdate>,
    interval: Duration,
}

pub struct Daemon {
    platform: Arc<Platform>,
    /// The single critical section of the process; see module docs
    state: Mutex<DaemonState>,
    /// Restarts the tick timer after an out-of-cycle apply or config change
    timer_reset: Notify,
}

impl Daemon {
    pub fn new(platform: Platform, config: DaemonConfig) -> Arc<Self> {
        Arc::new(Self {
            platform: Arc::new(platform),
            state: Mutex::new(DaemonState {
                target: None,
                interval: Duration::from_secs(config.interval),
            }),
            timer_reset: Notify::new(),
        })
    }

    /// Run the periodic reconciliation loop until cancelled
    ///
    /// Cancellation waits for an in-flight apply to finish before returning.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!("reconciliation loop started");

        loop {
            let interval = self.state.lock().await.interval;

            tokio::select! {
                _ = cancel.cancelled() => break,
                // An out-of-cycle apply already ran; just restart the timer
                _ = self.timer_reset.notified() => continue,
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.apply_target().await {
                        tracing::error!("reconciliation tick failed, retrying next tick: {e}");
                    }
                }
            }
        }

        // Taking the lock once drains any occupant that raced the cancel
        let _ = self.state.lock().await;
        tracing::info!("reconciliation loop stopped");
    }

    /// One `Idle -> Applying -> Idle` cycle
    async fn apply_target(&self) -> Result<()> {
        let guard = self.state.lock().await;
        let Some(target) = guard.target else {
            tracing::debug!("no target set, skipping tick");
            return Ok(());
        };

        tracing::debug!("applying target: {}", target.summary());
        let platform = Arc::clone(&self.platform);
        let result = tokio::task::spawn_blocking(move || platform.update_power_limit(&target))
            .await
            .expect("power limit apply task panicked");
        drop(guard);
        result
    }

    /// Read the current power limit under the critical section
    pub async fn read_power_limit(&self, space: Option<RegisterSpace>) -> Result<PowerLimit> {
        let guard = self.state.lock().await;
        let platform = Arc::clone(&self.platform);
        let result = tokio::task::spawn_blocking(move || match space {
            Some(space) => platform.power_limit_via(space),
            None => platform.power_limit(),
        })
        .await
        .expect("power limit read task panicked");
        drop(guard);
        result
    }

    /// Merge a change request into the target and apply it immediately
    ///
    /// Present fields override the current target, absent fields persist.
    /// The immediate apply runs inside the critical section, mutually
    /// exclusive with the periodic tick; the timer restarts afterwards.
    pub async fn submit_target(&self, update: PowerLimitUpdate) -> Result<()> {
        update.validate()?;

        let mut guard = self.state.lock().await;
        let mut target = guard.target.unwrap_or_default();
        target.merge(&update);
        guard.target = Some(target);
        tracing::info!("power limit target updated: {}", target.summary());

        let platform = Arc::clone(&self.platform);
        let result = tokio::task::spawn_blocking(move || platform.update_power_limit(&target))
            .await
            .expect("power limit apply task panicked");
        drop(guard);

        self.timer_reset.notify_one();
        result
    }

    pub async fn config(&self) -> DaemonConfig {
        let guard = self.state.lock().await;
        DaemonConfig {
            interval: guard.interval.as_secs(),
        }
    }

    /// Replace the daemon config; takes effect on the next cycle
    pub async fn set_config(&self, config: DaemonConfig) -> Result<()> {
        config.validate()?;
        self.state.lock().await.interval = Duration::from_secs(config.interval);
        tracing::info!("daemon interval set to {}s", config.interval);
        self.timer_reset.notify_one();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn target(&self) -> Option<PowerLimitUpdate> {
        self.state.lock().await.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::types::{Pl1Update, Pl2Update};
    use crate::platform::stub::StubPlatform;

    fn stub_daemon(delay: Duration) -> (Arc<Daemon>, Arc<Platform>) {
        let daemon = Daemon::new(
            Platform::Stub(StubPlatform::with_delay(delay)),
            DaemonConfig::default(),
        );
        let platform = Arc::clone(&daemon.platform);
        (daemon, platform)
    }

    fn pl1_power(watts: u32) -> PowerLimitUpdate {
        PowerLimitUpdate {
            pl1: Pl1Update {
                power: Some(watts),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_submits_serialize() {
        let (daemon, platform) = stub_daemon(Duration::from_millis(50));

        let a = {
            let daemon = Arc::clone(&daemon);
            tokio::spawn(async move { daemon.submit_target(pl1_power(30)).await })
        };
        let b = {
            let daemon = Arc::clone(&daemon);
            tokio::spawn(async move { daemon.submit_target(pl1_power(40)).await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let Platform::Stub(stub) = platform.as_ref() else {
            unreachable!()
        };
        assert_eq!(stub.applied().len(), 2);
        assert_eq!(stub.max_in_flight(), 1, "applies overlapped");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_merges_into_target() {
        let (daemon, _) = stub_daemon(Duration::ZERO);

        daemon.submit_target(pl1_power(45)).await.unwrap();
        daemon
            .submit_target(PowerLimitUpdate {
                pl2: Pl2Update {
                    enabled: Some(true),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let target = daemon.target().await.unwrap();
        assert_eq!(target.pl1.power, Some(45));
        assert_eq!(target.pl2.enabled, Some(true));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_submit_rejects_out_of_range() {
        let (daemon, platform) = stub_daemon(Duration::ZERO);

        assert!(daemon.submit_target(pl1_power(500)).await.is_err());
        assert!(daemon.target().await.is_none());

        let Platform::Stub(stub) = platform.as_ref() else {
            unreachable!()
        };
        assert!(stub.applied().is_empty(), "rejected update reached hardware");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tick_reapplies_target() {
        let (daemon, platform) = stub_daemon(Duration::ZERO);
        daemon
            .set_config(DaemonConfig { interval: 1 })
            .await
            .unwrap();
        daemon.submit_target(pl1_power(30)).await.unwrap();

        let cancel = CancellationToken::new();
        let loop_handle = {
            let daemon = Arc::clone(&daemon);
            let cancel = cancel.clone();
            tokio::spawn(async move { daemon.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        loop_handle.await.unwrap();

        let Platform::Stub(stub) = platform.as_ref() else {
            unreachable!()
        };
        // One immediate apply from submit, at least one from the tick
        assert!(stub.applied().len() >= 2, "tick never re-applied");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_config_validates_interval() {
        let (daemon, _) = stub_daemon(Duration::ZERO);
        assert!(daemon.set_config(DaemonConfig { interval: 0 }).await.is_err());
        assert_eq!(daemon.config().await.interval, 5);
    }
}
