//! Inactivity watchdog
//!
//! Periodically scans live sessions. A session idle past the threshold gets
//! exactly one warning per idle period; a USER turn starts a new period. Owners
//! who can no longer be reached lose their session.

use std::sync::Arc;
use std::time::Duration;

use charforge_core::config::WatchdogConfig;
use charforge_core::{Delivery, Notifier};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::registry::SessionRegistry;
use crate::replies;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogSettings {
    pub interval: Duration,
    pub idle_threshold: Duration,
    /// Reap sessions that stay silent this long after their warning.
    pub reap_after_warning: Option<Duration>,
}

impl From<&WatchdogConfig> for WatchdogSettings {
    fn from(config: &WatchdogConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            idle_threshold: Duration::from_secs(config.idle_threshold_seconds),
            reap_after_warning: config.reap_after_warning_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub scanned: usize,
    pub warned: usize,
    pub reaped: usize,
    /// Sessions that were gone or changed by the time they were looked at.
    pub skipped: usize,
    /// Transient delivery failures; retried on the next scan.
    pub failed: usize,
}

pub struct InactivityWatchdog {
    registry: Arc<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    settings: WatchdogSettings,
}

impl InactivityWatchdog {
    pub fn new(
        registry: Arc<SessionRegistry>,
        notifier: Arc<dyn Notifier>,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            registry,
            notifier,
            settings,
        }
    }

    /// One pass over every session, as of `now`.
    pub async fn scan(&self, now: DateTime<Utc>) -> ScanReport {
        let mut report = ScanReport::default();
        let threshold = to_chrono(self.settings.idle_threshold);

        for owner in self.registry.owners() {
            report.scanned += 1;

            let Some(session) = self.registry.get(&owner) else {
                report.skipped += 1;
                continue;
            };

            if session.warned_idle {
                if let (Some(ceiling), Some(warned_at)) =
                    (self.settings.reap_after_warning, session.warned_at)
                {
                    if now - warned_at >= to_chrono(ceiling)
                        && self
                            .registry
                            .remove_if_still_warned(&owner, session.id, session.last_activity_at)
                            .is_some()
                    {
                        tracing::info!(
                            owner = %owner,
                            session_id = %session.id,
                            "Session reaped after unanswered idle warning"
                        );
                        report.reaped += 1;
                    }
                }
                continue;
            }

            if now - session.last_activity_at <= threshold {
                continue;
            }

            let warning = replies::idle_warning(self.settings.idle_threshold.as_secs() / 60);
            match self.notifier.notify(&owner, &warning).await {
                Ok(Delivery::Delivered) => {
                    if self
                        .registry
                        .mark_warned(&owner, session.id, session.last_activity_at, now)
                    {
                        tracing::info!(owner = %owner, session_id = %session.id, "Idle warning sent");
                        report.warned += 1;
                    } else {
                        // user spoke, quit or restarted while the warning was in flight
                        report.skipped += 1;
                    }
                }
                Ok(Delivery::Unreachable) => {
                    if self.registry.remove_if(&owner, session.id).is_some() {
                        tracing::info!(
                            owner = %owner,
                            session_id = %session.id,
                            "Owner unreachable, idle session reaped"
                        );
                        report.reaped += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(owner = %owner, error = %e, "Idle warning delivery failed");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Called from main.rs; scans every `interval` until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Inactivity watchdog started (interval: {}s, idle threshold: {}s)",
            self.settings.interval.as_secs(),
            self.settings.idle_threshold.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.scan(Utc::now()).await;
                    if report.warned + report.reaped + report.failed > 0 {
                        tracing::info!(
                            "Watchdog scan: {} sessions, {} warned, {} reaped, {} failed",
                            report.scanned,
                            report.warned,
                            report.reaped,
                            report.failed
                        );
                    } else {
                        tracing::debug!("Watchdog scan: {} sessions, nothing to do", report.scanned);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Inactivity watchdog shutting down");
                    break;
                }
            }
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

// ============================================================================
// TESTS
// ============================================================================
