//! Device watchdog
//!
//! Two whole-device triggers, both carried out through the restart policy:
//!
//! - no keepalive for `offline_after` (the backend poll stopped succeeding)
//! - the daily scheduled time, announced one minute ahead
//!
//! Keepalives come from successful backend polls and from `GET /keepalive`.

use super::service_control::{ServiceControl, ServiceControlResult, hard_restart};
use crate::core::{RestartPolicy, WatchdogSettings};
use chrono::{DateTime, NaiveTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often the keepalive age is checked
const CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Warning given before a scheduled reboot
const SCHEDULED_REBOOT_NOTICE: Duration = Duration::from_secs(60);

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time until the next `at` strictly after `now`
pub fn until_next(at: NaiveTime, now: DateTime<Utc>) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub struct Watchdog {
    control: Arc<dyn ServiceControl>,
    policy: RestartPolicy,
    settings: WatchdogSettings,
    last_keepalive: Mutex<Instant>,
    clock: fn() -> DateTime<Utc>,
}

impl Watchdog {
    pub fn new(
        control: Arc<dyn ServiceControl>,
        policy: RestartPolicy,
        settings: WatchdogSettings,
    ) -> Self {
        Self {
            control,
            policy,
            settings,
            last_keepalive: Mutex::new(Instant::now()),
            clock: Utc::now,
        }
    }

    /// Wall clock used to place the daily reboot
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn keepalive(&self) {
        *self.last_keepalive.lock() = Instant::now();
    }

    /// Time since the last keepalive
    pub fn silence(&self) -> Duration {
        self.last_keepalive.lock().elapsed()
    }

    /// Operator-requested reboot, independent of the restart policy
    pub async fn reboot_now(&self) -> ServiceControlResult<()> {
        warn!("reboot requested");
        self.control.reboot().await
    }

    async fn check_offline(&self) {
        let Some(limit) = self.settings.offline_after else {
            return;
        };
        let silence = self.silence();
        if silence <= limit {
            return;
        }
        warn!(?silence, "no keepalive, device looks offline");
        hard_restart(self.control.as_ref(), self.policy, "backend unreachable").await;
        // Next attempt only after another full window
        self.keepalive();
    }

    /// Loop until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut scheduled = self
            .settings
            .daily_reboot
            .map(|at| Instant::now() + until_next(at, (self.clock)()));
        info!(
            policy = ?self.policy,
            offline_after = ?self.settings.offline_after,
            daily_reboot_utc = ?self.settings.daily_reboot,
            utc_now = %(self.clock)().format("%H:%M"),
            "watchdog started"
        );

        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.check_offline().await,
                _ = sleep_until(scheduled) => {
                    warn!(notice = ?SCHEDULED_REBOOT_NOTICE, "scheduled reboot time reached");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(SCHEDULED_REBOOT_NOTICE) => {}
                    }
                    hard_restart(self.control.as_ref(), self.policy, "scheduled reboot").await;
                    scheduled = scheduled.map(|at| at + DAY);
                }
            }
        }
        info!("watchdog stopped");
    }
}
