//! Peripheral health loop and restart escalation
//!
//! Per peripheral: `observing → (not_found or unresponsive longer than
//! restart_cooldown) → restart_issued → observing`. The soft tier restarts the peripheral's
//! service; the hard tier (application restart or reboot, by policy) fires
//! only once a peripheral has been missing for `hard_restart_after`.

use super::budget::RestartBudget;
use super::service_control::{ServiceControl, hard_restart};
use crate::core::{HealthTimings, RestartPolicy};
use crate::printing::PrinterManager;
use shared::PrinterStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct Monitored {
    manager: Arc<PrinterManager>,
    service: String,
    not_found_since: Option<Instant>,
    budget: RestartBudget,
}

struct State {
    peripherals: Vec<Monitored>,
    hard_budget: RestartBudget,
}

pub struct HealthSupervisor {
    control: Arc<dyn ServiceControl>,
    policy: RestartPolicy,
    timings: HealthTimings,
    state: Mutex<State>,
    nudge: Notify,
}

impl HealthSupervisor {
    pub fn new(
        control: Arc<dyn ServiceControl>,
        policy: RestartPolicy,
        timings: HealthTimings,
    ) -> Self {
        Self {
            control,
            policy,
            timings,
            state: Mutex::new(State {
                peripherals: Vec::new(),
                hard_budget: RestartBudget::new(timings.hard_restart_after),
            }),
            nudge: Notify::new(),
        }
    }

    /// Watch `manager`, restarting `service` when it goes missing
    pub async fn monitor(&self, manager: Arc<PrinterManager>, service: impl Into<String>) {
        self.state.lock().await.peripherals.push(Monitored {
            manager,
            service: service.into(),
            not_found_since: None,
            budget: RestartBudget::new(self.timings.restart_min_interval),
        });
    }

    /// Run the next check now instead of waiting out the interval
    pub fn nudge(&self) {
        self.nudge.notify_one();
    }

    /// Check every peripheral once and escalate where needed. Returns true
    /// when every peripheral is ready.
    ///
    /// Each check is bounded by `check_timeout`. A printer that does not
    /// answer in time counts as missing, and the remaining peripherals are
    /// still checked.
    pub async fn tick(&self) -> bool {
        let mut state = self.state.lock().await;
        let State {
            peripherals,
            hard_budget,
        } = &mut *state;

        let mut all_ready = true;
        let mut hard_needed = false;

        for peripheral in peripherals.iter_mut() {
            let manager = &peripheral.manager;
            let checked =
                tokio::time::timeout(self.timings.check_timeout, manager.check_status()).await;
            let now = Instant::now();
            let status = match &checked {
                Ok(report) => report.status,
                Err(_) => {
                    warn!(
                        printer = manager.name(),
                        timeout = ?self.timings.check_timeout,
                        "status check timed out, printer unresponsive"
                    );
                    manager.mark_unresponsive();
                    PrinterStatus::Unknown
                }
            };
            all_ready &= status == PrinterStatus::Ready;

            let missing = checked.is_err() || status == PrinterStatus::NotFound;
            if !missing {
                if let Some(since) = peripheral.not_found_since.take() {
                    info!(
                        printer = manager.name(),
                        missing_for = ?now.duration_since(since),
                        %status,
                        "peripheral is back"
                    );
                }
                continue;
            }

            let since = *peripheral.not_found_since.get_or_insert(now);
            let missing_for = now.duration_since(since);

            if missing_for > self.timings.restart_cooldown && peripheral.budget.try_acquire(now) {
                warn!(
                    printer = manager.name(),
                    service = %peripheral.service,
                    ?missing_for,
                    restarts = peripheral.budget.count(),
                    "peripheral missing, restarting service"
                );
                if let Err(e) = self.control.restart_service(&peripheral.service).await {
                    error!(service = %peripheral.service, error = %e, "service restart failed");
                }
            }

            if missing_for > self.timings.hard_restart_after {
                hard_needed = true;
            }
        }

        if hard_needed && self.policy != RestartPolicy::None && hard_budget.try_acquire(Instant::now()) {
            hard_restart(self.control.as_ref(), self.policy, "peripheral unresponsive").await;
        }

        all_ready
    }

    /// Interval before the next tick
    pub fn interval(&self, all_ready: bool) -> Duration {
        if all_ready {
            self.timings.slow_interval
        } else {
            self.timings.fast_interval
        }
    }

    /// Loop until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(policy = ?self.policy, "health supervisor started");
        loop {
            let all_ready = self.tick().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval(all_ready)) => {}
                _ = self.nudge.notified() => {}
            }
        }
        info!("health supervisor stopped");
    }
}
