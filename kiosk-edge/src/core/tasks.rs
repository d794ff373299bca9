//! Background loop management
//!
//! Every long-running loop (health supervisor, watchdog, backend poller,
//! sensor sampler) is registered here so panics are logged and shutdown is
//! one call.

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Kind of background loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Peripheral health and escalation
    Supervisor,
    /// Keepalive and scheduled device recovery
    Watchdog,
    /// Backend state push/pull
    Poller,
    /// Local sensor sampling
    Sampler,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            TaskKind::Supervisor => "supervisor",
            TaskKind::Watchdog => "watchdog",
            TaskKind::Poller => "poller",
            TaskKind::Sampler => "sampler",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text of a panic payload raised with `panic!("...")` or `panic!("{x}")`
fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

struct Loop {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Registry of background loops sharing one cancellation token
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// let token = tasks.shutdown_token();
/// tasks.spawn("health_supervisor", TaskKind::Supervisor, async move {
///     supervisor.run(token).await
/// });
/// tasks.shutdown(Duration::from_secs(5)).await;
/// ```
pub struct BackgroundTasks {
    loops: Vec<Loop>,
    shutdown: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            loops: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token the loops watch for shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn a loop. A panic is logged with its message; a loop that returns
    /// before shutdown is logged as lost.
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Err(payload) => {
                    error!(task = name, %kind, panic = panic_text(&*payload), "background loop panicked");
                }
                Ok(()) if !token.is_cancelled() => {
                    warn!(task = name, %kind, "background loop returned before shutdown");
                }
                Ok(()) => debug!(task = name, "background loop stopped"),
            }
        });
        debug!(task = name, %kind, "background loop started");
        self.loops.push(Loop { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn log_summary(&self) {
        let count = |kind| self.loops.iter().filter(|l| l.kind == kind).count();
        info!(
            total = self.loops.len(),
            supervisor = count(TaskKind::Supervisor),
            watchdog = count(TaskKind::Watchdog),
            poller = count(TaskKind::Poller),
            sampler = count(TaskKind::Sampler),
            "background loops running"
        );
    }

    /// Log every loop that has already exited and return how many did
    pub fn check_health(&self) -> usize {
        let mut lost = 0;
        for l in self.loops.iter().filter(|l| l.handle.is_finished()) {
            error!(task = l.name, kind = %l.kind, "background loop is no longer running");
            lost += 1;
        }
        lost
    }

    /// Cancel every loop and give each up to `grace` to return; stragglers
    /// are aborted.
    pub async fn shutdown(self, grace: Duration) {
        info!(count = self.loops.len(), "stopping background loops");
        self.shutdown.cancel();

        for Loop { name, handle, .. } in self.loops {
            let abort = handle.abort_handle();
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => debug!(task = name, "joined"),
                Ok(Err(e)) => error!(task = name, error = %e, "join failed"),
                Err(_) => {
                    warn!(task = name, ?grace, "ignored shutdown, aborting");
                    abort.abort();
                }
            }
        }

        info!("background loops stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}
