//! Print job executor
//!
//! One [`PrinterManager`] per physical printer. Its lock guards every status
//! query and every write, so jobs and polls against a printer are totally
//! ordered and the device is never opened twice at once.

use super::dedupe::DedupeGuard;
use super::renderer::{self, JobRenderer, PrinterSettings};
use super::throttle::{Operation, ThrottleState};
use async_trait::async_trait;
use kiosk_client::DeviceSyncClient;
use kiosk_printer::{
    CONFIGURATION_SLEEP, DeviceIo, PrintError, PrinterKind, PrinterModel, SEGMENT_SLEEP,
    check_status,
};
use parking_lot::RwLock;
use shared::{LabelJob, PrinterStatus, ReceiptJob, StatusReport, SyncEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutorError {
    #[error("printer not ready: {}", .0.status)]
    NotReady(StatusReport),

    #[error("device error: {0}")]
    Device(String),

    #[error("unsupported on this printer: {0}")]
    Unsupported(&'static str),
}

impl From<PrintError> for ExecutorError {
    fn from(e: PrintError) -> Self {
        ExecutorError::Device(e.to_string())
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Upstream sink for print success events
#[async_trait]
pub trait JobNotifier: Send + Sync {
    /// Best effort; the return value is informational only.
    async fn notify(&self, event: SyncEvent) -> bool;
}

#[async_trait]
impl JobNotifier for DeviceSyncClient {
    async fn notify(&self, event: SyncEvent) -> bool {
        self.notify_success(event).await
    }
}

struct Inner {
    device: Box<dyn DeviceIo>,
    throttle: ThrottleState,
    checked_at: Option<Instant>,
}

pub struct PrinterManager {
    model: PrinterModel,
    allow_low_paper: bool,
    renderer: JobRenderer,
    inner: Mutex<Inner>,
    last_status: RwLock<StatusReport>,
    receipts: DedupeGuard<ReceiptJob, ExecutorResult<()>>,
    labels: DedupeGuard<LabelJob, ExecutorResult<()>>,
    notifier: Option<Arc<dyn JobNotifier>>,
}

impl PrinterManager {
    pub fn new(model: PrinterModel, device: Box<dyn DeviceIo>) -> Self {
        let window = Duration::from_secs(60);
        Self {
            model,
            allow_low_paper: model.kind() == PrinterKind::Receipt,
            renderer: JobRenderer::new(model),
            inner: Mutex::new(Inner {
                device,
                throttle: ThrottleState::new(model.print_cooldown(), model.poll_cooldown()),
                checked_at: None,
            }),
            last_status: RwLock::new(StatusReport::default()),
            receipts: DedupeGuard::new(window),
            labels: DedupeGuard::new(window),
            notifier: None,
        }
    }

    pub fn with_allow_low_paper(mut self, allow: bool) -> Self {
        self.allow_low_paper = allow;
        self
    }

    pub fn with_renderer(mut self, renderer: JobRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_dedupe_window(mut self, window: Duration) -> Self {
        self.receipts = DedupeGuard::new(window);
        self.labels = DedupeGuard::new(window);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn JobNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Peripheral name used in logs and health snapshots
    pub fn name(&self) -> &'static str {
        match self.model.kind() {
            PrinterKind::Receipt => "receipt",
            PrinterKind::Label => "label",
        }
    }

    pub fn model(&self) -> PrinterModel {
        self.model
    }

    /// Last observed status, without touching the hardware
    pub fn cached_status(&self) -> StatusReport {
        self.last_status.read().clone()
    }

    /// Whether the cached status would currently allow a print
    pub fn is_print_eligible(&self) -> bool {
        self.last_status
            .read()
            .status
            .is_print_eligible(self.allow_low_paper)
    }

    /// Query the printer under the lock, honoring the poll cooldown.
    #[instrument(skip(self), fields(printer = self.name()))]
    pub async fn check_status(&self) -> StatusReport {
        let mut inner = self.inner.lock().await;
        inner.throttle.wait(Operation::Poll).await;
        self.query(&mut inner).await
    }

    async fn query(&self, inner: &mut Inner) -> StatusReport {
        let report = check_status(inner.device.as_mut(), self.model).await;
        inner.checked_at = Some(Instant::now());
        let previous = std::mem::replace(&mut *self.last_status.write(), report.clone());
        if previous != report {
            info!(
                printer = self.name(),
                status = %report.status,
                reason = report.reason.as_deref().unwrap_or(""),
                "status changed"
            );
        }
        report
    }

    /// Status no older than the poll window. The caller already waited out
    /// the throttle for the surrounding operation.
    async fn fresh_status(&self, inner: &mut Inner) -> StatusReport {
        let window = inner.throttle.poll_cooldown();
        match inner.checked_at {
            Some(at) if at.elapsed() < window => self.cached_status(),
            _ => self.query(inner).await,
        }
    }

    async fn ensure_ready(&self, inner: &mut Inner) -> ExecutorResult<()> {
        let report = self.fresh_status(inner).await;
        if report.status.is_print_eligible(self.allow_low_paper) {
            Ok(())
        } else {
            warn!(printer = self.name(), status = %report.status, "printer not ready, job refused");
            Err(ExecutorError::NotReady(report))
        }
    }

    /// Open, write every segment, then finalize. The device is cut (when
    /// `cut` is set) and closed whatever happened in between.
    async fn write_job(&self, inner: &mut Inner, segments: &[Vec<u8>], cut: bool) -> ExecutorResult<()> {
        let device = inner.device.as_mut();
        device.open().await?;

        let mut result = Ok(());
        for segment in segments {
            if let Err(e) = device.write(segment).await {
                error!(printer = self.name(), error = %e, "write failed mid-job");
                result = Err(e);
                break;
            }
            tokio::time::sleep(SEGMENT_SLEEP).await;
        }

        if cut && let Err(e) = device.write(&renderer::finish()).await {
            warn!(printer = self.name(), error = %e, "cut failed");
            if result.is_ok() {
                result = Err(e);
            }
        }
        if let Err(e) = device.close().await {
            warn!(printer = self.name(), error = %e, "close failed");
        }
        if result.is_err() {
            // Force a fresh query before the next job
            inner.checked_at = None;
        }
        result.map_err(ExecutorError::from)
    }

    async fn notify(&self, event: SyncEvent) {
        if let Some(notifier) = &self.notifier
            && !notifier.notify(event).await
        {
            warn!(printer = self.name(), "print succeeded but backend was not notified");
        }
    }

    /// Print a receipt. Identical submissions inside the dedupe window share
    /// one execution.
    #[instrument(skip(self, job), fields(printer = self.name(), order = %job.order_id))]
    pub async fn print_receipt(&self, job: ReceiptJob) -> ExecutorResult<()> {
        self.receipts
            .run(job.clone(), || self.run_receipt(job))
            .await
    }

    async fn run_receipt(&self, job: ReceiptJob) -> ExecutorResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.throttle.wait(Operation::Print).await;
            self.ensure_ready(&mut inner).await?;
            let segments = self.renderer.receipt(&job);
            self.write_job(&mut inner, &segments, true).await?;
        }
        info!("receipt printed");
        if !job.order_id.is_empty() {
            self.notify(SyncEvent::PrintSuccess {
                order: job.order_id.clone(),
            })
            .await;
        }
        Ok(())
    }

    #[instrument(skip(self, job), fields(printer = self.name(), order = %job.order))]
    pub async fn print_label(&self, job: LabelJob) -> ExecutorResult<()> {
        self.labels.run(job.clone(), || self.run_label(job)).await
    }

    async fn run_label(&self, job: LabelJob) -> ExecutorResult<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.throttle.wait(Operation::Print).await;
            self.ensure_ready(&mut inner).await?;
            let segments = self.renderer.label(&job);
            self.write_job(&mut inner, &segments, true).await?;
        }
        info!("label printed");
        if let Some(fulfillment) = job.fulfillment.filter(|f| !f.is_empty()) {
            self.notify(SyncEvent::LabelSuccess { fulfillment }).await;
        }
        Ok(())
    }

    /// Feed blank paper while the roll is swapped. No ready check: the
    /// printer is usually reporting paper out at this point.
    #[instrument(skip(self), fields(printer = self.name()))]
    pub async fn reload_paper(&self) -> ExecutorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.throttle.wait(Operation::Print).await;
        let segments = self.renderer.reload();
        self.write_job(&mut inner, &segments, true).await
    }

    #[instrument(skip(self, text), fields(printer = self.name()))]
    pub async fn print_text(&self, text: &str) -> ExecutorResult<()> {
        let mut inner = self.inner.lock().await;
        inner.throttle.wait(Operation::Print).await;
        let segments = self.renderer.text(text);
        self.write_job(&mut inner, &segments, true).await
    }

    /// Write user settings, then hold the lock while the printer restarts.
    #[instrument(skip(self), fields(printer = self.name()))]
    pub async fn configure(&self, settings: PrinterSettings) -> ExecutorResult<()> {
        let matches = matches!(
            (settings, self.model.kind()),
            (PrinterSettings::Receipt { .. }, PrinterKind::Receipt)
                | (PrinterSettings::Label { .. }, PrinterKind::Label)
        );
        if !matches {
            return Err(ExecutorError::Unsupported("settings for another printer kind"));
        }

        let mut inner = self.inner.lock().await;
        inner.throttle.wait(Operation::Print).await;
        let segments = self.renderer.configure(settings);
        self.write_job(&mut inner, &segments, false).await?;
        info!(wait = ?CONFIGURATION_SLEEP, "settings written, waiting for printer restart");
        tokio::time::sleep(CONFIGURATION_SLEEP).await;
        inner.checked_at = None;
        Ok(())
    }

    /// Wait until no job or query holds the printer
    pub async fn idle(&self) {
        drop(self.inner.lock().await);
    }

    /// Record a status check that gave up waiting for the printer
    pub fn mark_unresponsive(&self) {
        *self.last_status.write() =
            StatusReport::with_reason(PrinterStatus::Unknown, "status check timed out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_printer::{MockDevice, PRINT_COOLDOWN, StatusQuery};
    #[derive(Default)]
    struct RecordingNotifier {
        events: parking_lot::Mutex<Vec<SyncEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl JobNotifier for RecordingNotifier {
        async fn notify(&self, event: SyncEvent) -> bool {
            self.events.lock().push(event);
            !self.fail
        }
    }

    fn receipt_manager(device: &MockDevice) -> PrinterManager {
        PrinterManager::new(PrinterModel::EuM30, Box::new(device.clone()))
    }

    fn job(order: &str) -> ReceiptJob {
        let mut job = ReceiptJob::new(order);
        job.upcs = vec!["860012979325".into()];
        job
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_prints_cuts_and_notifies() {
        let device = MockDevice::ready();
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = receipt_manager(&device).with_notifier(notifier.clone());

        manager.print_receipt(job("12")).await.unwrap();

        assert!(device.printed_contains(b"860012979325"));
        assert!(device.printed().ends_with(&[0x1D, 0x56, 0x42, 0x00]));
        assert!(!device.is_open());
        assert_eq!(
            notifier.events.lock().as_slice(),
            &[SyncEvent::PrintSuccess { order: "12".into() }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_refuses_without_writing() {
        let device = MockDevice::ready();
        device.set_reply(StatusQuery::Paper, 0b0111_0010);
        let manager = receipt_manager(&device);

        let err = manager.print_receipt(job("12")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotReady(ref r) if r.status == PrinterStatus::NoPaper));
        assert!(device.print_writes().is_empty());
        assert!(!device.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_paper_eligibility_is_configurable() {
        let device = MockDevice::ready();
        device.set_reply(StatusQuery::Paper, 0b0001_1110);

        let strict = receipt_manager(&device).with_allow_low_paper(false);
        assert!(strict.print_receipt(job("1")).await.is_err());

        let lenient = receipt_manager(&device);
        lenient.print_receipt(job("1")).await.unwrap();
        assert_eq!(lenient.cached_status().status, PrinterStatus::LowPaper);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_job_failure_still_closes() {
        let device = MockDevice::ready();
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = receipt_manager(&device).with_notifier(notifier.clone());
        // Both status queries and the init segment go through, then every
        // write fails
        device.fail_writes_after(3);

        let err = manager.print_receipt(job("9")).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Device(_)));
        assert!(!device.is_open());
        assert!(notifier.events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_attempted_after_failed_segment() {
        let device = MockDevice::ready();
        let manager = receipt_manager(&device);
        manager.check_status().await;
        device.clear();
        // The logo-less receipt has init, heading and barcode segments;
        // let two through, fail the third, the cut is still attempted
        device.fail_writes_after(2);

        let mut printing = job("3");
        printing.message = Some("bye".into());
        assert!(manager.print_receipt(printing).await.is_err());
        assert_eq!(device.print_writes().len(), 2);
        assert!(!device.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_notify_failure_keeps_success() {
        let device = MockDevice::ready();
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let manager = receipt_manager(&device).with_notifier(notifier.clone());
        assert!(manager.print_receipt(job("5")).await.is_ok());
        assert_eq!(notifier.events.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_upc_still_succeeds() {
        let device = MockDevice::ready();
        let manager = receipt_manager(&device);
        let mut short = ReceiptJob::new("8");
        short.upcs = vec!["12345".into()];

        manager.print_receipt(short).await.unwrap();
        assert!(device.printed_contains(renderer::INVALID_UPC.as_bytes()));
        assert!(!device.printed_contains(&[0x1D, 0x6B, 0x41]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_prints_once() {
        let device = MockDevice::ready();
        let manager = Arc::new(receipt_manager(&device));

        let (a, b) = tokio::join!(
            manager.print_receipt(job("77")),
            manager.print_receipt(job("77"))
        );
        assert!(a.is_ok() && b.is_ok());
        let cuts = device
            .print_writes()
            .iter()
            .filter(|(_, w)| w.ends_with(&[0x1D, 0x56, 0x42, 0x00]))
            .count();
        assert_eq!(cuts, 1);

        // Outside the window the same job prints again
        tokio::time::sleep(Duration::from_secs(61)).await;
        manager.print_receipt(job("77")).await.unwrap();
        let cuts = device
            .print_writes()
            .iter()
            .filter(|(_, w)| w.ends_with(&[0x1D, 0x56, 0x42, 0x00]))
            .count();
        assert_eq!(cuts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prints_are_spaced_by_cooldown() {
        let device = MockDevice::ready();
        let manager = receipt_manager(&device).with_dedupe_window(Duration::ZERO);

        for order in ["a", "b", "c"] {
            manager.print_receipt(job(order)).await.unwrap();
        }
        let starts: Vec<Instant> = device
            .print_writes()
            .into_iter()
            .filter(|(_, w)| w.starts_with(&[0x1B, 0x40]))
            .map(|(t, _)| t)
            .collect();
        assert_eq!(starts.len(), 3);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= PRINT_COOLDOWN);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_polls_are_spaced() {
        let device = MockDevice::ready();
        let manager = receipt_manager(&device);
        let start = Instant::now();
        manager.check_status().await;
        let first = start.elapsed();
        manager.check_status().await;
        assert!(start.elapsed() - first >= PrinterModel::EuM30.poll_cooldown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_printer() {
        let device = MockDevice::ready();
        device.set_not_found(true);
        let manager = receipt_manager(&device);
        assert_eq!(manager.check_status().await.status, PrinterStatus::NotFound);
        assert_eq!(manager.cached_status().status, PrinterStatus::NotFound);
        assert!(!manager.is_print_eligible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_job_does_not_block_polls_forever() {
        let device = MockDevice::ready();
        let manager = Arc::new(receipt_manager(&device));
        manager.check_status().await;
        device.set_stalled(true);

        let job = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.print_receipt(job("4")).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;

        // The poll queues behind the wedged job; a bounded caller gives up
        let poll = tokio::time::timeout(Duration::from_secs(10), manager.check_status()).await;
        assert!(poll.is_err());
        manager.mark_unresponsive();
        assert_eq!(manager.cached_status().reason.as_deref(), Some("status check timed out"));
        assert!(!manager.is_print_eligible());
        job.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_ignores_status() {
        let device = MockDevice::ready();
        device.set_reply(StatusQuery::Paper, 0b0111_0010);
        let manager = receipt_manager(&device);
        manager.reload_paper().await.unwrap();
        assert!(device.printed_contains(renderer::RELOADING_PAPER.as_bytes()));
        assert!(device.queries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_holds_lock_for_settle_time() {
        let device = MockDevice::ready();
        let manager = Arc::new(receipt_manager(&device));

        let configure = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .configure(PrinterSettings::Receipt {
                        fast: false,
                        high_density: true,
                    })
                    .await
            })
        };
        while device.print_writes().is_empty() {
            tokio::task::yield_now().await;
        }

        // A poll queues behind the settle wait
        let start = Instant::now();
        manager.check_status().await;
        assert!(start.elapsed() >= CONFIGURATION_SLEEP - Duration::from_secs(1));
        configure.await.unwrap().unwrap();

        let err = manager
            .configure(PrinterSettings::Label {
                buzzer: true,
                paper_removal_standby: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Unsupported(_)));
    }
}
