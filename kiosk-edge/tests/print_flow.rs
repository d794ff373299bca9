//! Peripheral routes end to end against scripted printers

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use kiosk_edge::printing::JobNotifier;
use kiosk_edge::sensors::TemperatureSensors;
use kiosk_edge::{AppState, PrinterManager, build_app};
use kiosk_printer::{MockDevice, PrinterModel, StatusQuery};
use serde_json::Value;
use shared::SyncEvent;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingNotifier {
    events: parking_lot::Mutex<Vec<SyncEvent>>,
}

#[async_trait]
impl JobNotifier for RecordingNotifier {
    async fn notify(&self, event: SyncEvent) -> bool {
        self.events.lock().push(event);
        true
    }
}

struct Kiosk {
    app: Router,
    receipt: MockDevice,
    label: MockDevice,
    notifier: Arc<RecordingNotifier>,
}

impl Kiosk {
    fn new() -> Self {
        let receipt = MockDevice::ready();
        let label = MockDevice::ready();
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = |model, device: &MockDevice| {
            Arc::new(
                PrinterManager::new(model, Box::new(device.clone()))
                    .with_notifier(notifier.clone()),
            )
        };
        let state = AppState::new(
            Some(manager(PrinterModel::EuM30, &receipt)),
            Some(manager(PrinterModel::TmL100, &label)),
            Arc::new(TemperatureSensors::new("/nonexistent")),
        );
        Self {
            app: build_app(&state),
            receipt,
            label,
            notifier,
        }
    }

    async fn get(&self, uri: &str) -> Value {
        let response = self
            .app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn label_print_waits_for_result() {
    let kiosk = Kiosk::new();

    let body = kiosk
        .get(
            "/label/print?order=Debug&item=3%20Tender%20Combo&upc=123456789123\
             &item_number=1&item_total=3&fulfillment=f-1&wait_for_result=true",
        )
        .await;

    assert_eq!(body["success"], true);
    assert!(kiosk.label.printed_contains(b"Order #: Debug"));
    assert!(kiosk.label.printed_contains(b"3 Tender Combo (1 of 3)"));
    assert!(kiosk.receipt.print_writes().is_empty());
    assert_eq!(
        kiosk.notifier.events.lock().as_slice(),
        &[SyncEvent::LabelSuccess {
            fulfillment: "f-1".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn detached_receipt_print_finishes_in_background() {
    let kiosk = Kiosk::new();

    let body = kiosk
        .get("/receipt/print?order=Debug+Order&details=6+Tender+Combo&wait=30")
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Print job started");

    for _ in 0..100 {
        if !kiosk.notifier.events.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(kiosk.receipt.printed_contains(b"Debug Order"));
    assert!(kiosk.receipt.printed_contains(b"Estimated wait: 30 min"));
    assert_eq!(
        kiosk.notifier.events.lock().as_slice(),
        &[SyncEvent::PrintSuccess {
            order: "Debug Order".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn known_bad_status_refuses_detached_print() {
    let kiosk = Kiosk::new();
    kiosk.receipt.set_reply(StatusQuery::Paper, 0b0111_0010);

    let status = kiosk.get("/receipt/status").await;
    assert_eq!(status["status"], "no_paper");

    let body = kiosk.get("/receipt/print?order=12").await;
    assert_eq!(body["success"], false);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(kiosk.receipt.print_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_submissions_print_once() {
    let kiosk = Kiosk::new();
    let uri = "/label/print?order=7&item=Fries&wait_for_result=true";

    let (first, second) = tokio::join!(kiosk.get(uri), kiosk.get(uri));
    assert_eq!(first["success"], true);
    assert_eq!(second["success"], true);

    let printed = kiosk.label.printed();
    let heading = b"Order #: 7";
    let count = printed.windows(heading.len()).filter(|w| w == heading).count();
    assert_eq!(count, 1);
}

#[tokio::test(start_paused = true)]
async fn reload_ignores_paper_status() {
    let kiosk = Kiosk::new();
    kiosk.label.set_reply(StatusQuery::Paper, 0b0111_0010);

    let body = kiosk.get("/label/reload").await;
    assert_eq!(body["success"], true);
    assert!(kiosk.label.printed_contains(b"RELOADING PAPER"));
}

#[tokio::test(start_paused = true)]
async fn print_text_is_label_only() {
    let kiosk = Kiosk::new();

    let body = kiosk.get("/label/print_text?text=HELLO").await;
    assert_eq!(body["success"], true);
    assert!(kiosk.label.printed_contains(b"HELLO"));

    let response = kiosk
        .app
        .clone()
        .oneshot(
            Request::get("/receipt/print_text?text=HELLO")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn configure_writes_user_settings() {
    let kiosk = Kiosk::new();

    let body = kiosk.get("/receipt/configure?fast=true").await;
    assert_eq!(body["success"], true);
    // GS ( E: enter user setting mode
    assert!(kiosk.receipt.printed_contains(&[0x1D, 0x28, 0x45]));
    assert!(!kiosk.receipt.is_open());
}

#[tokio::test(start_paused = true)]
async fn health_reflects_polled_statuses() {
    let kiosk = Kiosk::new();
    kiosk.get("/receipt/status").await;
    kiosk.get("/label/status").await;

    let health = kiosk.get("/health").await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["printers"]["receipt"]["status"], "ready");
    assert_eq!(health["printers"]["label"]["status"], "ready");
}
