//! Printer routes
//!
//! Mounted once per managed printer, at `/receipt` and `/label`.
//!
//! | Path | Printer | Description |
//! |------|---------|-------------|
//! | /status | both | Fresh status query |
//! | /print | both | Start a job (detached unless `wait_for_result=true`) |
//! | /reload | both | Feed paper for a roll swap |
//! | /configure | both | Write user settings |
//! | /print_text | label | Large text label |
//!
//! A request still waiting on the printer after [`ROUTE_TIMEOUT`] answers
//! 408.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Deserialize;
use shared::{
    LabelJob, PrinterStatus, ReceiptJob, StatusReport, SuccessResponse, parse_upc_list,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

use crate::printing::{ExecutorResult, PrinterManager, PrinterSettings};

type Printer = Arc<PrinterManager>;

/// Upper bound on one printer request, settings restart included
pub const ROUTE_TIMEOUT: Duration = Duration::from_secs(60);

pub fn receipt_router(manager: Printer) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/print", get(print_receipt))
        .route("/reload", get(reload))
        .route("/configure", get(configure_receipt))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, ROUTE_TIMEOUT))
        .with_state(manager)
}

pub fn label_router(manager: Printer) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/print", get(print_label))
        .route("/print_text", get(print_text))
        .route("/reload", get(reload))
        .route("/configure", get(configure_label))
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, ROUTE_TIMEOUT))
        .with_state(manager)
}

fn outcome(result: ExecutorResult<()>) -> Json<SuccessResponse> {
    match result {
        Ok(()) => Json(SuccessResponse::ok()),
        Err(e) => Json(SuccessResponse::failed().with_message(e.to_string())),
    }
}

/// Upcs from a JSON list parameter; malformed input prints no barcodes
fn upcs_param(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    parse_upc_list(raw).unwrap_or_else(|| {
        warn!(upcs = raw, "malformed upc list, printing without barcodes");
        Vec::new()
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /status
async fn status(State(manager): State<Printer>) -> Json<StatusReport> {
    Json(manager.check_status().await)
}

/// Run `job` on its own task. The caller only waits for it when asked to;
/// otherwise it is refused up front only when the last known status already
/// rules printing out.
async fn start_job<F>(manager: &PrinterManager, wait_for_result: bool, job: F) -> Json<SuccessResponse>
where
    F: Future<Output = ExecutorResult<()>> + Send + 'static,
{
    let cached = manager.cached_status();
    if !wait_for_result
        && cached.status != PrinterStatus::Unknown
        && !manager.is_print_eligible()
    {
        info!(printer = manager.name(), status = %cached.status, "print refused, printer not ready");
        return Json(SuccessResponse::failed().with_message(format!("Printer {}", cached.status)));
    }

    let handle = tokio::spawn(job);
    if !wait_for_result {
        return Json(SuccessResponse::ok().with_message("Print job started"));
    }
    match handle.await {
        Ok(result) => outcome(result),
        Err(e) => Json(SuccessResponse::failed().with_message(format!("print task failed: {e}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceiptQuery {
    #[serde(default)]
    order: String,
    heading: Option<String>,
    instructions: Option<String>,
    details: Option<String>,
    upcs: Option<String>,
    message: Option<String>,
    wait: Option<String>,
    #[serde(default)]
    wait_for_result: bool,
}

impl ReceiptQuery {
    fn into_job(self) -> ReceiptJob {
        let wait_minutes = non_empty(self.wait).and_then(|w| match w.trim().parse::<u32>() {
            Ok(minutes) => Some(minutes),
            Err(_) => {
                warn!(wait = %w, "non-numeric wait time ignored");
                None
            }
        });
        ReceiptJob {
            order_id: self.order,
            heading: non_empty(self.heading),
            instructions: non_empty(self.instructions),
            body_lines: self
                .details
                .map(|d| d.lines().map(str::to_string).collect())
                .unwrap_or_default(),
            upcs: upcs_param(self.upcs.as_deref()),
            message: non_empty(self.message),
            wait_minutes,
        }
    }
}

/// GET /print (receipt)
async fn print_receipt(
    State(manager): State<Printer>,
    Query(query): Query<ReceiptQuery>,
) -> Json<SuccessResponse> {
    let wait_for_result = query.wait_for_result;
    let job = query.into_job();
    let runner = manager.clone();
    start_job(&manager, wait_for_result, async move {
        runner.print_receipt(job).await
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    #[serde(default)]
    order: String,
    #[serde(default)]
    item: String,
    /// Single code or JSON list
    upc: Option<String>,
    upcs: Option<String>,
    #[serde(default)]
    item_number: String,
    #[serde(default)]
    item_total: String,
    fulfillment: Option<String>,
    #[serde(default)]
    paid: bool,
    #[serde(default)]
    wait_for_result: bool,
}

impl LabelQuery {
    fn into_job(self) -> LabelJob {
        let upcs = match (non_empty(self.upcs), non_empty(self.upc)) {
            (Some(list), _) => upcs_param(Some(&list)),
            // A bare code with a leading zero is not valid JSON
            (None, Some(single)) if single.bytes().all(|b| b.is_ascii_digit()) => vec![single],
            (None, single) => upcs_param(single.as_deref()),
        };
        LabelJob {
            order: self.order,
            item: self.item,
            upcs,
            item_number: self.item_number,
            item_total: self.item_total,
            fulfillment: non_empty(self.fulfillment),
            paid: self.paid,
        }
    }
}

/// GET /print (label)
async fn print_label(
    State(manager): State<Printer>,
    Query(query): Query<LabelQuery>,
) -> Json<SuccessResponse> {
    let wait_for_result = query.wait_for_result;
    let job = query.into_job();
    let runner = manager.clone();
    start_job(&manager, wait_for_result, async move {
        runner.print_label(job).await
    })
    .await
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    #[serde(default)]
    text: String,
}

/// GET /print_text
async fn print_text(
    State(manager): State<Printer>,
    Query(query): Query<TextQuery>,
) -> Json<SuccessResponse> {
    outcome(manager.print_text(&query.text).await)
}

/// GET /reload
async fn reload(State(manager): State<Printer>) -> Json<SuccessResponse> {
    outcome(manager.reload_paper().await)
}

#[derive(Debug, Deserialize)]
pub struct ReceiptSettingsQuery {
    #[serde(default)]
    fast: bool,
    #[serde(default = "default_true")]
    high_density: bool,
}

fn default_true() -> bool {
    true
}

/// GET /configure (receipt)
async fn configure_receipt(
    State(manager): State<Printer>,
    Query(query): Query<ReceiptSettingsQuery>,
) -> Json<SuccessResponse> {
    outcome(
        manager
            .configure(PrinterSettings::Receipt {
                fast: query.fast,
                high_density: query.high_density,
            })
            .await,
    )
}

#[derive(Debug, Deserialize)]
pub struct LabelSettingsQuery {
    #[serde(default)]
    buzzer: bool,
    #[serde(default)]
    paper_removal_standby: bool,
}

/// GET /configure (label)
async fn configure_label(
    State(manager): State<Printer>,
    Query(query): Query<LabelSettingsQuery>,
) -> Json<SuccessResponse> {
    outcome(
        manager
            .configure(PrinterSettings::Label {
                buzzer: query.buzzer,
                paper_removal_standby: query.paper_removal_standby,
            })
            .await,
    )
}
