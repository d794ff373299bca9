//! Peripheral HTTP surface
//!
//! - [`printer`] - `/receipt/*` and `/label/*`, one router per managed printer
//! - [`health`] - `/health`
//! - [`watchdog`] - `/keepalive` and `/reboot`
//!
//! Routes for a printer that is not configured are not mounted and answer 404.

pub mod health;
pub mod printer;
pub mod watchdog;

use axum::Router;
use http::{HeaderName, HeaderValue};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::core::AppState;

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
struct XRequestId;

impl MakeRequestId for XRequestId {
    fn make_request_id<B>(&mut self, _request: &http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Routes only, no middleware
pub fn build_router(state: &AppState) -> Router {
    let mut router = Router::new().merge(health::router().with_state(state.clone()));
    if let Some(receipt) = &state.receipt {
        router = router.nest("/receipt", printer::receipt_router(receipt.clone()));
    }
    if let Some(label) = &state.label {
        router = router.nest("/label", printer::label_router(label.clone()));
    }
    if let Some(dog) = &state.watchdog {
        router = router.merge(watchdog::router(dog.clone()));
    }
    router
}

/// The application as served: routes plus tracing, CORS and request ids
pub fn build_app(state: &AppState) -> Router {
    // Outermost first: the id is set before the request is traced
    build_router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID, XRequestId))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(REQUEST_ID))
            .layer(CorsLayer::permissive()),
    )
}
