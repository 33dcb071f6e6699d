pub mod epayco;
pub mod health;

use crate::database::repository::{OrderStore, TransactionStore};
use crate::error::{AppError, AppErrorKind};
use crate::payments::reconciler::NotificationReconciler;
use crate::payments::traits::ReferenceLookup;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub transactions: Arc<dyn TransactionStore>,
    pub orders: Arc<dyn OrderStore>,
    pub lookup: Arc<dyn ReferenceLookup>,
    pub reconciler: NotificationReconciler,
    /// Public base URL used for ePayco callback URLs
    pub base_url: String,
    pub environment: String,
    pub lookup_api: String,
}

/// Build the HTTP router. Trailing-slash and bare variants of the ePayco
/// paths are both served since the gateway is configured with either.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/payment/epayco/checkout",
            get(epayco::checkout).post(epayco::checkout),
        )
        .route(
            "/payment/epayco/checkout/",
            get(epayco::checkout).post(epayco::checkout),
        )
        .route(
            "/payment/epayco/response",
            get(epayco::response).post(epayco::response),
        )
        .route(
            "/payment/epayco/response/",
            get(epayco::response).post(epayco::response),
        )
        .route(
            "/payment/epayco/confirmation",
            get(epayco::confirmation).post(epayco::confirmation),
        )
        .route(
            "/payment/epayco/confirmation/",
            get(epayco::confirmation).post(epayco::confirmation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(_) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
