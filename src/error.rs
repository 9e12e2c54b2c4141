//! Error taxonomy

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;
use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum CommerceError {
    /// Client-correctable checkout input; no order is created.
    #[error("invalid checkout submission")]
    Validation(#[from] validator::ValidationErrors),

    /// External dependency failure; any order created stays Pending and is
    /// retryable or abandonable by the caller.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Callback payload without the expected result structure.
    #[error("malformed callback payload: {0}")]
    MalformedCallback(String),

    /// Callback referencing a checkout request no order holds: a forged
    /// delivery, or one that outran the initiation-response persistence.
    #[error("no order holds checkout request {0}")]
    UnknownCheckoutRequest(String),
}

impl IntoResponse for CommerceError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            CommerceError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "validation_failed", "details": errors }),
            ),
            CommerceError::Gateway(e) => {
                (StatusCode::BAD_GATEWAY, json!({ "error": "payment_gateway", "details": e.to_string() }))
            }
            CommerceError::Ledger(e) => {
                tracing::error!(error = %e, "ledger failure");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "storage" }))
            }
            CommerceError::MalformedCallback(detail) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "malformed_callback", "details": detail }),
            ),
            CommerceError::UnknownCheckoutRequest(id) => (
                StatusCode::NOT_FOUND,
                json!({ "error": "order_not_found", "details": id }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
