use crate::api::AppState;
use crate::api::schemas::webhook::SubscriptionQuery;
use crate::error::Result;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Receives provider callbacks.
///
/// Once the signature checks out the callback is always acknowledged, even if
/// nothing in it could be applied.
///
/// # Errors
/// Returns `AppError::AuthError` if the signature is missing or invalid.
pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<impl IntoResponse> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    state.webhook_service.verify_signature(signature, &body)?;

    let report = state.webhook_service.reconcile(&body).await;
    tracing::debug!(?report, "Webhook acknowledged");

    Ok(StatusCode::OK)
}

/// Subscription handshake.
///
/// # Errors
/// Returns `AppError::Forbidden` if the verify token does not match.
pub async fn verify(
    State(state): State<AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> Result<impl IntoResponse> {
    let challenge =
        state.webhook_service.verify_subscription(query.mode.as_deref(), query.verify_token.as_deref(), query.challenge)?;
    Ok((StatusCode::OK, challenge))
}
