use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::errors::{AppError, AppResult};
use crate::models::GatewayEvent;
use crate::services::booking;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Base64 HMAC-SHA1 of the raw request body, keyed with the webhook secret.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

fn verify_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let mut mac = match Hmac::<Sha1>::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Provider callback. Answers 404 for charges we do not know yet so the
/// provider retries the delivery.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    // Skip verification if no secret is configured (dev mode)
    if !state.config.gateway_webhook_secret.is_empty() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if signature.is_empty() {
            tracing::warn!("missing gateway signature header");
            return Err(AppError::Unauthorized);
        }
        if !verify_signature(&state.config.gateway_webhook_secret, signature, &body) {
            tracing::warn!("invalid gateway signature");
            return Err(AppError::Unauthorized);
        }
    }

    let event: GatewayEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("malformed gateway event: {e}")))?;
    tracing::info!(reference = %event.reference(), key = %event.event_key(), "gateway event received");

    let disposition = {
        let mut conn = state.conn()?;
        booking::apply_gateway_event(&mut conn, &event, state.config.local_now())?
    };

    Ok(Json(serde_json::json!({ "status": disposition })))
}
