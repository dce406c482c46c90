use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::{is_valid_token, mint_token};
use crate::state::AppState;

pub const DEVICE_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-device-token");
pub const DEVICE_CREATED_HEADER: HeaderName = HeaderName::from_static("x-device-created");

/// The anonymous device behind a request.
#[derive(Debug, Clone, Copy)]
pub struct Device {
    pub id: Uuid,
}

/// Resolve `x-device-token` to a device, minting a fresh identity when the
/// header is missing or malformed. A minted token is echoed back in the
/// response headers so the client can keep it.
pub async fn resolve_device(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(&DEVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| is_valid_token(t))
        .map(str::to_string);

    let (token, created) = match presented {
        Some(token) => (token, false),
        None => (mint_token(), true),
    };

    let db_state = state.clone();
    let db_token = token.clone();
    let device_id = tokio::task::spawn_blocking(move || {
        db_state.db.upsert_device(Uuid::new_v4(), &db_token, Utc::now())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Unavailable(anyhow::anyhow!("device lookup task failed: {}", e))
    })?
    .map_err(ApiError::Unavailable)?;

    if created {
        debug!("Minted device {}", device_id);
    }

    req.extensions_mut().insert(Device { id: device_id });
    let mut response = next.run(req).await;

    if created {
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&token) {
            headers.insert(DEVICE_TOKEN_HEADER, value);
            headers.insert(DEVICE_CREATED_HEADER, HeaderValue::from_static("true"));
        }
    }

    Ok(response)
}
