use axum::{
    Extension,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use kindred_types::events::CircleEvent;

use crate::error::{ApiError, ApiPath};
use crate::identity::display_name;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

/// Broadcast a typing signal. Nothing is stored; viewers expire the
/// indicator on their own after `typing_ttl`.
pub async fn send_typing(state: &AppState, circle_id: Uuid, device_id: Uuid) -> Result<(), ApiError> {
    if !run_db(state, move |db| db.is_member(circle_id, device_id)).await? {
        return Err(ApiError::NotMember);
    }

    state.publish(CircleEvent::Typing {
        circle_id,
        device_id,
        display_name: display_name(device_id),
        expires_in_ms: state.settings.typing_ttl.as_millis() as u64,
    });
    Ok(())
}

pub async fn typing(
    State(state): State<AppState>,
    ApiPath(circle_id): ApiPath<Uuid>,
    Extension(device): Extension<Device>,
) -> Result<StatusCode, ApiError> {
    send_typing(&state, circle_id, device.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
