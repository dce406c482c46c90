use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::info;

use kindred_types::api::ResetResponse;

use crate::circles::leave;
use crate::error::ApiError;
use crate::identity::device_hash;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

/// Forget the device entirely: its memberships, messages, reactions, abuse
/// records, letters and responses. A client that keeps presenting the old
/// token is resolved to a new device id with no history.
pub async fn reset_device(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    // tell the circle before the membership disappears
    leave(&state, device.id).await?;

    let hash = device_hash(&state.settings.device_hash_salt, device.id);
    let id = device.id;
    let reset = run_db(&state, move |db| db.delete_device(id, &hash)).await?;
    info!("Device {} reset", id);

    Ok(Json(ResetResponse { reset }))
}
