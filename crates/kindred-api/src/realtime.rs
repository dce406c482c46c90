use axum::{Extension, extract::State, response::IntoResponse};
use serde::Deserialize;

use kindred_gateway::stream::circle_stream;
use kindred_types::events::parse_circle_channel;

use crate::error::{ApiError, ApiQuery};
use crate::middleware::Device;
use crate::state::{AppState, run_db};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub channel: Option<String>,
}

/// Server-sent events for one circle, `GET /stream?channel=circle:<id>`.
/// The stream closes when the device stops being a member.
pub async fn stream(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StreamQuery>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = query
        .channel
        .filter(|c| !c.trim().is_empty())
        .ok_or(ApiError::MissingChannel)?;
    let circle_id = parse_circle_channel(channel.trim())
        .ok_or_else(|| ApiError::InvalidPayload(format!("unknown channel '{}'", channel)))?;

    // Subscribe before the membership check so a leave landing in between
    // still reaches this stream.
    let sse = circle_stream(state.dispatcher.clone(), circle_id, device.id);

    let device_id = device.id;
    if !run_db(&state, move |db| db.is_member(circle_id, device_id)).await? {
        return Err(ApiError::Forbidden);
    }

    Ok(sse)
}
