use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use chrono::{SubsecRound, Utc};
use uuid::Uuid;

use kindred_types::api::{AddReactionRequest, ReactionGroup, ReactionResponse};
use kindred_types::events::CircleEvent;

use crate::error::{ApiError, ApiJson, ApiPath};
use crate::messages::group_reactions;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

const EMOJI_MAX_CHARS: usize = 16;

/// Record a reaction and push the new totals. Repeated reactions from the
/// same device are counted, not deduplicated.
pub async fn add_reaction(
    state: &AppState,
    message_id: Uuid,
    device_id: Uuid,
    emoji: &str,
) -> Result<Vec<ReactionGroup>, ApiError> {
    let emoji = emoji.trim().to_string();
    if emoji.is_empty() || emoji.chars().count() > EMOJI_MAX_CHARS {
        return Err(ApiError::InvalidPayload(format!(
            "emoji must be 1 to {} characters",
            EMOJI_MAX_CHARS
        )));
    }

    let message = run_db(state, move |db| db.get_message(message_id))
        .await?
        .ok_or(ApiError::NotFound("message"))?;
    let circle_id = message.circle_id;

    if !run_db(state, move |db| db.is_member(circle_id, device_id)).await? {
        return Err(ApiError::NotMember);
    }

    let now = Utc::now().trunc_subsecs(6);
    let stored = emoji.clone();
    let counts = run_db(state, move |db| {
        db.insert_reaction(Uuid::new_v4(), message_id, device_id, &stored, now)?;
        db.reaction_counts(&[message_id])
    })
    .await?;

    let reactions = group_reactions(counts).remove(&message_id).unwrap_or_default();

    state.publish(CircleEvent::MessageReaction {
        circle_id,
        message_id,
        device_id,
        emoji,
        reactions: reactions.clone(),
    });

    Ok(reactions)
}

pub async fn react(
    State(state): State<AppState>,
    ApiPath(message_id): ApiPath<Uuid>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<AddReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reactions = add_reaction(&state, message_id, device.id, &req.emoji).await?;
    Ok(Json(ReactionResponse {
        message_id,
        reactions,
    }))
}
