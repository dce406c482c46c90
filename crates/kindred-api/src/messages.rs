use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use kindred_db::models::{MessageRow, ReactionCountRow};
use kindred_types::api::{
    MessageResponse, PostMessageResponse, QuotaSnapshot, ReactionGroup, SendMessageRequest,
};
use kindred_types::events::CircleEvent;

use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery};
use crate::identity::display_name;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Only messages created strictly after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Current UTC calendar day as `[start, start + 24h)`.
pub fn day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now);
    (start, start + Duration::days(1))
}

fn snapshot(limit: u32, used: u32, resets_at: DateTime<Utc>) -> QuotaSnapshot {
    QuotaSnapshot {
        limit,
        used,
        remaining: limit.saturating_sub(used),
        resets_at,
    }
}

/// Append a member message and push it to viewers.
///
/// The quota check and the insert are separate steps, so concurrent posts
/// from one device can overshoot the daily limit slightly.
pub async fn post_message(
    state: &AppState,
    circle_id: Uuid,
    device_id: Uuid,
    content: &str,
) -> Result<(MessageResponse, QuotaSnapshot), ApiError> {
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::InvalidPayload("message content is empty".into()));
    }
    let max = state.settings.message_max_chars;
    if content.chars().count() > max {
        return Err(ApiError::LengthOutOfRange { min: 1, max });
    }

    // stored timestamps carry microseconds
    let now = Utc::now().trunc_subsecs(6);
    let (day_start, day_end) = day_window(now);
    let limit = state.settings.daily_message_limit;

    let (is_member, circle, used) = run_db(state, move |db| {
        let is_member = db.is_member(circle_id, device_id)?;
        if !is_member {
            return Ok((false, None, 0));
        }
        let circle = db.get_circle(circle_id)?;
        let used = db.count_messages_between(circle_id, device_id, day_start, day_end)?;
        Ok((true, circle, used))
    })
    .await?;

    if !is_member {
        return Err(ApiError::Forbidden);
    }
    if !circle.is_some_and(|c| c.is_open(now)) {
        return Err(ApiError::CircleClosed);
    }
    if used >= limit {
        return Err(ApiError::QuotaExceeded(snapshot(limit, used, day_end)));
    }

    let id = Uuid::new_v4();
    let text = content.clone();
    let created_at = run_db(state, move |db| {
        db.insert_message(id, circle_id, Some(device_id), &text, false, now)
    })
    .await?;

    let message = to_response(
        MessageRow {
            id,
            circle_id,
            device_id: Some(device_id),
            content,
            is_system: false,
            created_at,
        },
        Vec::new(),
    );
    state.publish(CircleEvent::NewMessage(message.clone()));

    Ok((message, snapshot(limit, used + 1, day_end)))
}

/// Append a system notice (joins, leaves) and push it to viewers.
pub async fn announce(state: &AppState, circle_id: Uuid, text: &'static str) -> Result<(), ApiError> {
    let id = Uuid::new_v4();
    let now = Utc::now().trunc_subsecs(6);
    let created_at = run_db(state, move |db| db.insert_message(id, circle_id, None, text, true, now)).await?;

    state.publish(CircleEvent::NewMessage(to_response(
        MessageRow {
            id,
            circle_id,
            device_id: None,
            content: text.to_string(),
            is_system: true,
            created_at,
        },
        Vec::new(),
    )));
    Ok(())
}

/// Ascending messages visible to `viewer_id`, with reaction totals.
pub async fn list_messages(
    state: &AppState,
    circle_id: Uuid,
    viewer_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<MessageResponse>, ApiError> {
    let limit = state.settings.message_page_size;

    let listed = run_db(state, move |db| {
        if !db.is_member(circle_id, viewer_id)? {
            return Ok(None);
        }
        let rows = db.list_messages(circle_id, viewer_id, since, limit)?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let counts = db.reaction_counts(&ids)?;
        Ok(Some((rows, counts)))
    })
    .await?;

    let Some((rows, counts)) = listed else {
        return Err(ApiError::Forbidden);
    };

    let mut reactions = group_reactions(counts);
    Ok(rows
        .into_iter()
        .map(|row| {
            let groups = reactions.remove(&row.id).unwrap_or_default();
            to_response(row, groups)
        })
        .collect())
}

pub fn group_reactions(rows: Vec<ReactionCountRow>) -> HashMap<Uuid, Vec<ReactionGroup>> {
    let mut grouped: HashMap<Uuid, Vec<ReactionGroup>> = HashMap::new();
    for row in rows {
        grouped.entry(row.message_id).or_default().push(ReactionGroup {
            emoji: row.emoji,
            count: row.count as usize,
        });
    }
    grouped
}

pub fn to_response(row: MessageRow, reactions: Vec<ReactionGroup>) -> MessageResponse {
    MessageResponse {
        id: row.id,
        circle_id: row.circle_id,
        device_id: row.device_id,
        display_name: row.device_id.map(display_name),
        content: row.content,
        is_system: row.is_system,
        created_at: row.created_at,
        reactions,
    }
}

// -- Handlers --

pub async fn send_message(
    State(state): State<AppState>,
    ApiPath(circle_id): ApiPath<Uuid>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (message, quota) = post_message(&state, circle_id, device.id, &req.content).await?;
    info!("Device {} posted to circle {} ({} left today)", device.id, circle_id, quota.remaining);

    Ok((StatusCode::CREATED, Json(PostMessageResponse { message, quota })))
}

pub async fn get_messages(
    State(state): State<AppState>,
    ApiPath(circle_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<MessageQuery>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = list_messages(&state, circle_id, device.id, query.since).await?;
    Ok(Json(messages))
}
