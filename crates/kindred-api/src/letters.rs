use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{SubsecRound, Utc};
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use kindred_db::models::{LetterRow, ReplyOutcome};
use kindred_types::api::{
    CreateLetterRequest, CreateReplyRequest, LetterResponse, RandomLetterResponse, ReplyResponse,
};
use kindred_types::models::LetterStatus;

use crate::error::{ApiError, ApiJson, ApiPath};
use crate::identity::device_hash;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

fn bounded(state: &AppState, content: &str) -> Result<String, ApiError> {
    let (min, max) = (state.settings.letter_min_chars, state.settings.letter_max_chars);
    let content = content.trim();
    let len = content.chars().count();
    if len < min || len > max {
        return Err(ApiError::LengthOutOfRange { min, max });
    }
    Ok(content.to_string())
}

fn to_response(letter: LetterRow) -> LetterResponse {
    LetterResponse {
        id: letter.id,
        content: letter.content,
        status: letter.status,
        created_at: letter.created_at,
    }
}

/// Store a letter as `PENDING`, then resolve it through the classifier.
/// Classifier trouble resolves to `APPROVED` (see [`crate::moderation`]).
pub async fn create_letter(state: &AppState, device_hash: String, content: &str) -> Result<LetterRow, ApiError> {
    let content = bounded(state, content)?;

    let id = Uuid::new_v4();
    let now = Utc::now().trunc_subsecs(6);
    let text = content.clone();
    let mut letter = run_db(state, move |db| db.insert_letter(id, &text, &device_hash, now)).await?;

    let verdict = state.moderator.classify(&content).await;
    if run_db(state, move |db| db.resolve_letter(id, verdict)).await? {
        letter.status = verdict;
    }
    info!("Letter {} resolved as {}", id, letter.status);

    Ok(letter)
}

/// Uniformly random approved letter the reader has neither written nor
/// answered.
pub async fn pick_random_approved(state: &AppState, device_hash: String) -> Result<Option<LetterRow>, ApiError> {
    run_db(state, move |db| {
        let eligible = db.count_eligible_letters(&device_hash)?;
        if eligible == 0 {
            return Ok(None);
        }
        let offset = rand::rng().random_range(0..eligible);
        db.eligible_letter_at(&device_hash, offset)
    })
    .await
}

pub async fn respond(
    state: &AppState,
    letter_id: Uuid,
    device_hash: String,
    content: &str,
) -> Result<ReplyResponse, ApiError> {
    let content = bounded(state, content)?;

    let hash = device_hash.clone();
    let (letter, already) = run_db(state, move |db| {
        let letter = db.get_letter(letter_id)?;
        let already = db.has_reply(letter_id, &hash)?;
        Ok((letter, already))
    })
    .await?;

    match letter {
        Some(letter) if letter.status == LetterStatus::Approved => {}
        _ => return Err(ApiError::NotFound("letter")),
    }
    if already {
        return Err(ApiError::DuplicateResponse);
    }

    let id = Uuid::new_v4();
    let now = Utc::now().trunc_subsecs(6);
    let text = content.clone();
    let outcome = run_db(state, move |db| db.insert_reply(id, letter_id, &device_hash, &text, now)).await?;

    match outcome {
        ReplyOutcome::Inserted => Ok(ReplyResponse {
            id,
            message_id: letter_id,
            content,
            created_at: now,
        }),
        ReplyOutcome::Duplicate => Err(ApiError::DuplicateResponse),
    }
}

/// Responses to a letter, visible to its author only.
pub async fn replies_for_author(
    state: &AppState,
    letter_id: Uuid,
    device_hash: String,
) -> Result<Vec<ReplyResponse>, ApiError> {
    let replies = run_db(state, move |db| {
        match db.get_letter(letter_id)? {
            Some(letter) if letter.device_hash == device_hash => Ok(Some(db.list_replies(letter_id)?)),
            _ => Ok(None),
        }
    })
    .await?
    .ok_or(ApiError::NotFound("letter"))?;

    Ok(replies
        .into_iter()
        .map(|r| ReplyResponse {
            id: r.id,
            message_id: r.letter_id,
            content: r.content,
            created_at: r.created_at,
        })
        .collect())
}

// -- Handlers --

pub async fn post_letter(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<CreateLetterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = device_hash(&state.settings.device_hash_salt, device.id);
    let letter = create_letter(&state, hash, &req.content).await?;
    Ok((StatusCode::CREATED, Json(to_response(letter))))
}

pub async fn random_letter(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = device_hash(&state.settings.device_hash_salt, device.id);
    let letter = pick_random_approved(&state, hash).await?;
    Ok(Json(RandomLetterResponse {
        letter: letter.map(to_response),
    }))
}

pub async fn post_response(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<CreateReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = device_hash(&state.settings.device_hash_salt, device.id);
    let reply = respond(&state, req.message_id, hash, &req.content).await?;
    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn letter_responses(
    State(state): State<AppState>,
    ApiPath(letter_id): ApiPath<Uuid>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let hash = device_hash(&state.settings.device_hash_salt, device.id);
    let replies = replies_for_author(&state, letter_id, hash).await?;
    Ok(Json(replies))
}
