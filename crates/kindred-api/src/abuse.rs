use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{SubsecRound, Utc};
use tracing::info;
use uuid::Uuid;

use kindred_types::api::{BlockRequest, BlockResponse, ReportRequest, ReportResponse};

use crate::error::{ApiError, ApiJson};
use crate::middleware::Device;
use crate::state::{AppState, run_db};

const REASON_MAX_CHARS: usize = 500;

/// File a report against another member of a circle the reporter is in.
/// Repeated reports are all kept.
pub async fn report(
    state: &AppState,
    reporter_id: Uuid,
    target_id: Uuid,
    circle_id: Uuid,
    reason: &str,
) -> Result<Uuid, ApiError> {
    if reporter_id == target_id {
        return Err(ApiError::SelfReport);
    }

    let reason = reason.trim().to_string();
    if reason.is_empty() || reason.chars().count() > REASON_MAX_CHARS {
        return Err(ApiError::InvalidPayload(format!(
            "reason must be 1 to {} characters",
            REASON_MAX_CHARS
        )));
    }

    let (is_member, target_exists) = run_db(state, move |db| {
        Ok((db.is_member(circle_id, reporter_id)?, db.device_exists(target_id)?))
    })
    .await?;

    if !is_member {
        return Err(ApiError::NotAllowed);
    }
    if !target_exists {
        return Err(ApiError::NotFound("user"));
    }

    let id = Uuid::new_v4();
    let now = Utc::now().trunc_subsecs(6);
    run_db(state, move |db| db.insert_report(id, reporter_id, target_id, circle_id, &reason, now)).await?;
    info!("Report {} filed in circle {} against {}", id, circle_id, target_id);

    Ok(id)
}

/// Block another device. Blocking twice is a no-op; returns whether a new
/// block was recorded.
pub async fn block(state: &AppState, blocker_id: Uuid, target_id: Uuid) -> Result<bool, ApiError> {
    if blocker_id == target_id {
        return Err(ApiError::SelfBlock);
    }

    let now = Utc::now().trunc_subsecs(6);
    let created = run_db(state, move |db| {
        if !db.device_exists(target_id)? {
            return Ok(None);
        }
        Ok(Some(db.insert_block(blocker_id, target_id, now)?))
    })
    .await?
    .ok_or(ApiError::NotFound("user"))?;

    Ok(created)
}

// -- Handlers --

pub async fn post_report(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<ReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = report(&state, device.id, req.target_id, req.circle_id, &req.reason).await?;
    Ok((StatusCode::CREATED, Json(ReportResponse { id })))
}

pub async fn post_block(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<BlockRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = block(&state, device.id, req.target_id).await?;
    Ok(Json(BlockResponse {
        target_id: req.target_id,
        created,
    }))
}
