use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::{SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use kindred_db::models::{CircleRow, CreateOutcome, JoinOutcome, MatchLookup};
use kindred_types::api::{CircleResponse, CurrentCircleResponse, JoinCircleRequest, LeaveResponse};
use kindred_types::events::CircleEvent;
use kindred_types::models::CircleStatus;

use crate::error::{ApiError, ApiJson};
use crate::messages::announce;
use crate::middleware::Device;
use crate::state::{AppState, run_db};

/// Find-then-join is not atomic; one retry absorbs the usual race.
const JOIN_ATTEMPTS: u32 = 2;
const TAG_MAX_CHARS: usize = 32;

const JOINED_NOTICE: &str = "A new voice joined the circle.";
const LEFT_NOTICE: &str = "A voice left the circle.";

/// Moods and interests match case-insensitively.
pub fn normalize_tag(field: &str, raw: &str) -> Result<String, ApiError> {
    let tag = raw.trim().to_lowercase();
    if tag.is_empty() || tag.chars().count() > TAG_MAX_CHARS {
        return Err(ApiError::InvalidPayload(format!(
            "{} must be 1 to {} characters",
            field, TAG_MAX_CHARS
        )));
    }
    Ok(tag)
}

pub fn to_response(circle: CircleRow) -> CircleResponse {
    CircleResponse {
        id: circle.id,
        mood: circle.mood,
        interest: circle.interest,
        capacity: circle.capacity,
        member_count: circle.member_count,
        started_at: circle.started_at,
        expires_at: circle.expires_at,
        status: circle.status,
    }
}

struct Placement {
    circle: CircleRow,
    newly_joined: bool,
    left_circle: Option<Uuid>,
}

/// Put the device into a circle for (mood, interest): its current one if it
/// already sits in an open circle for the pair, otherwise the least-populated
/// joinable circle, otherwise a brand new one.
pub async fn join_or_create(
    state: &AppState,
    device_id: Uuid,
    mood: &str,
    interest: &str,
) -> Result<CircleRow, ApiError> {
    let mood = normalize_tag("mood", mood)?;
    let interest = normalize_tag("interest", interest)?;

    for attempt in 1..=JOIN_ATTEMPTS {
        if let Some(placement) = try_place(state, device_id, &mood, &interest).await? {
            if let Some(previous) = placement.left_circle {
                depart(state, previous, device_id).await?;
            }
            if placement.newly_joined {
                info!(
                    "Device {} joined circle {} ({}/{}, {} members)",
                    device_id, placement.circle.id, mood, interest, placement.circle.member_count
                );
                announce(state, placement.circle.id, JOINED_NOTICE).await?;
            }
            return Ok(placement.circle);
        }

        if attempt < JOIN_ATTEMPTS {
            warn!("Join race on {}/{} for device {}, retrying", mood, interest, device_id);
        }
    }

    Err(ApiError::CircleFull)
}

/// One find-or-create-then-join pass. `None` means we lost a race.
async fn try_place(
    state: &AppState,
    device_id: Uuid,
    mood: &str,
    interest: &str,
) -> Result<Option<Placement>, ApiError> {
    let now = Utc::now().trunc_subsecs(6);

    let current = run_db(state, move |db| db.current_circle(device_id)).await?;
    if let Some(circle) = current {
        if circle.mood == mood && circle.interest == interest && circle.is_open(now) {
            return Ok(Some(Placement {
                circle,
                newly_joined: false,
                left_circle: None,
            }));
        }
    }

    let (m, i) = (mood.to_string(), interest.to_string());
    let lookup = run_db(state, move |db| db.find_open_circle(&m, &i, now)).await?;

    let circle = match lookup {
        MatchLookup::Open(circle) => circle,
        MatchLookup::Empty { next_generation } => {
            let id = Uuid::new_v4();
            let capacity = state.settings.circle_capacity;
            let expires_at = now
                .checked_add_signed(state.settings.circle_ttl)
                .ok_or_else(|| anyhow::anyhow!("circle TTL {} overflows", state.settings.circle_ttl))?;
            let (m, i) = (mood.to_string(), interest.to_string());
            let created = run_db(state, move |db| {
                db.create_circle(id, &m, &i, capacity, next_generation, now, expires_at)
            })
            .await?;

            match created {
                CreateOutcome::Created(circle) => {
                    info!("Created circle {} for {}/{} until {}", circle.id, mood, interest, expires_at);
                    circle
                }
                CreateOutcome::Conflict => return Ok(None),
            }
        }
    };

    let circle_id = circle.id;
    let (outcome, refreshed) = run_db(state, move |db| {
        let outcome = db.join_circle(circle_id, device_id, now)?;
        let refreshed = db.get_circle(circle_id)?;
        Ok((outcome, refreshed))
    })
    .await?;

    let circle = refreshed.unwrap_or(circle);
    let placement = match outcome {
        JoinOutcome::Joined { left_circle } => Placement {
            circle,
            newly_joined: true,
            left_circle,
        },
        JoinOutcome::AlreadyMember => Placement {
            circle,
            newly_joined: false,
            left_circle: None,
        },
        JoinOutcome::Full | JoinOutcome::Closed => return Ok(None),
    };

    Ok(Some(placement))
}

/// Close the device's streams on a circle it no longer belongs to, then tell
/// the remaining members.
async fn depart(state: &AppState, circle_id: Uuid, device_id: Uuid) -> Result<(), ApiError> {
    state.publish(CircleEvent::MemberLeft { circle_id, device_id });
    announce(state, circle_id, LEFT_NOTICE).await
}

/// Leave the device's active circle. Leaving nothing is fine.
pub async fn leave(state: &AppState, device_id: Uuid) -> Result<bool, ApiError> {
    let now = Utc::now().trunc_subsecs(6);
    let left = run_db(state, move |db| db.leave_circle(device_id, now)).await?;

    match left {
        Some(circle_id) => {
            info!("Device {} left circle {}", device_id, circle_id);
            depart(state, circle_id, device_id).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// The device's circle if it is still running. Expired circles found here
/// are archived on the spot.
pub async fn current(state: &AppState, device_id: Uuid) -> Result<Option<CircleRow>, ApiError> {
    let now = Utc::now();
    let circle = run_db(state, move |db| db.current_circle(device_id)).await?;

    match circle {
        Some(circle) if circle.is_open(now) => Ok(Some(circle)),
        Some(circle) => {
            if circle.status == CircleStatus::Active {
                let id = circle.id;
                if run_db(state, move |db| db.archive_circle(id)).await? {
                    info!("Archived expired circle {}", id);
                }
            }
            Ok(None)
        }
        None => Ok(None),
    }
}

// -- Handlers --

pub async fn join_circle(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    ApiJson(req): ApiJson<JoinCircleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let circle = join_or_create(&state, device.id, &req.mood, &req.interest).await?;
    Ok(Json(to_response(circle)))
}

pub async fn leave_circle(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let left = leave(&state, device.id).await?;
    Ok(Json(LeaveResponse { left }))
}

pub async fn current_circle(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
) -> Result<impl IntoResponse, ApiError> {
    let circle = current(&state, device.id).await?;
    Ok(Json(CurrentCircleResponse {
        circle: circle.map(to_response),
    }))
}
