use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CircleStatus, LetterStatus};

// -- Errors --

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaSnapshot>,
}

// -- Circles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinCircleRequest {
    pub mood: String,
    pub interest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleResponse {
    pub id: Uuid,
    pub mood: String,
    pub interest: String,
    pub capacity: u32,
    pub member_count: u32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CircleStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CurrentCircleResponse {
    pub circle: Option<CircleResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveResponse {
    pub left: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub circle_id: Uuid,
    /// `None` for system messages.
    pub device_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub content: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
    pub reactions: Vec<ReactionGroup>,
}

/// Per-device daily send allowance in one circle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub message: MessageResponse,
    pub quota: QuotaSnapshot,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReactionResponse {
    pub message_id: Uuid,
    pub reactions: Vec<ReactionGroup>,
}

// -- Abuse --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub target_id: Uuid,
    pub circle_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockRequest {
    pub target_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BlockResponse {
    pub target_id: Uuid,
    /// False when the target was already blocked.
    pub created: bool,
}

// -- Letters --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLetterRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LetterResponse {
    pub id: Uuid,
    pub content: String,
    pub status: LetterStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RandomLetterResponse {
    pub letter: Option<LetterResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateReplyRequest {
    pub message_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyResponse {
    pub id: Uuid,
    pub message_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// -- Device --

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub reset: bool,
}
