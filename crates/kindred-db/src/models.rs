//! Database row types, decoded from SQLite rows.
//! Distinct from kindred-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};
use kindred_types::models::{CircleStatus, LetterStatus, MembershipStatus};
use uuid::Uuid;

/// Timestamps are stored as fixed-width UTC text so that string comparison
/// in SQL matches chronological order.
pub fn encode_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[derive(Debug, Clone)]
pub struct CircleRow {
    pub id: Uuid,
    pub mood: String,
    pub interest: String,
    pub capacity: u32,
    pub generation: i64,
    pub status: CircleStatus,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub member_count: u32,
}

impl CircleRow {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == CircleStatus::Active && now < self.expires_at
    }

    /// A circle accepts new members only while open and below capacity.
    pub fn is_joinable(&self, now: DateTime<Utc>) -> bool {
        self.is_open(now) && self.member_count < self.capacity
    }
}

pub struct MembershipRow {
    pub circle_id: Uuid,
    pub device_id: Uuid,
    pub status: MembershipStatus,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub circle_id: Uuid,
    pub device_id: Option<Uuid>,
    pub content: String,
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

pub struct ReactionCountRow {
    pub message_id: Uuid,
    pub emoji: String,
    pub count: u32,
}

#[derive(Debug, Clone)]
pub struct LetterRow {
    pub id: Uuid,
    pub content: String,
    pub device_hash: String,
    pub status: LetterStatus,
    pub created_at: DateTime<Utc>,
}

pub struct ReplyRow {
    pub id: Uuid,
    pub letter_id: Uuid,
    pub device_hash: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Result of looking for a circle to join.
pub enum MatchLookup {
    Open(CircleRow),
    /// Nothing joinable; a new circle should use this generation.
    Empty { next_generation: i64 },
}

pub enum CreateOutcome {
    Created(CircleRow),
    /// Another creator already took this generation.
    Conflict,
}

pub enum JoinOutcome {
    /// Joined; carries the circle the device was moved out of, if any.
    Joined { left_circle: Option<Uuid> },
    AlreadyMember,
    Full,
    Closed,
}

pub enum ReplyOutcome {
    Inserted,
    Duplicate,
}
