use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{MessageResponse, ReactionGroup};

const CIRCLE_CHANNEL_PREFIX: &str = "circle:";

/// Realtime channel name for a circle.
pub fn circle_channel(circle_id: Uuid) -> String {
    format!("{}{}", CIRCLE_CHANNEL_PREFIX, circle_id)
}

/// Inverse of [`circle_channel`].
pub fn parse_circle_channel(channel: &str) -> Option<Uuid> {
    channel
        .strip_prefix(CIRCLE_CHANNEL_PREFIX)
        .and_then(|id| id.parse().ok())
}

/// Events pushed to viewers of a circle. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CircleEvent {
    /// A message (member or system) was appended
    NewMessage(MessageResponse),

    /// A member is typing; viewers drop the indicator after `expires_in_ms`
    Typing {
        circle_id: Uuid,
        device_id: Uuid,
        display_name: String,
        expires_in_ms: u64,
    },

    /// A reaction row was recorded; `reactions` holds the new totals
    MessageReaction {
        circle_id: Uuid,
        message_id: Uuid,
        device_id: Uuid,
        emoji: String,
        reactions: Vec<ReactionGroup>,
    },

    /// A device's active membership ended (leave, move to another circle,
    /// reset). Streams held by that device close on it; it is not
    /// forwarded to viewers.
    MemberLeft { circle_id: Uuid, device_id: Uuid },
}

impl CircleEvent {
    /// Wire name used for the server-sent event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "new-message",
            Self::Typing { .. } => "typing",
            Self::MessageReaction { .. } => "message-reaction",
            Self::MemberLeft { .. } => "member-left",
        }
    }

    pub fn circle_id(&self) -> Uuid {
        match self {
            Self::NewMessage(message) => message.circle_id,
            Self::Typing { circle_id, .. } => *circle_id,
            Self::MessageReaction { circle_id, .. } => *circle_id,
            Self::MemberLeft { circle_id, .. } => *circle_id,
        }
    }

    /// JSON payload without the enum envelope.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        Ok(value["data"].take())
    }
}
