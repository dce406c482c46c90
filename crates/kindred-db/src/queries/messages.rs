use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::Row;
use uuid::Uuid;

use super::{OptionalExt, parsed, parsed_opt};
use crate::Database;
use crate::models::{MessageRow, ReactionCountRow, encode_time};

impl Database {
    // -- Messages --

    /// Append a message and return the timestamp it was stored with.
    ///
    /// Stored timestamps are strictly increasing per circle: a `created_at`
    /// at or before the circle's latest message is moved one microsecond past
    /// it. A reader paging with `since` therefore never misses a message
    /// committed after its last listing.
    pub fn insert_message(
        &self,
        id: Uuid,
        circle_id: Uuid,
        device_id: Option<Uuid>,
        content: &str,
        is_system: bool,
        created_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let latest: Option<DateTime<Utc>> = conn.query_row(
                "SELECT MAX(created_at) FROM messages WHERE circle_id = ?1",
                [circle_id.to_string()],
                |row| parsed_opt(row, 0),
            )?;
            let created_at = match latest {
                Some(latest) if latest >= created_at => latest + Duration::microseconds(1),
                _ => created_at,
            };

            conn.execute(
                "INSERT INTO messages (id, circle_id, device_id, content, is_system, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    id.to_string(),
                    circle_id.to_string(),
                    device_id.map(|d| d.to_string()),
                    content,
                    is_system,
                    encode_time(&created_at),
                ),
            )?;
            Ok(created_at)
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, circle_id, device_id, content, is_system, created_at
                 FROM messages WHERE id = ?1",
                [id.to_string()],
                message_from_row,
            )
            .optional()
        })
    }

    /// Non-system messages sent by the device in the circle within `[start, end)`.
    pub fn count_messages_between(
        &self,
        circle_id: Uuid,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE device_id = ?1 AND circle_id = ?2 AND is_system = 0
                   AND created_at >= ?3 AND created_at < ?4",
                (
                    device_id.to_string(),
                    circle_id.to_string(),
                    encode_time(&start),
                    encode_time(&end),
                ),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Messages of a circle in ascending order, hiding authors the viewer
    /// blocked. With `since`, the first `limit` messages strictly newer than
    /// it; without, the latest `limit` messages.
    pub fn list_messages(
        &self,
        circle_id: Uuid,
        viewer_id: Uuid,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let visible = "circle_id = ?1
                AND (device_id IS NULL
                     OR device_id NOT IN (SELECT target_id FROM blocks WHERE blocker_id = ?2))";

            let rows = match since {
                Some(since) => {
                    let sql = format!(
                        "SELECT id, circle_id, device_id, content, is_system, created_at
                         FROM messages
                         WHERE {visible} AND created_at > ?3
                         ORDER BY created_at ASC, rowid ASC
                         LIMIT ?4"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(
                        (circle_id.to_string(), viewer_id.to_string(), encode_time(&since), limit),
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!(
                        "SELECT id, circle_id, device_id, content, is_system, created_at FROM (
                             SELECT id, circle_id, device_id, content, is_system, created_at, rowid AS seq
                             FROM messages
                             WHERE {visible}
                             ORDER BY created_at DESC, rowid DESC
                             LIMIT ?3
                         )
                         ORDER BY created_at ASC, seq ASC"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(
                        (circle_id.to_string(), viewer_id.to_string(), limit),
                        message_from_row,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            Ok(rows)
        })
    }

    // -- Reactions --

    /// Append a reaction row. Repeats are kept and counted.
    pub fn insert_reaction(
        &self,
        id: Uuid,
        message_id: Uuid,
        device_id: Uuid,
        emoji: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reactions (id, message_id, device_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    message_id.to_string(),
                    device_id.to_string(),
                    emoji,
                    encode_time(&created_at),
                ),
            )?;
            Ok(())
        })
    }

    /// Batch-fetch reaction totals grouped by (message, emoji), in order of
    /// first use.
    pub fn reaction_counts(&self, message_ids: &[Uuid]) -> Result<Vec<ReactionCountRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, emoji, COUNT(*) FROM reactions
                 WHERE message_id IN ({})
                 GROUP BY message_id, emoji
                 ORDER BY message_id, MIN(rowid)",
                placeholders.join(", ")
            );

            let ids: Vec<String> = message_ids.iter().map(Uuid::to_string).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                    Ok(ReactionCountRow {
                        message_id: parsed(row, 0)?,
                        emoji: row.get(1)?,
                        count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: parsed(row, 0)?,
        circle_id: parsed(row, 1)?,
        device_id: parsed_opt(row, 2)?,
        content: row.get(3)?,
        is_system: row.get(4)?,
        created_at: parsed(row, 5)?,
    })
}
