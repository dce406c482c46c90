use anyhow::Result;
use chrono::{DateTime, Utc};
use kindred_types::models::LetterStatus;
use rusqlite::Row;
use uuid::Uuid;

use super::{OptionalExt, is_constraint_violation, parsed};
use crate::Database;
use crate::models::{LetterRow, ReplyOutcome, ReplyRow, encode_time};

/// Approved, not written by the reader, not yet answered by the reader.
const ELIGIBLE: &str = "l.status = 'APPROVED'
    AND l.device_hash != ?1
    AND NOT EXISTS (
        SELECT 1 FROM responses r WHERE r.letter_id = l.id AND r.device_hash = ?1
    )";

impl Database {
    // -- Letters --

    /// Store a new letter as `PENDING`.
    pub fn insert_letter(
        &self,
        id: Uuid,
        content: &str,
        device_hash: &str,
        created_at: DateTime<Utc>,
    ) -> Result<LetterRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO letters (id, content, device_hash, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    content,
                    device_hash,
                    LetterStatus::Pending.as_str(),
                    encode_time(&created_at),
                ),
            )?;
            Ok(LetterRow {
                id,
                content: content.to_string(),
                device_hash: device_hash.to_string(),
                status: LetterStatus::Pending,
                created_at,
            })
        })
    }

    /// Move a `PENDING` letter to a terminal status. Returns false when the
    /// letter is unknown or already resolved.
    pub fn resolve_letter(&self, id: Uuid, status: LetterStatus) -> Result<bool> {
        if !status.is_terminal() {
            anyhow::bail!("cannot resolve letter {} to {}", id, status);
        }

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE letters SET status = ?2 WHERE id = ?1 AND status = 'PENDING'",
                (id.to_string(), status.as_str()),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_letter(&self, id: Uuid) -> Result<Option<LetterRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, content, device_hash, status, created_at FROM letters WHERE id = ?1",
                [id.to_string()],
                letter_from_row,
            )
            .optional()
        })
    }

    pub fn count_eligible_letters(&self, device_hash: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM letters l WHERE {ELIGIBLE}");
            let count: i64 = conn.query_row(&sql, [device_hash], |row| row.get(0))?;
            Ok(count)
        })
    }

    /// The eligible letter at `offset` in a stable order.
    pub fn eligible_letter_at(&self, device_hash: &str, offset: i64) -> Result<Option<LetterRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT l.id, l.content, l.device_hash, l.status, l.created_at
                 FROM letters l
                 WHERE {ELIGIBLE}
                 ORDER BY l.created_at ASC, l.rowid ASC
                 LIMIT 1 OFFSET ?2"
            );
            conn.query_row(&sql, (device_hash, offset), letter_from_row).optional()
        })
    }

    // -- Responses --

    pub fn has_reply(&self, letter_id: Uuid, device_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM responses WHERE letter_id = ?1 AND device_hash = ?2",
                    (letter_id.to_string(), device_hash),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn insert_reply(
        &self,
        id: Uuid,
        letter_id: Uuid,
        device_hash: &str,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ReplyOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO responses (id, letter_id, device_hash, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    id.to_string(),
                    letter_id.to_string(),
                    device_hash,
                    content,
                    encode_time(&created_at),
                ),
            );

            match inserted {
                Ok(_) => Ok(ReplyOutcome::Inserted),
                Err(e) if is_constraint_violation(&e) => Ok(ReplyOutcome::Duplicate),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn list_replies(&self, letter_id: Uuid) -> Result<Vec<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, letter_id, device_hash, content, created_at FROM responses
                 WHERE letter_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([letter_id.to_string()], |row| {
                    Ok(ReplyRow {
                        id: parsed(row, 0)?,
                        letter_id: parsed(row, 1)?,
                        device_hash: row.get(2)?,
                        content: row.get(3)?,
                        created_at: parsed(row, 4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn letter_from_row(row: &Row<'_>) -> rusqlite::Result<LetterRow> {
    Ok(LetterRow {
        id: parsed(row, 0)?,
        content: row.get(1)?,
        device_hash: row.get(2)?,
        status: parsed(row, 3)?,
        created_at: parsed(row, 4)?,
    })
}
