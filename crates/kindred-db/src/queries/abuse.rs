use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::Database;
use crate::models::encode_time;

impl Database {
    /// Duplicate reports are kept.
    pub fn insert_report(
        &self,
        id: Uuid,
        reporter_id: Uuid,
        target_id: Uuid,
        circle_id: Uuid,
        reason: &str,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, reporter_id, target_id, circle_id, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                (
                    id.to_string(),
                    reporter_id.to_string(),
                    target_id.to_string(),
                    circle_id.to_string(),
                    reason,
                    encode_time(&created_at),
                ),
            )?;
            Ok(())
        })
    }

    /// Returns false if the block already existed.
    pub fn insert_block(&self, blocker_id: Uuid, target_id: Uuid, created_at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, target_id, created_at) VALUES (?1, ?2, ?3)",
                (blocker_id.to_string(), target_id.to_string(), encode_time(&created_at)),
            )?;
            Ok(inserted > 0)
        })
    }

    #[cfg(test)]
    pub(crate) fn is_blocked(&self, blocker_id: Uuid, target_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM blocks WHERE blocker_id = ?1 AND target_id = ?2",
                (blocker_id.to_string(), target_id.to_string()),
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }
}
