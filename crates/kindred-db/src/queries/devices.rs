use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::{OptionalExt, parsed};
use crate::Database;
use crate::models::encode_time;

impl Database {
    /// Insert the device if its token is unknown, then return the id stored
    /// for the token. `id` is only used when the row is created.
    pub fn upsert_device(&self, id: Uuid, token: &str, now: DateTime<Utc>) -> Result<Uuid> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO devices (id, token, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), token, encode_time(&now)),
            )?;
            query_device_id(conn, token)?.ok_or_else(|| anyhow::anyhow!("device vanished after upsert"))
        })
    }

    pub fn device_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM devices WHERE id = ?1", [id.to_string()], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Remove a device and everything it owns. Memberships, messages,
    /// reactions, reports and blocks cascade through foreign keys; letter-flow
    /// rows are keyed by `device_hash` and removed explicitly.
    pub fn delete_device(&self, id: Uuid, device_hash: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM responses WHERE device_hash = ?1", [device_hash])?;
            tx.execute("DELETE FROM letters WHERE device_hash = ?1", [device_hash])?;
            let deleted = tx.execute("DELETE FROM devices WHERE id = ?1", [id.to_string()])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }
}

fn query_device_id(conn: &Connection, token: &str) -> Result<Option<Uuid>> {
    conn.query_row("SELECT id FROM devices WHERE token = ?1", [token], |row| parsed(row, 0))
        .optional()
}
