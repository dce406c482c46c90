use anyhow::Result;
use chrono::{DateTime, Utc};
use kindred_types::models::MembershipStatus;
use rusqlite::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use super::{OptionalExt, is_constraint_violation, parsed, parsed_opt};
use crate::Database;
use crate::models::{
    CircleRow, CreateOutcome, JoinOutcome, MatchLookup, MembershipRow, encode_time,
};

const CIRCLE_COLUMNS: &str = "id, mood, interest, capacity, generation, status, started_at, expires_at, member_count";

impl Database {
    // -- Matching --

    /// Least-populated joinable circle for the pair, oldest first on ties.
    pub fn find_open_circle(
        &self,
        mood: &str,
        interest: &str,
        now: DateTime<Utc>,
    ) -> Result<MatchLookup> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CIRCLE_COLUMNS} FROM circle_overview
                 WHERE mood = ?1 AND interest = ?2
                   AND status = 'active' AND expires_at > ?3
                   AND member_count < capacity
                 ORDER BY member_count ASC, started_at ASC, seq ASC
                 LIMIT 1"
            );
            let open = conn
                .query_row(&sql, (mood, interest, encode_time(&now)), circle_from_row)
                .optional()?;

            if let Some(circle) = open {
                return Ok(MatchLookup::Open(circle));
            }

            let latest: i64 = conn.query_row(
                "SELECT COALESCE(MAX(generation), 0) FROM circles WHERE mood = ?1 AND interest = ?2",
                (mood, interest),
                |row| row.get(0),
            )?;
            Ok(MatchLookup::Empty { next_generation: latest + 1 })
        })
    }

    pub fn create_circle(
        &self,
        id: Uuid,
        mood: &str,
        interest: &str,
        capacity: u32,
        generation: i64,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO circles (id, mood, interest, capacity, generation, status, started_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?7)",
                (
                    id.to_string(),
                    mood,
                    interest,
                    capacity,
                    generation,
                    encode_time(&started_at),
                    encode_time(&expires_at),
                ),
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => {
                    debug!("Generation {} for {}/{} already taken", generation, mood, interest);
                    return Ok(CreateOutcome::Conflict);
                }
                Err(e) => return Err(e.into()),
            }

            let circle = query_circle(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("circle {} vanished after insert", id))?;
            Ok(CreateOutcome::Created(circle))
        })
    }

    pub fn get_circle(&self, id: Uuid) -> Result<Option<CircleRow>> {
        self.with_conn(|conn| query_circle(conn, id))
    }

    // -- Membership ledger --

    /// Join in one transaction: re-check the circle, move the device out of
    /// any other active circle, then insert or reactivate the membership row.
    pub fn join_circle(&self, circle_id: Uuid, device_id: Uuid, now: DateTime<Utc>) -> Result<JoinOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let circle = match query_circle(&tx, circle_id)? {
                Some(c) if c.is_open(now) => c,
                _ => return Ok(JoinOutcome::Closed),
            };

            let current = query_active_membership(&tx, device_id)?;
            if current.as_ref().is_some_and(|m| m.circle_id == circle_id) {
                return Ok(JoinOutcome::AlreadyMember);
            }

            if circle.member_count >= circle.capacity {
                return Ok(JoinOutcome::Full);
            }

            let now_text = encode_time(&now);
            tx.execute(
                "UPDATE memberships SET status = 'left', left_at = ?2
                 WHERE device_id = ?1 AND status = 'active'",
                (device_id.to_string(), &now_text),
            )?;
            tx.execute(
                "INSERT INTO memberships (circle_id, device_id, status, joined_at, left_at)
                 VALUES (?1, ?2, 'active', ?3, NULL)
                 ON CONFLICT(circle_id, device_id) DO UPDATE
                 SET status = 'active', joined_at = excluded.joined_at, left_at = NULL",
                (circle_id.to_string(), device_id.to_string(), &now_text),
            )?;

            tx.commit()?;
            Ok(JoinOutcome::Joined { left_circle: current.map(|m| m.circle_id) })
        })
    }

    /// Mark the device's active membership as left. Returns the circle it
    /// left, or `None` when there was nothing to leave.
    pub fn leave_circle(&self, device_id: Uuid, now: DateTime<Utc>) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let Some(membership) = query_active_membership(conn, device_id)? else {
                return Ok(None);
            };

            conn.execute(
                "UPDATE memberships SET status = 'left', left_at = ?3
                 WHERE circle_id = ?1 AND device_id = ?2 AND status = 'active'",
                (
                    membership.circle_id.to_string(),
                    device_id.to_string(),
                    encode_time(&now),
                ),
            )?;
            Ok(Some(membership.circle_id))
        })
    }

    pub fn is_member(&self, circle_id: Uuid, device_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM memberships
                     WHERE circle_id = ?1 AND device_id = ?2 AND status = 'active'",
                    (circle_id.to_string(), device_id.to_string()),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    #[cfg(test)]
    pub(crate) fn get_membership(&self, circle_id: Uuid, device_id: Uuid) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT circle_id, device_id, status, joined_at, left_at FROM memberships
                 WHERE circle_id = ?1 AND device_id = ?2",
                (circle_id.to_string(), device_id.to_string()),
                membership_from_row,
            )
            .optional()
        })
    }

    /// Circle of the device's active membership, whatever its state.
    pub fn current_circle(&self, device_id: Uuid) -> Result<Option<CircleRow>> {
        self.with_conn(|conn| {
            let Some(membership) = query_active_membership(conn, device_id)? else {
                return Ok(None);
            };
            query_circle(conn, membership.circle_id)
        })
    }

    // -- Expiry --

    pub fn archive_circle(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE circles SET status = 'archived' WHERE id = ?1 AND status = 'active'",
                [id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Archive every active circle whose window has closed.
    pub fn archive_expired_circles(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE circles SET status = 'archived' WHERE status = 'active' AND expires_at <= ?1",
                [encode_time(&now)],
            )?;
            Ok(changed)
        })
    }
}

fn circle_from_row(row: &Row<'_>) -> rusqlite::Result<CircleRow> {
    Ok(CircleRow {
        id: parsed(row, 0)?,
        mood: row.get(1)?,
        interest: row.get(2)?,
        capacity: row.get(3)?,
        generation: row.get(4)?,
        status: parsed(row, 5)?,
        started_at: parsed(row, 6)?,
        expires_at: parsed(row, 7)?,
        member_count: row.get(8)?,
    })
}

fn membership_from_row(row: &Row<'_>) -> rusqlite::Result<MembershipRow> {
    Ok(MembershipRow {
        circle_id: parsed(row, 0)?,
        device_id: parsed(row, 1)?,
        status: parsed(row, 2)?,
        joined_at: parsed(row, 3)?,
        left_at: parsed_opt(row, 4)?,
    })
}

fn query_circle(conn: &Connection, id: Uuid) -> Result<Option<CircleRow>> {
    let sql = format!("SELECT {CIRCLE_COLUMNS} FROM circle_overview WHERE id = ?1");
    conn.query_row(&sql, [id.to_string()], circle_from_row).optional()
}

fn query_active_membership(conn: &Connection, device_id: Uuid) -> Result<Option<MembershipRow>> {
    conn.query_row(
        "SELECT circle_id, device_id, status, joined_at, left_at FROM memberships
         WHERE device_id = ?1 AND status = ?2
         ORDER BY joined_at DESC
         LIMIT 1",
        (device_id.to_string(), MembershipStatus::Active.as_str()),
        membership_from_row,
    )
    .optional()
}
