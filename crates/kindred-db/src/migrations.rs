use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE devices (
                id          TEXT PRIMARY KEY,
                token       TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            -- (mood, interest, generation) rejects a second creator that
            -- raced past the same empty search.
            CREATE TABLE circles (
                id          TEXT PRIMARY KEY,
                mood        TEXT NOT NULL,
                interest    TEXT NOT NULL,
                capacity    INTEGER NOT NULL,
                generation  INTEGER NOT NULL,
                status      TEXT NOT NULL DEFAULT 'active',
                started_at  TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                UNIQUE(mood, interest, generation)
            );

            CREATE INDEX idx_circles_match
                ON circles(mood, interest, status, expires_at);

            CREATE TABLE memberships (
                circle_id   TEXT NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
                device_id   TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'active',
                joined_at   TEXT NOT NULL,
                left_at     TEXT,
                PRIMARY KEY (circle_id, device_id)
            );

            -- Single active circle per device.
            CREATE UNIQUE INDEX idx_memberships_one_active
                ON memberships(device_id) WHERE status = 'active';

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                circle_id   TEXT NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
                device_id   TEXT REFERENCES devices(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                is_system   INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_circle
                ON messages(circle_id, created_at);

            CREATE INDEX idx_messages_quota
                ON messages(device_id, circle_id, created_at);

            CREATE TABLE reactions (
                id          TEXT PRIMARY KEY,
                message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                device_id   TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_reactions_message
                ON reactions(message_id);

            CREATE TABLE reports (
                id          TEXT PRIMARY KEY,
                reporter_id TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                target_id   TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                circle_id   TEXT NOT NULL REFERENCES circles(id) ON DELETE CASCADE,
                reason      TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE blocks (
                blocker_id  TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                target_id   TEXT NOT NULL REFERENCES devices(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (blocker_id, target_id)
            );

            CREATE TABLE letters (
                id          TEXT PRIMARY KEY,
                content     TEXT NOT NULL,
                device_hash TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'PENDING',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_letters_status
                ON letters(status, created_at);

            CREATE TABLE responses (
                id          TEXT PRIMARY KEY,
                letter_id   TEXT NOT NULL REFERENCES letters(id) ON DELETE CASCADE,
                device_hash TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                UNIQUE(letter_id, device_hash)
            );

            CREATE VIEW circle_overview AS
                SELECT c.id, c.mood, c.interest, c.capacity, c.generation, c.status,
                       c.started_at, c.expires_at,
                       (SELECT COUNT(*) FROM memberships m
                         WHERE m.circle_id = c.id AND m.status = 'active') AS member_count,
                       c.rowid AS seq
                FROM circles c;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
