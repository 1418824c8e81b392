use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`.
///
/// Creates the `units` table (idempotent), an index on `next_run` for
/// startup reporting, and the `cache_entries` table backing the scheduler's
/// persistent keyed cache (spec §4.G "Cache").
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS units (
            id          TEXT    NOT NULL PRIMARY KEY,
            name        TEXT    NOT NULL UNIQUE,
            body        TEXT    NOT NULL,
            cadence     TEXT    NOT NULL,   -- JSON-encoded Cadence enum
            enabled     INTEGER NOT NULL DEFAULT 1,
            notify      INTEGER NOT NULL DEFAULT 0,
            channels    TEXT    NOT NULL DEFAULT '[]',   -- JSON array
            arguments   TEXT    NOT NULL DEFAULT 'null', -- JSON value
            conditions  TEXT,
            max_turns   INTEGER,
            status      TEXT    NOT NULL DEFAULT 'enabled',
            last_run    TEXT,
            next_run    TEXT,
            run_count   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_units_next_run ON units (next_run);

        -- wrote_at_monotonic_ms/epoch_id are only meaningful within the
        -- process that wrote them; a mismatched epoch_id on read falls back
        -- to wall-clock comparison against wrote_at_wall (spec: 'older
        -- entries using only wall-clock time are still honored').
        CREATE TABLE IF NOT EXISTS cache_entries (
            key                  TEXT    NOT NULL PRIMARY KEY,
            payload              TEXT    NOT NULL,
            wrote_at_epoch_id    TEXT    NOT NULL,
            wrote_at_monotonic_ms INTEGER NOT NULL,
            wrote_at_wall        TEXT    NOT NULL,
            ttl_seconds          INTEGER NOT NULL
        ) STRICT;

        -- One-shot future actions enqueued by the schedule-action tools
        -- (spec §4.E), distinct from the recurring `units` table.
        CREATE TABLE IF NOT EXISTS oneshot_actions (
            id          TEXT    NOT NULL PRIMARY KEY,
            fire_at     TEXT    NOT NULL,
            body        TEXT    NOT NULL,
            delivered   INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_oneshot_fire_at ON oneshot_actions (fire_at);
        ",
    )?;
    Ok(())
}
