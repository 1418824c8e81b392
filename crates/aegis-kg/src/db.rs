use rusqlite::{Connection, Result};

/// Initialise the bi-temporal schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_entities_table(conn)?;
    create_relationships_table(conn)?;
    Ok(())
}

fn create_entities_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS entities (
            id          TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            valid_from  TEXT NOT NULL,
            valid_to    TEXT,
            tx_from     TEXT NOT NULL,
            tx_to       TEXT,
            data        TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_entities_type
            ON entities(entity_type);
        CREATE INDEX IF NOT EXISTS idx_entities_valid_time
            ON entities(valid_from, valid_to);
        CREATE INDEX IF NOT EXISTS idx_entities_tx_time
            ON entities(tx_from, tx_to);
        CREATE INDEX IF NOT EXISTS idx_entities_id
            ON entities(id);",
    )
}

fn create_relationships_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS relationships (
            id          TEXT PRIMARY KEY,
            rel_type    TEXT NOT NULL,
            source_id   TEXT NOT NULL,
            target_id   TEXT NOT NULL,
            valid_from  TEXT NOT NULL,
            valid_to    TEXT,
            tx_from     TEXT NOT NULL,
            tx_to       TEXT,
            properties  TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_relationships_type
            ON relationships(rel_type);
        CREATE INDEX IF NOT EXISTS idx_relationships_source
            ON relationships(source_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_target
            ON relationships(target_id);
        CREATE INDEX IF NOT EXISTS idx_relationships_valid_time
            ON relationships(valid_from, valid_to);
        CREATE INDEX IF NOT EXISTS idx_relationships_tx_time
            ON relationships(tx_from, tx_to);",
    )
}
