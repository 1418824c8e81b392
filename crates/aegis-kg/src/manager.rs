use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::KgError;
use crate::types::{fmt_dt, fmt_opt_dt, Direction, Entity, KgStats, Relationship};

type Result<T> = std::result::Result<T, KgError>;

const ENTITY_COLUMNS: &str =
    "id, entity_type, valid_from, valid_to, tx_from, tx_to, data";
const REL_COLUMNS: &str =
    "id, rel_type, source_id, target_id, valid_from, valid_to, tx_from, tx_to, properties";

/// Owns the SQLite connection and implements the bi-temporal knowledge graph
/// (spec §4.B). All public operations take `&self` and serialize through an
/// internal mutex, mirroring the single-writer-connection shape used
/// throughout this codebase for SQLite-backed managers.
pub struct KnowledgeGraph {
    conn: Mutex<Connection>,
}

impl KnowledgeGraph {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record a new belief about `(entity_type, entity_id)`. If a current
    /// belief row (`tx_to IS NULL`) already exists for this key, it is closed
    /// (`tx_to = now`) before the new row is inserted — the graph never
    /// updates a row in place, it supersedes it.
    pub fn insert_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
        data: serde_json::Value,
    ) -> Result<Entity> {
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE entities SET tx_to = ?1
             WHERE id = ?2 AND entity_type = ?3 AND tx_to IS NULL",
            params![fmt_dt(now), entity_id, entity_type],
        )?;
        conn.execute(
            "INSERT INTO entities (id, entity_type, valid_from, valid_to, tx_from, tx_to, data)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            params![
                entity_id,
                entity_type,
                fmt_dt(valid_from),
                fmt_opt_dt(valid_to),
                fmt_dt(now),
                serde_json::to_string(&data).map_err(|e| KgError::Serialization(e.to_string()))?,
            ],
        )?;
        debug!(entity_type, entity_id, "inserted entity belief");
        Ok(Entity {
            id: entity_id.to_string(),
            entity_type: entity_type.to_string(),
            valid_from,
            valid_to,
            tx_from: now,
            tx_to: None,
            data,
        })
    }

    /// Close out the valid-time interval of the *current* belief for a key
    /// without changing the system's belief (no new tx row). Used when new
    /// information narrows how long a fact was true, rather than replacing
    /// the fact itself.
    pub fn update_entity_temporal_bounds(
        &self,
        entity_type: &str,
        entity_id: &str,
        valid_to: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE entities SET valid_to = ?1
             WHERE id = ?2 AND entity_type = ?3 AND tx_to IS NULL",
            params![fmt_dt(valid_to), entity_id, entity_type],
        )?;
        if changed == 0 {
            return Err(KgError::NotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn insert_relationship(
        &self,
        rel_type: &str,
        source_id: &str,
        target_id: &str,
        valid_from: DateTime<Utc>,
        valid_to: Option<DateTime<Utc>>,
        properties: serde_json::Value,
    ) -> Result<Relationship> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE relationships SET tx_to = ?1
             WHERE source_id = ?2 AND target_id = ?3 AND rel_type = ?4 AND tx_to IS NULL",
            params![fmt_dt(now), source_id, target_id, rel_type],
        )?;
        conn.execute(
            "INSERT INTO relationships
                (id, rel_type, source_id, target_id, valid_from, valid_to, tx_from, tx_to, properties)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
            params![
                id,
                rel_type,
                source_id,
                target_id,
                fmt_dt(valid_from),
                fmt_opt_dt(valid_to),
                fmt_dt(now),
                serde_json::to_string(&properties)
                    .map_err(|e| KgError::Serialization(e.to_string()))?,
            ],
        )?;
        Ok(Relationship {
            id,
            rel_type: rel_type.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            valid_from,
            valid_to,
            tx_from: now,
            tx_to: None,
            properties,
        })
    }

    /// "What did we believe, as of `as_of` transaction time?" — returns the
    /// row whose transaction interval contained `as_of`, regardless of
    /// whether it is still the current belief.
    pub fn query_as_of(
        &self,
        entity_type: &str,
        entity_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let as_of_s = fmt_dt(as_of);
        conn.query_row(
            &format!(
                "SELECT {ENTITY_COLUMNS} FROM entities
                 WHERE id = ?1 AND entity_type = ?2
                   AND tx_from <= ?3 AND (tx_to IS NULL OR tx_to > ?3)
                 ORDER BY tx_from DESC LIMIT 1"
            ),
            params![entity_id, entity_type, as_of_s],
            Entity::from_row,
        )
        .optional()
        .map_err(KgError::from)
    }

    /// "Was this fact true in the world at `valid_at`?" among rows the
    /// system currently believes (`tx_to IS NULL`).
    pub fn query_valid_at(
        &self,
        entity_type: &str,
        entity_id: &str,
        valid_at: DateTime<Utc>,
    ) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        let valid_at_s = fmt_dt(valid_at);
        conn.query_row(
            &format!(
                "SELECT {ENTITY_COLUMNS} FROM entities
                 WHERE id = ?1 AND entity_type = ?2 AND tx_to IS NULL
                   AND valid_from <= ?3 AND (valid_to IS NULL OR valid_to > ?3)
                 LIMIT 1"
            ),
            params![entity_id, entity_type, valid_at_s],
            Entity::from_row,
        )
        .optional()
        .map_err(KgError::from)
    }

    /// Current belief for a key, if any (`tx_to IS NULL`).
    pub fn get_current(&self, entity_type: &str, entity_id: &str) -> Result<Option<Entity>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {ENTITY_COLUMNS} FROM entities
                 WHERE id = ?1 AND entity_type = ?2 AND tx_to IS NULL LIMIT 1"
            ),
            params![entity_id, entity_type],
            Entity::from_row,
        )
        .optional()
        .map_err(KgError::from)
    }

    /// Entities reachable from `entity_id` via current relationships.
    pub fn get_related(
        &self,
        entity_id: &str,
        rel_type: Option<&str>,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        let conn = self.conn.lock().unwrap();
        let mut out = Vec::new();
        if matches!(direction, Direction::Outgoing | Direction::Both) {
            out.extend(query_rels(&conn, "source_id", entity_id, rel_type)?);
        }
        if matches!(direction, Direction::Incoming | Direction::Both) {
            out.extend(query_rels(&conn, "target_id", entity_id, rel_type)?);
        }
        Ok(out)
    }

    /// Substring search over each current entity's JSON `data` blob.
    pub fn search_knowledge(&self, query: &str, limit: i64) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE tx_to IS NULL AND data LIKE ?1 ESCAPE '\\'
             ORDER BY tx_from DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![pattern, limit], Entity::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Entities whose belief was recorded long after the fact became valid —
    /// `tx_from - valid_from > lag`. Surfaces things the assistant learned
    /// about "late".
    pub fn find_late_discoveries(&self, lag: Duration, limit: i64) -> Result<Vec<Entity>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE tx_to IS NULL ORDER BY tx_from DESC"
        ))?;
        let rows = stmt
            .query_map([], Entity::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|e| e.tx_from - e.valid_from > lag)
            .take(limit as usize)
            .collect())
    }

    /// Current beliefs recorded within the last `window`.
    pub fn what_changed_recently(&self, window: Duration, limit: i64) -> Result<Vec<Entity>> {
        let since = Utc::now() - window;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE tx_to IS NULL AND tx_from >= ?1
             ORDER BY tx_from DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![fmt_dt(since), limit], Entity::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn stats(&self) -> Result<KgStats> {
        let conn = self.conn.lock().unwrap();
        let total_entities: i64 =
            conn.query_row("SELECT COUNT(*) FROM entities WHERE tx_to IS NULL", [], |r| {
                r.get(0)
            })?;
        let total_relationships: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships WHERE tx_to IS NULL",
            [],
            |r| r.get(0),
        )?;
        let entities_by_type = group_counts(&conn, "entities", "entity_type")?;
        let relationships_by_type = group_counts(&conn, "relationships", "rel_type")?;
        info!(total_entities, total_relationships, "kg stats computed");
        Ok(KgStats {
            total_entities,
            entities_by_type,
            total_relationships,
            relationships_by_type,
        })
    }
}

fn query_rels(
    conn: &Connection,
    side: &str,
    entity_id: &str,
    rel_type: Option<&str>,
) -> Result<Vec<Relationship>> {
    let sql = match rel_type {
        Some(_) => format!(
            "SELECT {REL_COLUMNS} FROM relationships
             WHERE {side} = ?1 AND rel_type = ?2 AND tx_to IS NULL"
        ),
        None => format!(
            "SELECT {REL_COLUMNS} FROM relationships WHERE {side} = ?1 AND tx_to IS NULL"
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = match rel_type {
        Some(rt) => stmt
            .query_map(params![entity_id, rt], Relationship::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt
            .query_map(params![entity_id], Relationship::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(rows)
}

fn group_counts(conn: &Connection, table: &str, column: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {column}, COUNT(*) FROM {table} WHERE tx_to IS NULL GROUP BY {column}"
    ))?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kg() -> KnowledgeGraph {
        KnowledgeGraph::open_in_memory().unwrap()
    }

    #[test]
    fn insert_is_idempotent_on_read_back() {
        let kg = kg();
        let t = Utc::now();
        kg.insert_entity("job", "J", t, None, json!({"status": "failure"}))
            .unwrap();
        let current = kg.get_current("job", "J").unwrap().unwrap();
        assert_eq!(current.data["status"], "failure");

        // Re-inserting the same belief should still leave exactly one current row.
        kg.insert_entity("job", "J", t, None, json!({"status": "failure"}))
            .unwrap();
        let conn = kg.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE id='J' AND tx_to IS NULL",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn bitemporal_supersession_scenario() {
        let kg = kg();
        let t_valid = DateTime::parse_from_rfc3339("2026-07-30T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        kg.insert_entity("job", "J", t_valid, None, json!({"status": "failure"}))
            .unwrap();

        // supersede at 10:45 with a corrected belief
        {
            let conn = kg.conn.lock().unwrap();
            conn.execute(
                "UPDATE entities SET tx_from = ?1 WHERE id='J' AND tx_to IS NULL",
                params![fmt_dt(
                    DateTime::parse_from_rfc3339("2026-07-30T10:45:00Z")
                        .unwrap()
                        .with_timezone(&Utc)
                )],
            )
            .unwrap();
        }
        kg.insert_entity("job", "J", t_valid, None, json!({"status": "success"}))
            .unwrap();

        let as_of_11 = DateTime::parse_from_rfc3339("2026-07-30T11:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let as_of_result = kg.query_as_of("job", "J", as_of_11).unwrap().unwrap();
        assert_eq!(as_of_result.data["status"], "success");

        let valid_at_1030 = DateTime::parse_from_rfc3339("2026-07-30T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let valid_result = kg
            .query_valid_at("job", "J", valid_at_1030)
            .unwrap()
            .unwrap();
        assert_eq!(valid_result.data["status"], "success");
    }

    #[test]
    fn relationships_and_stats_roundtrip() {
        let kg = kg();
        let t = Utc::now();
        kg.insert_entity("person", "alice", t, None, json!({"name": "Alice"}))
            .unwrap();
        kg.insert_entity("person", "bob", t, None, json!({"name": "Bob"}))
            .unwrap();
        kg.insert_relationship("manages", "alice", "bob", t, None, json!({}))
            .unwrap();

        let related = kg.get_related("alice", None, Direction::Outgoing).unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].target_id, "bob");

        let stats = kg.stats().unwrap();
        assert_eq!(stats.total_entities, 2);
        assert_eq!(stats.total_relationships, 1);
    }

    #[test]
    fn late_discoveries_and_recent_changes() {
        let kg = kg();
        let old_valid = Utc::now() - Duration::days(10);
        kg.insert_entity("fact", "F1", old_valid, None, json!({"v": 1}))
            .unwrap();

        let late = kg
            .find_late_discoveries(Duration::hours(1), 10)
            .unwrap();
        assert_eq!(late.len(), 1);

        let recent = kg.what_changed_recently(Duration::hours(1), 10).unwrap();
        assert_eq!(recent.len(), 1);
    }
}
