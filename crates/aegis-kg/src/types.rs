use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity with bi-temporal tracking (spec §3 "Entity").
///
/// Identified by `(entity_type, entity_id)`. `valid_from`/`valid_to` bound the
/// interval during which the fact was true *in the world*; `tx_from`/`tx_to`
/// bound the interval during which the system *believed* it. At most one row
/// per `(entity_type, entity_id)` has `tx_to = None` at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub entity_type: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub tx_from: DateTime<Utc>,
    pub tx_to: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
}

impl Entity {
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            valid_from: parse_dt(row.get::<_, String>(2)?),
            valid_to: row.get::<_, Option<String>>(3)?.map(parse_dt),
            tx_from: parse_dt(row.get::<_, String>(4)?),
            tx_to: row.get::<_, Option<String>>(5)?.map(parse_dt),
            data: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or(serde_json::Value::Null),
        })
    }
}

/// A directed edge between two entities, with the same bi-temporal shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub source_id: String,
    pub target_id: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub tx_from: DateTime<Utc>,
    pub tx_to: Option<DateTime<Utc>>,
    pub properties: serde_json::Value,
}

impl Relationship {
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            rel_type: row.get(1)?,
            source_id: row.get(2)?,
            target_id: row.get(3)?,
            valid_from: parse_dt(row.get::<_, String>(4)?),
            valid_to: row.get::<_, Option<String>>(5)?.map(parse_dt),
            tx_from: parse_dt(row.get::<_, String>(6)?),
            tx_to: row.get::<_, Option<String>>(7)?.map(parse_dt),
            properties: row
                .get::<_, Option<String>>(8)?
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Object(Default::default())),
        })
    }
}

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn fmt_opt_dt(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(fmt_dt)
}

/// Direction of traversal for `get_related`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Rolled-up counts returned by `stats()`.
#[derive(Debug, Clone, Serialize)]
pub struct KgStats {
    pub total_entities: i64,
    pub entities_by_type: Vec<(String, i64)>,
    pub total_relationships: i64,
    pub relationships_by_type: Vec<(String, i64)>,
}
