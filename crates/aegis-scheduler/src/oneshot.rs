//! One-shot future actions (spec §4.E "Schedule action tools"). Distinct
//! from recurring [`crate::types::ScheduleUnit`]s: each row fires exactly
//! once at `fire_at`, then is marked delivered. Firing itself is left to the
//! caller (the agent loop or the CLI's monitor mode) — this module only
//! owns persistence.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OneShotAction {
    pub id: String,
    pub fire_at: DateTime<Utc>,
    pub body: String,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

pub fn enqueue(conn: &Connection, body: &str, fire_at: DateTime<Utc>) -> Result<OneShotAction> {
    let id = Uuid::new_v4().to_string();
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO oneshot_actions (id, fire_at, body, delivered, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![id, fire_at.to_rfc3339(), body, created_at.to_rfc3339()],
    )?;
    Ok(OneShotAction { id, fire_at, body: body.to_string(), delivered: false, created_at })
}

pub fn list_pending(conn: &Connection) -> Result<Vec<OneShotAction>> {
    let mut stmt = conn.prepare(
        "SELECT id, fire_at, body, delivered, created_at FROM oneshot_actions
         WHERE delivered = 0 ORDER BY fire_at",
    )?;
    let rows = stmt.query_map([], row_to_action)?.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Pending actions whose `fire_at` has already passed.
pub fn due(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<OneShotAction>> {
    Ok(list_pending(conn)?.into_iter().filter(|a| a.fire_at <= now).collect())
}

pub fn mark_delivered(conn: &Connection, id: &str) -> Result<()> {
    conn.execute("UPDATE oneshot_actions SET delivered = 1 WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cancel(conn: &Connection, id: &str) -> Result<bool> {
    let n = conn.execute("DELETE FROM oneshot_actions WHERE id = ?1 AND delivered = 0", [id])?;
    Ok(n > 0)
}

fn row_to_action(row: &rusqlite::Row) -> rusqlite::Result<OneShotAction> {
    let fire_at: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    Ok(OneShotAction {
        id: row.get(0)?,
        fire_at: DateTime::parse_from_rfc3339(&fire_at).unwrap().with_timezone(&Utc),
        body: row.get(2)?,
        delivered: row.get::<_, i64>(3)? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn enqueue_list_and_cancel_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let action = enqueue(&conn, "ping alice", Utc::now() + Duration::hours(1)).unwrap();
        assert_eq!(list_pending(&conn).unwrap().len(), 1);
        assert!(cancel(&conn, &action.id).unwrap());
        assert_eq!(list_pending(&conn).unwrap().len(), 0);
    }

    #[test]
    fn due_filters_by_fire_at() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        enqueue(&conn, "past", Utc::now() - Duration::minutes(5)).unwrap();
        enqueue(&conn, "future", Utc::now() + Duration::hours(1)).unwrap();
        let due_now = due(&conn, Utc::now()).unwrap();
        assert_eq!(due_now.len(), 1);
        assert_eq!(due_now[0].body, "past");
    }

    #[test]
    fn mark_delivered_removes_from_pending() {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let action = enqueue(&conn, "once", Utc::now()).unwrap();
        mark_delivered(&conn, &action.id).unwrap();
        assert_eq!(list_pending(&conn).unwrap().len(), 0);
    }
}
