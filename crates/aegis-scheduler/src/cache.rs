//! Keyed persistent cache with monotonic-time-authoritative TTL (spec §4.G
//! "Cache"). Entries written by the running process record both a monotonic
//! timestamp (scoped to this process's `epoch_id`) and a wall-clock
//! timestamp. On read, an entry written by the *current* process is checked
//! against monotonic elapsed time, which is immune to wall-clock jumps
//! (suspension, NTP step); an entry written by a prior process run (a
//! different `epoch_id`, e.g. after a restart) falls back to wall-clock
//! comparison, per the spec's backward-compatibility clause.

use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

pub struct PersistentCache {
    conn: Mutex<Connection>,
    epoch_id: String,
    process_start: Instant,
}

impl PersistentCache {
    /// Wrap an already-initialized connection (schema from `db::init_db`)
    /// and purge expired entries eagerly.
    pub fn new(conn: Connection) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
            epoch_id: Uuid::new_v4().to_string(),
            process_start: Instant::now(),
        };
        cache.purge_expired()?;
        Ok(cache)
    }

    pub fn set(&self, key: &str, payload: &str, ttl_seconds: i64) -> Result<()> {
        let monotonic_ms = self.process_start.elapsed().as_millis() as i64;
        let wall = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO cache_entries (key, payload, wrote_at_epoch_id, wrote_at_monotonic_ms, wrote_at_wall, ttl_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                wrote_at_epoch_id = excluded.wrote_at_epoch_id,
                wrote_at_monotonic_ms = excluded.wrote_at_monotonic_ms,
                wrote_at_wall = excluded.wrote_at_wall,
                ttl_seconds = excluded.ttl_seconds",
            params![key, payload, self.epoch_id, monotonic_ms, wall, ttl_seconds],
        )?;
        Ok(())
    }

    /// Returns `None` if the key is absent or has expired, purging expired
    /// entries lazily on access.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, String, i64, String, i64)> = conn
            .query_row(
                "SELECT payload, wrote_at_epoch_id, wrote_at_monotonic_ms, wrote_at_wall, ttl_seconds
                 FROM cache_entries WHERE key = ?1",
                params![key],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .optional()?;

        let Some((payload, epoch_id, monotonic_ms, wall, ttl_seconds)) = row else {
            return Ok(None);
        };

        let expired = if epoch_id == self.epoch_id {
            let elapsed_secs = (self.process_start.elapsed().as_millis() as i64 - monotonic_ms) / 1000;
            elapsed_secs >= ttl_seconds
        } else {
            let wrote_at = chrono::DateTime::parse_from_rfc3339(&wall)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            (Utc::now() - wrote_at).num_seconds() >= ttl_seconds
        };

        if expired {
            drop(conn);
            self.remove(key)?;
            return Ok(None);
        }
        Ok(Some(payload))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Purge every entry whose TTL has elapsed, evaluated purely by
    /// wall-clock time since this sweep has no per-entry monotonic context
    /// of its own beyond "is this entry from the current epoch".
    pub fn purge_expired(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT key, wrote_at_epoch_id, wrote_at_monotonic_ms, wrote_at_wall, ttl_seconds FROM cache_entries",
        )?;
        let rows: Vec<(String, String, i64, String, i64)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let mut expired_keys = Vec::new();
        for (key, epoch_id, monotonic_ms, wall, ttl_seconds) in rows {
            let expired = if epoch_id == self.epoch_id {
                let elapsed_secs = (self.process_start.elapsed().as_millis() as i64 - monotonic_ms) / 1000;
                elapsed_secs >= ttl_seconds
            } else {
                let wrote_at = chrono::DateTime::parse_from_rfc3339(&wall)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                (Utc::now() - wrote_at).num_seconds() >= ttl_seconds
            };
            if expired {
                expired_keys.push(key);
            }
        }

        if !expired_keys.is_empty() {
            debug!(count = expired_keys.len(), "purging expired cache entries");
            for key in expired_keys {
                conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn open_cache() -> PersistentCache {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        PersistentCache::new(conn).unwrap()
    }

    #[test]
    fn set_then_get_roundtrips() {
        let cache = open_cache();
        cache.set("greeting", "hello", 60).unwrap();
        assert_eq!(cache.get("greeting").unwrap(), Some("hello".to_string()));
    }

    #[test]
    fn expired_entry_returns_none() {
        let cache = open_cache();
        cache.set("stale", "value", 0).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        assert_eq!(cache.get("stale").unwrap(), None);
    }

    #[test]
    fn missing_key_returns_none() {
        let cache = open_cache();
        assert_eq!(cache.get("nope").unwrap(), None);
    }
}
