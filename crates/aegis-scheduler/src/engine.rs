use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::PersistentCache;
use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::schedule::{compute_next_run, missed_time_of_day_fire};
use crate::suspend::SuspendDetector;
use crate::types::{Cadence, ScheduleUnit, TaskResult, UnitStatus};

/// Runs a unit's body and reports the outcome. Implemented by the agent
/// runtime; kept behind a trait so the scheduler crate has no dependency on
/// it (spec §4.F/§4.G boundary).
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    async fn execute(&self, unit: &ScheduleUnit) -> TaskResult;
}

type SharedConn = Arc<StdMutex<Connection>>;

/// Shared handle for unit CRUD while the engine's drivers run. Holds its own
/// connection so callers never contend with a driver's writes, mirroring
/// the handle/engine split this crate has always used.
pub struct SchedulerHandle {
    conn: SharedConn,
}

impl SchedulerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn: Arc::new(StdMutex::new(conn)) })
    }

    pub fn add_unit(
        &self,
        name: &str,
        body: &str,
        cadence: Cadence,
        notify: bool,
        channels: Vec<String>,
    ) -> Result<ScheduleUnit> {
        let conn = self.conn.lock().unwrap();
        insert_unit(&conn, name, body, cadence, notify, channels)
    }

    pub fn remove_unit(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM units WHERE name = ?1", [name])?;
        if n == 0 {
            return Err(SchedulerError::UnitNotFound { name: name.to_string() });
        }
        info!(name, "unit removed via handle");
        Ok(())
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let n = conn.execute(
            "UPDATE units SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
            params![enabled as i64, now, name],
        )?;
        if n == 0 {
            return Err(SchedulerError::UnitNotFound { name: name.to_string() });
        }
        Ok(())
    }

    pub fn list_units(&self) -> Result<Vec<ScheduleUnit>> {
        let conn = self.conn.lock().unwrap();
        load_units(&conn, false)
    }

    pub fn enqueue_oneshot(&self, body: &str, fire_at: chrono::DateTime<Utc>) -> Result<crate::oneshot::OneShotAction> {
        let conn = self.conn.lock().unwrap();
        crate::oneshot::enqueue(&conn, body, fire_at)
    }

    pub fn list_pending_oneshots(&self) -> Result<Vec<crate::oneshot::OneShotAction>> {
        let conn = self.conn.lock().unwrap();
        crate::oneshot::list_pending(&conn)
    }

    pub fn cancel_oneshot(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        crate::oneshot::cancel(&conn, id)
    }
}

fn insert_unit(
    conn: &Connection,
    name: &str,
    body: &str,
    cadence: Cadence,
    notify: bool,
    channels: Vec<String>,
) -> Result<ScheduleUnit> {
    let existing: Option<String> = conn
        .query_row("SELECT id FROM units WHERE name = ?1", [name], |r| r.get(0))
        .optional()?;
    if existing.is_some() {
        return Err(SchedulerError::UnitAlreadyExists { name: name.to_string() });
    }

    let now = Utc::now();
    let now_str = now.to_rfc3339();
    let id = Uuid::new_v4().to_string();
    let cadence_json = serde_json::to_string(&cadence)?;
    let channels_json = serde_json::to_string(&channels)?;
    let next = compute_next_run(&cadence, now);

    conn.execute(
        "INSERT INTO units
         (id, name, body, cadence, enabled, notify, channels, arguments, conditions,
          max_turns, status, last_run, next_run, run_count, created_at, updated_at)
         VALUES (?1,?2,?3,?4,1,?5,?6,'null',NULL,NULL,'enabled',NULL,?7,0,?8,?8)",
        params![id, name, body, cadence_json, notify as i64, channels_json, next.to_rfc3339(), now_str],
    )?;

    Ok(ScheduleUnit {
        id,
        name: name.to_string(),
        body: body.to_string(),
        cadence,
        enabled: true,
        notify,
        channels,
        arguments: serde_json::Value::Null,
        conditions: None,
        max_turns: None,
        status: UnitStatus::Enabled,
        last_run: None,
        next_run: Some(next),
        run_count: 0,
        created_at: now,
        updated_at: now,
    })
}

fn load_units(conn: &Connection, enabled_only: bool) -> Result<Vec<ScheduleUnit>> {
    let sql = if enabled_only {
        "SELECT id, name, body, cadence, enabled, notify, channels, arguments, conditions,
                max_turns, status, last_run, next_run, run_count, created_at, updated_at
         FROM units WHERE enabled = 1 ORDER BY created_at"
    } else {
        "SELECT id, name, body, cadence, enabled, notify, channels, arguments, conditions,
                max_turns, status, last_run, next_run, run_count, created_at, updated_at
         FROM units ORDER BY created_at"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
            row.get::<_, String>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, Option<String>>(8)?,
            row.get::<_, Option<u32>>(9)?,
            row.get::<_, String>(10)?,
            row.get::<_, Option<String>>(11)?,
            row.get::<_, Option<String>>(12)?,
            row.get::<_, u64>(13)?,
            row.get::<_, String>(14)?,
            row.get::<_, String>(15)?,
        ))
    })?;

    let mut units = Vec::new();
    for row in rows {
        let (
            id,
            name,
            body,
            cadence_json,
            enabled,
            notify,
            channels_json,
            arguments_json,
            conditions,
            max_turns,
            status_str,
            last_run,
            next_run,
            run_count,
            created_at,
            updated_at,
        ) = row?;
        let cadence: Cadence = serde_json::from_str(&cadence_json)?;
        let channels: Vec<String> = serde_json::from_str(&channels_json)?;
        let arguments: serde_json::Value = serde_json::from_str(&arguments_json)?;
        let status: UnitStatus = status_str.parse().unwrap_or(UnitStatus::Enabled);
        units.push(ScheduleUnit {
            id,
            name,
            body,
            cadence,
            enabled: enabled != 0,
            notify: notify != 0,
            channels,
            arguments,
            conditions,
            max_turns,
            status,
            last_run: last_run.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            next_run: next_run.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc)),
            run_count,
            created_at: chrono::DateTime::parse_from_rfc3339(&created_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
            updated_at: chrono::DateTime::parse_from_rfc3339(&updated_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        });
    }
    Ok(units)
}

fn record_run(conn: &SharedConn, name: &str, ran_at: chrono::DateTime<Utc>, run_count: u64, next_run: Option<chrono::DateTime<Utc>>) {
    let conn = conn.lock().unwrap();
    let res = conn.execute(
        "UPDATE units SET last_run=?1, run_count=?2, next_run=?3, updated_at=?1 WHERE name=?4",
        params![ran_at.to_rfc3339(), run_count, next_run.map(|d| d.to_rfc3339()), name],
    );
    if let Err(e) = res {
        error!(unit = name, error = %e, "failed to persist unit run");
    }
}

struct DriverHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Holds one driver task per schedule unit (spec §4.G: "Each unit has its
/// own driver task") plus the suspension comparator and the persistent
/// cache.
pub struct SchedulerEngine {
    conn: SharedConn,
    cache: Arc<PersistentCache>,
    executor: Arc<dyn UnitExecutor>,
    fired_tx: Option<mpsc::Sender<TaskResult>>,
    drivers: HashMap<String, DriverHandle>,
}

impl SchedulerEngine {
    pub fn new(
        conn: Connection,
        cache: PersistentCache,
        executor: Arc<dyn UnitExecutor>,
        fired_tx: Option<mpsc::Sender<TaskResult>>,
    ) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
            cache: Arc::new(cache),
            executor,
            fired_tx,
            drivers: HashMap::new(),
        })
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.cache
    }

    pub fn add_unit(&self, name: &str, body: &str, cadence: Cadence, notify: bool, channels: Vec<String>) -> Result<ScheduleUnit> {
        let conn = self.conn.lock().unwrap();
        insert_unit(&conn, name, body, cadence, notify, channels)
    }

    pub fn list_units(&self) -> Result<Vec<ScheduleUnit>> {
        let conn = self.conn.lock().unwrap();
        load_units(&conn, false)
    }

    /// Start all enabled units' drivers and the suspension comparator, then
    /// block until `shutdown` broadcasts `true`. On return, every driver has
    /// been signalled and awaited.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler engine started");
        self.spawn_all_drivers();

        let (suspend_tx, mut suspend_rx) = mpsc::unbounded_channel();
        let detector = SuspendDetector::new();
        let suspend_task = tokio::spawn(async move {
            detector.watch(move |event| {
                let _ = suspend_tx.send(event);
            }).await;
        });

        loop {
            tokio::select! {
                Some(event) = suspend_rx.recv() => {
                    self.handle_suspension(event.wall_jump_secs).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        suspend_task.abort();
        self.shutdown_all_drivers().await;
    }

    /// File-change reaction (spec §4.G / §4.H): cancel every driver, await
    /// termination, reload the unit set from the database, and respawn.
    pub async fn rebuild(&mut self) {
        self.shutdown_all_drivers().await;
        self.spawn_all_drivers();
    }

    fn spawn_all_drivers(&mut self) {
        let units = match { let conn = self.conn.lock().unwrap(); load_units(&conn, true) } {
            Ok(units) => units,
            Err(e) => {
                error!(error = %e, "failed to load units for driver spawn");
                return;
            }
        };
        for unit in units {
            let name = unit.name.clone();
            let handle = self.spawn_driver(unit);
            self.drivers.insert(name, handle);
        }
    }

    async fn shutdown_all_drivers(&mut self) {
        for (_, handle) in self.drivers.drain() {
            let _ = handle.shutdown.send(true);
            let _ = handle.task.await;
        }
    }

    fn spawn_driver(&self, unit: ScheduleUnit) -> DriverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let conn = Arc::clone(&self.conn);
        let executor = Arc::clone(&self.executor);
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(drive_unit(unit, conn, executor, fired_tx, shutdown_rx));
        DriverHandle { shutdown: shutdown_tx, task }
    }

    /// Restricted to `time_of_day` units: if any had a scheduled fire inside
    /// the suspension window, run it once immediately. Interval-based units
    /// simply resume from `now` via their own driver loop.
    async fn handle_suspension(&self, wall_jump_secs: i64) {
        let now = Utc::now();
        let before = now - chrono::Duration::seconds(wall_jump_secs.abs());
        warn!(wall_jump_secs, "handling suspension event");

        let units = match { let conn = self.conn.lock().unwrap(); load_units(&conn, true) } {
            Ok(units) => units,
            Err(e) => {
                error!(error = %e, "failed to load units for suspension catch-up");
                return;
            }
        };

        for unit in units {
            let Cadence::TimeOfDay { hour, minute, days } = unit.cadence else { continue };
            if missed_time_of_day_fire(hour, minute, days, before, now) {
                info!(unit = %unit.name, "catching up missed time_of_day fire after suspension");
                let result = self.executor.execute(&unit).await;
                record_run(&self.conn, &unit.name, result.ran_at, unit.run_count + 1, unit.next_run);
                if unit.notify {
                    if let Some(tx) = &self.fired_tx {
                        if tx.try_send(result).is_err() {
                            warn!(unit = %unit.name, "notification channel full or closed — catch-up result dropped");
                        }
                    }
                }
            }
        }
    }
}

async fn drive_unit(
    mut unit: ScheduleUnit,
    conn: SharedConn,
    executor: Arc<dyn UnitExecutor>,
    fired_tx: Option<mpsc::Sender<TaskResult>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let now = Utc::now();
        let next = compute_next_run(&unit.cadence, now);
        let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(unit = %unit.name, "driver cancelled");
                    return;
                }
            }
        }

        let result = executor.execute(&unit).await;
        unit.run_count += 1;
        unit.last_run = Some(result.ran_at);
        let next_after = compute_next_run(&unit.cadence, result.ran_at);
        unit.next_run = Some(next_after);
        record_run(&conn, &unit.name, result.ran_at, unit.run_count, Some(next_after));

        if unit.notify {
            if let Some(tx) = &fired_tx {
                if tx.try_send(result).is_err() {
                    warn!(unit = %unit.name, "notification channel full or closed — result dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopExecutor;

    #[async_trait]
    impl UnitExecutor for NoopExecutor {
        async fn execute(&self, unit: &ScheduleUnit) -> TaskResult {
            TaskResult {
                unit_name: unit.name.clone(),
                success: true,
                output: "ok".to_string(),
                metadata: serde_json::Value::Null,
                ran_at: Utc::now(),
            }
        }
    }

    fn open_handle() -> SchedulerHandle {
        SchedulerHandle::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn add_and_list_units_roundtrip() {
        let handle = open_handle();
        handle
            .add_unit("morning-digest", "summarize overnight changes", Cadence::Interval { every_secs: 3600 }, true, vec!["console".into()])
            .unwrap();
        let units = handle.list_units().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "morning-digest");
        assert!(units[0].next_run.is_some());
    }

    #[test]
    fn duplicate_unit_name_rejected() {
        let handle = open_handle();
        handle.add_unit("daily", "do it", Cadence::Interval { every_secs: 60 }, false, vec![]).unwrap();
        let err = handle.add_unit("daily", "do it again", Cadence::Interval { every_secs: 60 }, false, vec![]);
        assert!(matches!(err, Err(SchedulerError::UnitAlreadyExists { .. })));
    }

    #[test]
    fn remove_unknown_unit_errors() {
        let handle = open_handle();
        let err = handle.remove_unit("ghost");
        assert!(matches!(err, Err(SchedulerError::UnitNotFound { .. })));
    }

    #[tokio::test]
    async fn engine_loads_enabled_units_for_drivers() {
        let handle_conn = Connection::open_in_memory().unwrap();
        init_db(&handle_conn).unwrap();
        insert_unit(&handle_conn, "heartbeat", "ping", Cadence::Interval { every_secs: 60 }, false, vec![]).unwrap();

        let cache_conn = Connection::open_in_memory().unwrap();
        init_db(&cache_conn).unwrap();
        let cache = PersistentCache::new(cache_conn).unwrap();

        let mut engine = SchedulerEngine::new(handle_conn, cache, Arc::new(NoopExecutor), None).unwrap();
        let units = engine.list_units().unwrap();
        assert_eq!(units.len(), 1);
        engine.spawn_all_drivers();
        assert_eq!(engine.drivers.len(), 1);
        engine.shutdown_all_drivers().await;
        assert!(engine.drivers.is_empty());
    }
}
