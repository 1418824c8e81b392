//! `aegis-scheduler` — a long-running runtime holding a set of named
//! schedule units, each driven by its own cancellable task (spec §4.G).
//!
//! # Cadences
//!
//! | Variant                  | Behaviour                                               |
//! |---------------------------|---------------------------------------------------------|
//! | `Interval`                | Run, sleep N seconds, repeat; no suspension catch-up     |
//! | `TimeOfDay`                | Fire once a day at HH:MM on an allowed day; catches up   |
//! | `IntervalWithinRange`      | Repeat inside a daily time window on allowed days        |
//!
//! A monotonic-vs-wall-clock comparator polls every ~5s to detect suspension
//! and trigger catch-up runs for `TimeOfDay` units. A keyed persistent cache
//! with monotonic-authoritative TTL is exposed via [`cache::PersistentCache`].

pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod oneshot;
pub mod schedule;
pub mod schedule_file;
pub mod suspend;
pub mod types;

pub use cache::PersistentCache;
pub use engine::{SchedulerEngine, SchedulerHandle, UnitExecutor};
pub use error::{Result, SchedulerError};
pub use oneshot::OneShotAction;
pub use schedule_file::{parse_interval, ScheduleFile, ScheduleFileEntry};
pub use suspend::{SuspendDetector, SuspensionEvent};
pub use types::{Cadence, DayMask, ScheduleUnit, TaskResult, UnitStatus};
