//! Handlers for the leading-slash verbs (spec §6). Each handler owns its own
//! `Arc<AppContext>` built by `main` after verb validation has already run.

use std::io::{self, Write};
use std::sync::Arc;

use aegis_agent::pipeline::process_message_non_streaming;
use aegis_scheduler::{PersistentCache, SchedulerEngine, TaskResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::app::{self, AppContext};
use crate::error::{CliError, Result};
use crate::executor::AgentUnitExecutor;

const KG_SHOW_SCAN_LIMIT: i64 = 10_000;
const DEFAULT_LATE_MINUTES: i64 = 60;
const DEFAULT_CHANGES_HOURS: i64 = 24;

pub fn print_help() {
    println!(
        "aegis — personal AI operations assistant\n\n\
         Usage: aegis <verb> [args]\n\n\
         Verbs:\n\
         \x20 /help                     show this message\n\
         \x20 /query <text>             run one turn and print the reply\n\
         \x20 /monitor                  start the schedule-unit runtime\n\
         \x20 /interactive              start a REPL chat session\n\
         \x20 /status                   show provider, KG, and scheduler status\n\
         \x20 /clear-cache              clear the scheduler's persistent cache\n\
         \x20 /kg-stats                 knowledge-graph entity/relationship counts\n\
         \x20 /kg-asof <iso-time>       entities valid as of the given instant\n\
         \x20 /kg-late [min]            entities discovered >min late (default 60)\n\
         \x20 /kg-changes [hours]       entities that changed in the last N hours (default 24)\n\
         \x20 /kg-show <id>             show one entity by id"
    );
}

pub async fn query(ctx: Arc<AppContext>, text: &str) -> Result<()> {
    let max_tokens = ctx.config().agent.max_tokens;
    let result = process_message_non_streaming(Arc::clone(&ctx), text, None, max_tokens).await?;
    println!("{}", result.content);
    run_pending_synthesis(&ctx).await;
    Ok(())
}

pub async fn interactive(ctx: Arc<AppContext>) -> Result<()> {
    println!("aegis interactive session — type /exit or /quit to leave.");
    let max_tokens = ctx.config().agent.max_tokens;
    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "/exit" | "/quit") {
            break;
        }
        match process_message_non_streaming(Arc::clone(&ctx), line, None, max_tokens).await {
            Ok(result) => println!("{}", result.content),
            Err(e) => eprintln!("error: {e}"),
        }
        run_pending_synthesis(&ctx).await;
    }
    Ok(())
}

/// `internal__trigger_synthesis` only flips a pending flag (spec §4.E); the
/// caller is expected to notice it between turns. Here that means one extra
/// non-streaming turn synthesizing the day's knowledge-graph learnings,
/// run right after the turn that set the flag.
async fn run_pending_synthesis(ctx: &Arc<AppContext>) {
    let Some(focus) = ctx.take_synthesis_pending() else {
        return;
    };
    let prompt = match focus {
        Some(focus) => format!("Synthesize today's knowledge-graph learnings, focused on: {focus}"),
        None => "Synthesize today's knowledge-graph learnings into durable lessons.".to_string(),
    };
    let max_tokens = ctx.config().agent.max_tokens;
    match process_message_non_streaming(Arc::clone(ctx), &prompt, None, max_tokens).await {
        Ok(result) => info!(summary = %result.content, "synthesis pass completed"),
        Err(e) => warn!(error = %e, "synthesis pass failed"),
    }
}

pub async fn status(ctx: Arc<AppContext>) -> Result<()> {
    let config = ctx.config();
    println!("model:            {}", config.agent.model);
    println!("extended context: {}", config.features.allow_extended_context);
    println!("script execution: {}", config.features.allow_script_execution);

    use aegis_tools::context::ToolContext;
    let stats = ctx.knowledge_graph().stats()?;
    println!(
        "knowledge graph:  {} entities, {} relationships",
        stats.total_entities, stats.total_relationships
    );

    let units = ctx.scheduler().list_units()?;
    let enabled = units.iter().filter(|u| u.enabled).count();
    println!("schedule units:   {} total, {enabled} enabled", units.len());

    let supervisor = ctx.supervisor().lock().await;
    let all_tools = supervisor.all_tools();
    let mut servers: Vec<&String> = all_tools.iter().map(|(s, _)| s).collect();
    servers.sort();
    servers.dedup();
    println!("tool servers:     {}", servers.len());
    Ok(())
}

/// Deletes every row from the scheduler's keyed cache (spec §4.G "Cache").
/// `PersistentCache` exposes per-key removal but not a bulk clear, so this
/// opens its own short-lived connection to the same file and truncates the
/// table directly.
pub async fn clear_cache(ctx: Arc<AppContext>) -> Result<()> {
    let path = app::scheduler_db_path(ctx.config());
    let conn = rusqlite::Connection::open(&path)
        .map_err(|e| CliError::Other(format!("failed to open scheduler database: {e}")))?;
    aegis_scheduler::db::init_db(&conn)?;
    let n = conn
        .execute("DELETE FROM cache_entries", [])
        .map_err(aegis_scheduler::SchedulerError::Database)?;
    println!("cleared {n} cache entries");
    Ok(())
}

pub async fn kg_stats(ctx: Arc<AppContext>) -> Result<()> {
    use aegis_tools::context::ToolContext;
    let stats = ctx.knowledge_graph().stats()?;
    println!("total entities:       {}", stats.total_entities);
    for (ty, count) in &stats.entities_by_type {
        println!("  {ty}: {count}");
    }
    println!("total relationships:  {}", stats.total_relationships);
    for (ty, count) in &stats.relationships_by_type {
        println!("  {ty}: {count}");
    }
    Ok(())
}

/// No generic "every entity as of time T" query exists on `KnowledgeGraph`
/// (only per-`(entity_type, entity_id)` `query_as_of`), so this scans every
/// current entity via `search_knowledge("", ...)` and filters client-side by
/// the bi-temporal validity interval — the same pattern `/kg-show` uses for
/// lookup-by-id.
pub async fn kg_asof(ctx: Arc<AppContext>, iso_time: &str) -> Result<()> {
    use aegis_tools::context::ToolContext;
    let as_of: DateTime<Utc> = DateTime::parse_from_rfc3339(iso_time)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CliError::Other(format!("invalid ISO-8601 timestamp '{iso_time}': {e}")))?;

    let entities = ctx.knowledge_graph().search_knowledge("", KG_SHOW_SCAN_LIMIT)?;
    let matching: Vec<_> = entities
        .into_iter()
        .filter(|e| e.valid_from <= as_of && e.valid_to.map(|v| v > as_of).unwrap_or(true))
        .collect();

    if matching.is_empty() {
        println!("no entities valid as of {as_of}");
        return Ok(());
    }
    for entity in matching {
        println!("{} / {}: {}", entity.entity_type, entity.id, entity.data);
    }
    Ok(())
}

pub async fn kg_late(ctx: Arc<AppContext>, minutes: Option<i64>) -> Result<()> {
    use aegis_tools::context::ToolContext;
    let lag = ChronoDuration::minutes(minutes.unwrap_or(DEFAULT_LATE_MINUTES));
    let entities = ctx.knowledge_graph().find_late_discoveries(lag, 50)?;
    if entities.is_empty() {
        println!("no late discoveries");
        return Ok(());
    }
    for entity in entities {
        let lag_secs = (entity.tx_from - entity.valid_from).num_seconds();
        println!("{} / {}: discovered {lag_secs}s after it became true", entity.entity_type, entity.id);
    }
    Ok(())
}

pub async fn kg_changes(ctx: Arc<AppContext>, hours: Option<i64>) -> Result<()> {
    use aegis_tools::context::ToolContext;
    let window = ChronoDuration::hours(hours.unwrap_or(DEFAULT_CHANGES_HOURS));
    let entities = ctx.knowledge_graph().what_changed_recently(window, 50)?;
    if entities.is_empty() {
        println!("nothing changed in the last {}h", hours.unwrap_or(DEFAULT_CHANGES_HOURS));
        return Ok(());
    }
    for entity in entities {
        println!("{} / {}: {}", entity.entity_type, entity.id, entity.data);
    }
    Ok(())
}

pub async fn kg_show(ctx: Arc<AppContext>, id: &str) -> Result<()> {
    use aegis_tools::context::ToolContext;
    let entities = ctx.knowledge_graph().search_knowledge("", KG_SHOW_SCAN_LIMIT)?;
    match entities.into_iter().find(|e| e.id == id) {
        Some(entity) => {
            println!("id:         {}", entity.id);
            println!("type:       {}", entity.entity_type);
            println!("valid_from: {}", entity.valid_from);
            println!("valid_to:   {:?}", entity.valid_to);
            println!("data:       {}", entity.data);
        }
        None => println!("no current entity with id '{id}'"),
    }
    Ok(())
}

/// Starts the schedule-unit runtime (spec §4.G/§4.H): loads the schedule
/// file, reconciles it against the unit table, then runs the engine until
/// Ctrl-C. A background watcher restarts the engine whenever the schedule
/// file changes on disk, since `SchedulerEngine::rebuild` requires direct
/// ownership the running `engine.run()` future has already taken.
pub async fn monitor(ctx: Arc<AppContext>) -> Result<()> {
    use aegis_tools::context::ToolContext;

    let file_path = ctx.schedule_file_path().to_path_buf();
    if !file_path.exists() {
        let mut file = aegis_scheduler::ScheduleFile { version: 1, monitors: Vec::new(), tasks: Vec::new() };
        file.ensure_default_nightly_synthesis();
        file.save(&file_path)?;
        info!(path = %file_path.display(), "wrote default schedule file");
    }

    let (dirty_tx, mut dirty_rx) = watch::channel(());
    let watch_path = file_path.clone();
    let watch_callback: aegis_watch::WatchCallback = std::sync::Arc::new(move || {
        let dirty_tx = dirty_tx.clone();
        Box::pin(async move {
            let _ = dirty_tx.send(());
        })
    });
    let _watch_handle = aegis_watch::watch_file(watch_path, aegis_watch::DEFAULT_DEBOUNCE, watch_callback);

    let executor = std::sync::Arc::new(AgentUnitExecutor { ctx: Arc::clone(&ctx) });

    let (fired_tx, mut fired_rx) = mpsc::channel::<TaskResult>(32);
    let notify_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        while let Some(result) = fired_rx.recv().await {
            let channels = notify_ctx
                .scheduler()
                .list_units()
                .ok()
                .and_then(|units| units.into_iter().find(|u| u.name == result.unit_name))
                .filter(|u| u.notify)
                .map(|u| u.channels)
                .unwrap_or_default();
            if channels.is_empty() {
                continue;
            }
            let title = format!("{} {}", result.unit_name, if result.success { "succeeded" } else { "failed" });
            for channel in &channels {
                notify_ctx.notifier().notify(channel, &title, &result.output);
            }
        }
    });

    let mut shutdown_signal = tokio::signal::ctrl_c();
    loop {
        let file = aegis_scheduler::ScheduleFile::load(&file_path)?;
        aegis_scheduler::schedule_file::sync_to_handle(&file, ctx.scheduler())?;

        let conn = rusqlite::Connection::open(app::scheduler_db_path(ctx.config()))
            .map_err(|e| CliError::Other(format!("failed to open scheduler database: {e}")))?;
        let cache_conn = rusqlite::Connection::open(app::scheduler_db_path(ctx.config()))
            .map_err(|e| CliError::Other(format!("failed to open scheduler database: {e}")))?;
        let cache = PersistentCache::new(cache_conn)?;
        let engine = SchedulerEngine::new(conn, cache, executor.clone(), Some(fired_tx.clone()))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!("scheduler monitor running, watching {}", file_path.display());

        // `engine.run` is spawned rather than raced directly: racing it in
        // `select!` would drop (not cancel) it the moment another branch
        // wins, orphaning its driver tasks instead of shutting them down.
        // Spawning it lets us send the shutdown signal and then await the
        // same future to completion, so `shutdown_all_drivers` always runs
        // before the next loop iteration spawns a fresh set.
        let mut run_handle = tokio::spawn(engine.run(shutdown_rx));

        tokio::select! {
            _ = &mut run_handle => {
                break;
            }
            _ = dirty_rx.changed() => {
                let _ = shutdown_tx.send(true);
                let _ = (&mut run_handle).await;
                warn!("schedule file changed, restarting scheduler engine");
                continue;
            }
            _ = &mut shutdown_signal => {
                let _ = shutdown_tx.send(true);
                let _ = (&mut run_handle).await;
                info!("shutdown requested, stopping scheduler engine");
                break;
            }
        }
    }
    Ok(())
}
