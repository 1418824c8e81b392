//! `aegis` — the binary that ties every engine crate together behind a
//! thin, leading-slash-verb CLI (spec §6).
//!
//! Grounded on the pack's `clap`/`tracing_subscriber` CLI shape
//! (`knhk-test-cache`'s `Cli { #[command(subcommand)] ... }` binary), adapted
//! to a single positional verb since the spec's surface is a flat list of
//! slash-commands rather than nested subcommands.

mod app;
mod audit;
mod commands;
mod error;
mod executor;
mod notify;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use app::AppContext;
use error::Result;

const VERBS: &[&str] = &[
    "/help",
    "/query",
    "/monitor",
    "/interactive",
    "/status",
    "/clear-cache",
    "/kg-stats",
    "/kg-asof",
    "/kg-late",
    "/kg-changes",
    "/kg-show",
];

#[derive(Parser)]
#[command(name = "aegis", about = "Personal AI operations assistant")]
struct Cli {
    /// Leading-slash verb, e.g. `/query`.
    verb: String,

    /// Arguments to the verb.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,

    /// Path to `aegis.toml`. Defaults to `$AEGIS_CONFIG_DIR/aegis.toml`.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Verb validation happens before any config/agent/DB initialization
    // (spec §6: "Unknown verb → exit 1 without initializing the agent").
    if !cli.verb.starts_with('/') {
        eprintln!("error: commands must start with / (got '{}')", cli.verb);
        return ExitCode::FAILURE;
    }
    if !VERBS.contains(&cli.verb.as_str()) {
        eprintln!("error: unknown command '{}'. Run '/help' to list commands.", cli.verb);
        return ExitCode::FAILURE;
    }

    if cli.verb == "/help" {
        commands::print_help();
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = aegis_core::AegisConfig::load(cli.config.as_deref())?;
    let interactive = cli.verb == "/interactive";
    let ctx = Arc::new(AppContext::build(config, interactive).await?);
    ctx.install_prompt_executor(Box::new(executor::AgentPromptExecutor { ctx: Arc::clone(&ctx) }));
    let _watch_set = app::start_file_watchers(Arc::clone(&ctx));

    match cli.verb.as_str() {
        "/query" => {
            if cli.rest.is_empty() {
                return Err(error::CliError::Other("usage: /query <text>".to_string()));
            }
            commands::query(ctx, &cli.rest.join(" ")).await
        }
        "/monitor" => commands::monitor(ctx).await,
        "/interactive" => commands::interactive(ctx).await,
        "/status" => commands::status(ctx).await,
        "/clear-cache" => commands::clear_cache(ctx).await,
        "/kg-stats" => commands::kg_stats(ctx).await,
        "/kg-asof" => {
            let Some(iso) = cli.rest.first() else {
                return Err(error::CliError::Other("usage: /kg-asof <iso-time>".to_string()));
            };
            commands::kg_asof(ctx, iso).await
        }
        "/kg-late" => {
            let minutes = cli.rest.first().and_then(|s| s.parse::<i64>().ok());
            commands::kg_late(ctx, minutes).await
        }
        "/kg-changes" => {
            let hours = cli.rest.first().and_then(|s| s.parse::<i64>().ok());
            commands::kg_changes(ctx, hours).await
        }
        "/kg-show" => {
            let Some(id) = cli.rest.first() else {
                return Err(error::CliError::Other("usage: /kg-show <id>".to_string()));
            };
            commands::kg_show(ctx, id).await
        }
        other => unreachable!("verb '{other}' passed validation but has no handler"),
    }
}
