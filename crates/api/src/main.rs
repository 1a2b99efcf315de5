//! pimsync daemon entry point.
//!
//! With no arguments, loads configuration, wires the application graph,
//! starts the sync worker and the maintenance schedulers, and runs until
//! interrupted. With a subcommand, runs a single maintenance routine and
//! exits:
//!
//! ```text
//! pimsync                      run the daemon
//! pimsync dashboard            print the sync dashboard
//! pimsync reset-stuck [hours]  reset stuck entity types
//! pimsync process-deferred     drain one deferred relationship batch
//! pimsync repair-products      rebuild product join rows from raw data
//! pimsync repair-categories    rebuild category parent links
//! pimsync clear-backlog        purge archived tasks, reconcile counters
//! pimsync errors [limit]       print recent sync errors
//! pimsync formats              print sorting-format support per entity type
//! pimsync probe-formats <entity>        probe the live provider per format
//! pimsync test-task <entity> [format]   enqueue a single test task
//! ```

use std::str::FromStr;

use pimsync_domain::{EntityType, SortingFormat};
use pimsync_infra::config as config_loader;
use pimsync_lib::{ops, AppContext};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; environment and config files are the real sources
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = config_loader::load().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let sync_enabled = config.sync.enabled;

    let context = AppContext::initialize(config).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    info!("pimsync context initialised");

    match args.first().map(String::as_str) {
        None => run_daemon(&context, sync_enabled).await,
        Some(command) => run_command(&context, command, &args[1..]).await,
    }
}

async fn run_daemon(context: &AppContext, sync_enabled: bool) -> anyhow::Result<()> {
    let mut worker = context.sync_worker();
    let mut queue_scheduler = context.queue_scheduler();
    let mut resolver_scheduler = context.resolver_scheduler();
    let mut recovery_scheduler = context.recovery_scheduler();

    if sync_enabled {
        worker.start().await.map_err(|e| anyhow::anyhow!(e))?;
        queue_scheduler.start().await?;
        resolver_scheduler.start().await?;
        recovery_scheduler.start().await?;
        info!("sync worker and schedulers running");
    } else {
        info!("background sync disabled by configuration; running idle");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if sync_enabled {
        if let Err(e) = queue_scheduler.stop().await {
            error!(error = %e, "queue scheduler did not stop cleanly");
        }
        if let Err(e) = resolver_scheduler.stop().await {
            error!(error = %e, "resolver scheduler did not stop cleanly");
        }
        if let Err(e) = recovery_scheduler.stop().await {
            error!(error = %e, "recovery scheduler did not stop cleanly");
        }
        if let Err(e) = worker.stop().await {
            error!(error = %e, "sync worker did not stop cleanly");
        }
    }

    info!("pimsync stopped");
    Ok(())
}

async fn run_command(context: &AppContext, command: &str, rest: &[String]) -> anyhow::Result<()> {
    match command {
        "dashboard" => {
            let rows = ops::sync_dashboard(context).await.map_err(to_anyhow)?;
            print_json(&rows)
        }
        "reset-stuck" => {
            let hours = parse_or(rest.first(), context.config.sync.stuck_threshold_hours)?;
            let resets = ops::reset_stuck_syncs(context, hours).await.map_err(to_anyhow)?;
            print_json(&resets)
        }
        "process-deferred" => {
            let resolved = ops::process_deferred_relationships(context).await.map_err(to_anyhow)?;
            info!(resolved, "deferred relationship batch processed");
            Ok(())
        }
        "repair-products" => {
            let report = ops::repair_product_relationships(context).await.map_err(to_anyhow)?;
            print_json(&report)
        }
        "repair-categories" => {
            let changed =
                ops::repair_category_parent_relationships(context).await.map_err(to_anyhow)?;
            info!(changed, "category parent repair completed");
            Ok(())
        }
        "clear-backlog" => {
            let report = ops::clear_response_backlog(context).await.map_err(to_anyhow)?;
            print_json(&report)
        }
        "errors" => {
            let limit = parse_or(rest.first(), 20u32)? as usize;
            let errors = ops::recent_sync_errors(context, limit).await.map_err(to_anyhow)?;
            print_json(&errors)
        }
        "formats" => print_json(&ops::sorting_format_report()),
        "probe-formats" => {
            let entity_type = parse_entity(rest.first())?;
            let support = ops::probe_entity_formats(context, entity_type).await.map_err(to_anyhow)?;
            print_json(&support)
        }
        "test-task" => {
            let entity_type = parse_entity(rest.first())?;
            let format = match rest.get(1) {
                Some(raw) => SortingFormat::from_str(raw).map_err(|e| anyhow::anyhow!(e))?,
                None => pimsync_core::request::default_format(entity_type),
            };
            let task_id =
                ops::enqueue_test_task(context, entity_type, format).await.map_err(to_anyhow)?;
            info!(task_id, "test task enqueued");
            Ok(())
        }
        other => anyhow::bail!("unknown command: {other}"),
    }
}

fn parse_entity(arg: Option<&String>) -> anyhow::Result<EntityType> {
    let raw = arg.ok_or_else(|| anyhow::anyhow!("missing entity type argument"))?;
    EntityType::from_str(raw).map_err(|e| anyhow::anyhow!(e))
}

fn parse_or<T: std::str::FromStr>(arg: Option<&String>, default: T) -> anyhow::Result<T> {
    match arg {
        None => Ok(default),
        Some(raw) => {
            raw.parse::<T>().map_err(|_| anyhow::anyhow!("invalid numeric argument: {raw}"))
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn to_anyhow(err: pimsync_domain::PimSyncError) -> anyhow::Error {
    anyhow::anyhow!(err.to_string())
}
