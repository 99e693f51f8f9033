//! Sync queue command implementation.

use std::sync::Arc;

use colored::Colorize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use crate::cli::args::{OutputFormat, SyncCommands};
use crate::config::Config;
use crate::error::MarketError;
use crate::features::sync::{
    HttpDispatcher, HttpProbe, Mutation, NetworkStatus, OperationKind, QueueDrainer,
    QueueProducer, QueueStore, ResourceType, ServiceOptions, SyncService,
};
use crate::output::{format_age, format_drain_report, format_queue_pretty, to_json};
use crate::storage::Database;

/// Execute sync subcommands against the default database.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the subcommand
/// fails.
pub async fn sync(
    config: &Config,
    cmd: SyncCommands,
    format: OutputFormat,
) -> Result<String, MarketError> {
    let db = Database::open()?;
    let store = Arc::new(QueueStore::new(Arc::new(db), config.sync.storage_key.clone()));

    match cmd {
        SyncCommands::Status => show_status(&store, format),
        SyncCommands::List { limit } => list_queue(&store, limit, format),
        SyncCommands::Add {
            resource,
            operation,
            id,
            payload,
        } => add_mutation(&store, resource, operation, id, payload.as_deref(), format),
        SyncCommands::Run { dry_run: true } => preview_run(config, &store, format),
        SyncCommands::Run { dry_run: false } => run_once(config, store, format).await,
        SyncCommands::Discard { index } => discard(&store, index, format),
        SyncCommands::Clear { force } => clear(&store, force, format),
        SyncCommands::Watch => watch(config, store, format).await,
    }
}

fn show_status(store: &QueueStore, format: OutputFormat) -> Result<String, MarketError> {
    let entries = store.read_all();
    let oldest = entries.first();

    match format {
        OutputFormat::Json => {
            let data = serde_json::json!({
                "pending": entries.len(),
                "oldest_enqueued_at": oldest
                    .and_then(|e| e.enqueued_at_utc())
                    .map(|t| t.to_rfc3339()),
                "storage_key": store.key(),
            });
            to_json(&data)
        },
        OutputFormat::Pretty => {
            let mut lines = Vec::new();

            lines.push("Offline Queue Status".bold().to_string());
            lines.push("─".repeat(40));
            lines.push(format!(
                "  Pending:  {} {}",
                entries.len(),
                if entries.is_empty() {
                    "".dimmed()
                } else {
                    "mutations waiting".dimmed()
                }
            ));

            if let Some(oldest) = oldest {
                lines.push(format!("  Oldest:   {}", format_age(oldest).dimmed()));
                lines.push(String::new());
                lines.push(
                    "Run 'campus-market sync run' to replay them"
                        .dimmed()
                        .to_string(),
                );
            }

            Ok(lines.join("\n"))
        },
    }
}

fn list_queue(store: &QueueStore, limit: usize, format: OutputFormat) -> Result<String, MarketError> {
    let entries = store.read_all();

    match format {
        OutputFormat::Json => to_json(&entries.iter().take(limit).collect::<Vec<_>>()),
        OutputFormat::Pretty => Ok(format_queue_pretty(&entries, limit)),
    }
}

fn add_mutation(
    store: &Arc<QueueStore>,
    resource: ResourceType,
    operation: OperationKind,
    id: Option<String>,
    payload: Option<&str>,
    format: OutputFormat,
) -> Result<String, MarketError> {
    let payload = payload
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| MarketError::Parse(format!("Payload is not valid JSON: {e}")))?;

    let mutation = Mutation::from_parts(resource, operation, id, payload)?;

    let producer = QueueProducer::new(store.clone());
    let queued = producer
        .enqueue(mutation)
        .ok_or_else(|| MarketError::Database("Failed to persist mutation".to_string()))?;

    match format {
        OutputFormat::Json => to_json(&queued),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} (position {})",
            queued.mutation.label(),
            store.len().saturating_sub(1)
        )),
    }
}

fn preview_run(config: &Config, store: &QueueStore, format: OutputFormat) -> Result<String, MarketError> {
    let dispatcher = HttpDispatcher::new(&config.backend)?;
    let entries = store.read_all();

    let mut planned = Vec::with_capacity(entries.len());
    for entry in &entries {
        let spec = dispatcher
            .request_for(&entry.mutation)
            .map_err(|e| MarketError::Parse(e.to_string()))?;
        planned.push(spec);
    }

    match format {
        OutputFormat::Json => {
            let data: Vec<_> = planned
                .iter()
                .map(|spec| {
                    serde_json::json!({
                        "method": spec.method.as_str(),
                        "url": spec.url.as_str(),
                        "body": spec.body,
                    })
                })
                .collect();
            to_json(&data)
        },
        OutputFormat::Pretty => {
            if planned.is_empty() {
                return Ok("No pending mutations to sync.".to_string());
            }
            let mut lines = vec![format!("Would send {} requests, in order:", planned.len())];
            for (index, spec) in planned.iter().enumerate() {
                lines.push(format!("  {index:<3} {:<6} {}", spec.method.as_str(), spec.url));
            }
            Ok(lines.join("\n"))
        },
    }
}

async fn run_once(
    config: &Config,
    store: Arc<QueueStore>,
    format: OutputFormat,
) -> Result<String, MarketError> {
    let status = Arc::new(NetworkStatus::new(false));
    HttpProbe::new(&config.backend, status.clone())?.check().await;

    let drainer = QueueDrainer::new(
        store,
        Arc::new(HttpDispatcher::new(&config.backend)?),
        status,
        config.sync.dispatch_timeout(),
    );
    let report = drainer.drain().await;

    match format {
        OutputFormat::Json => to_json(&report),
        OutputFormat::Pretty => Ok(format_drain_report(&report)),
    }
}

fn discard(store: &QueueStore, index: usize, format: OutputFormat) -> Result<String, MarketError> {
    let removed = store.discard(index)?;

    match format {
        OutputFormat::Json => to_json(&removed),
        OutputFormat::Pretty => Ok(format!(
            "Discarded {} {}",
            removed.mutation.label(),
            removed.mutation.resource_id().unwrap_or("(new)")
        )),
    }
}

fn clear(store: &QueueStore, force: bool, format: OutputFormat) -> Result<String, MarketError> {
    if !force {
        return Err(MarketError::Config(
            "Use --force to drop every queued mutation".to_string(),
        ));
    }
    let count = store.clear()?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({ "cleared": count })),
        OutputFormat::Pretty => Ok(format!("Cleared {count} queued mutations")),
    }
}

async fn watch(
    config: &Config,
    store: Arc<QueueStore>,
    format: OutputFormat,
) -> Result<String, MarketError> {
    let status = Arc::new(NetworkStatus::new(false));
    let probe = HttpProbe::new(&config.backend, status.clone())?.spawn(config.sync.probe_interval());

    let service = SyncService::start(
        store,
        Arc::new(HttpDispatcher::new(&config.backend)?),
        status,
        ServiceOptions {
            drain_interval: config.sync.drain_interval(),
            dispatch_timeout: config.sync.dispatch_timeout(),
        },
    );
    let mut reports = service.subscribe_reports();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => break,
            report = reports.recv() => match report {
                Ok(report) => {
                    let line = match format {
                        OutputFormat::Json => serde_json::to_string(&report)?,
                        OutputFormat::Pretty => format_drain_report(&report),
                    };
                    println!("{line}");
                },
                Err(RecvError::Lagged(skipped)) => info!(skipped, "drain_reports_lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    probe.abort();
    service.teardown().await;
    Ok(String::new())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received_sigint"),
        () = terminate => info!("received_sigterm"),
    }
}
