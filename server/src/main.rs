use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use relay_server::config::RelayConfig;
use relay_server::db::migrations::run_migrations;
use relay_server::db::pool::{close, create_pool};
use relay_server::db::queries::stats;
use relay_server::engine::reconciler;
use relay_server::engine::roster::FileRoster;
use relay_server::engine::routing::RoutedMessage;
use relay_server::engine::server_registry::ServerRegistry;
use relay_server::engine::task_registry::TaskRegistry;

#[derive(Parser)]
#[command(about = "Persistence and routing state for the translation relay")]
struct Args {
    /// Path to the TOML config file.
    #[arg(long, default_value = "relay.toml")]
    config: String,

    /// Roster snapshot (JSON) to reconcile against. Overrides the config file.
    #[arg(long)]
    roster: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = RelayConfig::load(&args.config)?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .init();

    let pool = create_pool(&config.database.url).await?;

    if let Err(e) = run_migrations(&pool).await {
        error!(error = %e, "schema upgrade failed, refusing to start");
        close(&pool).await;
        return Err(e.into());
    }

    let roster_path = args
        .roster
        .or_else(|| config.roster.path.as_ref().map(PathBuf::from));
    let roster = match roster_path {
        Some(path) => FileRoster::load(&path)?,
        None => {
            info!("no roster snapshot configured, reconciling against an empty roster");
            FileRoster::default()
        }
    };

    let defaults = config.to_server_defaults();
    let reconciled = reconciler::initialize(&pool, &roster, &defaults).await?;
    if !reconciled.skipped.is_empty() {
        error!(skipped = ?reconciled.skipped, "some servers could not be stored this pass");
    }

    let servers = ServerRegistry::new(pool.clone(), reconciled.cache, defaults);
    let tasks = TaskRegistry::new(pool.clone());

    // Routed messages are handed to the translation stage through this channel.
    // The chat client feeds `tasks.route_message(.., &routed_tx)`.
    let (routed_tx, mut routed_rx) = mpsc::unbounded_channel::<RoutedMessage>();
    let translator = tokio::spawn(async move {
        while let Some(routed) = routed_rx.recv().await {
            match &routed.error {
                Some(e) => error!(origin = %routed.origin, error = %e, "routing failed"),
                None => debug!(origin = %routed.origin, tasks = routed.tasks.len(), "message routed"),
            }
        }
    });

    match stats::bot_stats(&pool).await {
        Ok(totals) => info!(
            servers = servers.server_count(),
            members = servers.total_members(),
            active_servers = totals.active_servers,
            active_tasks = totals.active_tasks,
            "relay state ready"
        ),
        Err(e) => error!(error = %e, "failed to read startup stats"),
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    drop(routed_tx);
    drop(tasks);
    if let Err(e) = translator.await {
        error!(error = %e, "translation consumer panicked");
    }

    close(&pool).await;
    Ok(())
}
