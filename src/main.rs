//! Transfer Sequencer - asynchronous money-transfer service
//!
//! ```text
//! ┌─────────┐    ┌────────┐    ┌───────────┐    ┌─────────┐    ┌────────┐
//! │ Gateway │───▶│ Intake │───▶│ Sequencer │───▶│ Workers │───▶│ Ledger │
//! │ (HTTP)  │    │(admit) │    │(per-client│    │ (pool)  │    │(PG/mem)│
//! └─────────┘    └────────┘    │   FIFO)   │    └─────────┘    └────────┘
//!                              └───────────┘
//! ```
//!
//! Flags: `--env/-e <name>` (config/<name>.yaml), `--port <n>`, `--memory`.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use transfer_sequencer::config::AppConfig;
use transfer_sequencer::db::PoolConfig;
use transfer_sequencer::gateway::{self, state::AppState};
use transfer_sequencer::ledger::{Client, InMemoryLedger, LedgerStore, PgLedger};
use transfer_sequencer::service::TransferService;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

fn use_memory_ledger() -> bool {
    std::env::args().any(|a| a == "--memory")
}

async fn open_ledger(config: &AppConfig) -> anyhow::Result<Arc<dyn LedgerStore>> {
    if use_memory_ledger() {
        let ledger = InMemoryLedger::with_clients(
            config
                .seed_clients
                .iter()
                .map(|c| Client::new(c.id, c.name.clone(), c.token.clone(), c.balance)),
        );
        tracing::info!(
            clients = config.seed_clients.len(),
            "Using in-memory ledger"
        );
        return Ok(Arc::new(ledger));
    }

    let url = config
        .postgres_url
        .as_deref()
        .context("postgres_url (or DATABASE_URL) is required unless --memory is given")?;
    let ledger = PgLedger::connect(url, &PoolConfig::for_workers(config.engine.workers))
        .await
        .context("Failed to connect to PostgreSQL")?;
    ledger.init_schema().await?;
    tracing::info!("Using PostgreSQL ledger");
    Ok(Arc::new(ledger))
}

/// Cancel `shutdown` on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received SIGINT"),
            _ = terminate => tracing::info!("Received SIGTERM"),
            _ = shutdown.cancelled() => return,
        }
        shutdown.cancel();
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = transfer_sequencer::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting transfer sequencer"
    );

    let ledger = open_ledger(&app_config).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let service = TransferService::start(&app_config.engine, ledger.clone(), shutdown.clone());
    let recovery = service.spawn_recovery();

    let state = Arc::new(AppState::new(ledger, service.intake().clone()));
    let served = gateway::run_server(&app_config.gateway, state, shutdown.clone()).await;

    // Server exits on shutdown or on a bind/serve failure
    service.shutdown();
    if let Err(e) = recovery.await {
        tracing::error!(error = %e, "Recovery task panicked");
    }
    service.join().await;

    tracing::info!("Transfer sequencer stopped");
    served
}
