// crates/flagdeck-cli/src/main.rs
// ============================================================================
// Module: Flagdeck CLI Entry Point
// Description: Service launcher for the control, edge, and ingest planes.
// Purpose: Wire settings, stores, and background tasks for each service.
// Dependencies: clap, flagdeck-* service crates, tokio, tracing
// ============================================================================

//! ## Overview
//! One binary, three services: `flagdeck control`, `flagdeck edge`, and
//! `flagdeck ingest`. Every service reads its configuration from `FF_`
//! environment variables, installs a tracing subscriber honoring
//! `RUST_LOG`, and shuts down cleanly on ctrl-c through a shared watch
//! channel that every background worker observes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use flagdeck_bus::BroadcastBus;
use flagdeck_bus::ConfigBus;
use flagdeck_config::ControlSettings;
use flagdeck_config::EdgeSettings;
use flagdeck_config::IngestSettings;
use flagdeck_control::ControlState;
use flagdeck_control::Publisher;
use flagdeck_core::AllowAll;
use flagdeck_core::ConfigSigner;
use flagdeck_core::StaticVerifier;
use flagdeck_core::TokenVerifier;
use flagdeck_distributor::Distributor;
use flagdeck_distributor::HttpConfigFetcher;
use flagdeck_distributor::load_bootstrap;
use flagdeck_edge::EdgeState;
use flagdeck_edge::ExposureEmitter;
use flagdeck_edge::HttpExposureSink;
use flagdeck_edge::spawn_forwarder;
use flagdeck_ingest::EventBuffers;
use flagdeck_ingest::IngestState;
use flagdeck_ingest::MemoryColumnarStore;
use flagdeck_ingest::RetryQueue;
use flagdeck_ingest::spawn_flusher;
use flagdeck_ingest::spawn_retry_worker;
use flagdeck_store::ConfigStore;
use flagdeck_store::MemorySharedCache;
use flagdeck_store::SharedCache;
use flagdeck_store::SqliteConfigStore;
use tokio::net::TcpListener;
use tokio::sync::watch;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Feature-flag and experimentation platform services.
#[derive(Parser)]
#[command(name = "flagdeck", version, about = "Flagdeck service launcher")]
struct Cli {
    /// Service to run.
    #[command(subcommand)]
    command: Command,
}

/// Available services.
#[derive(Subcommand)]
enum Command {
    /// Run the control plane (authoritative config store and publish API).
    Control,
    /// Run an edge evaluator.
    Edge,
    /// Run the event ingest service.
    Ingest,
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "failed to start runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Control => run_control().await,
            Command::Edge => run_edge().await,
            Command::Ingest => run_ingest().await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(error = %message, "service exited with failure");
            ExitCode::FAILURE
        }
    }
}

/// Builds the shutdown channel and arms the ctrl-c handler.
fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    let (sender, receiver) = watch::channel(false);
    let trigger = sender.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = trigger.send(true);
        }
    });
    (sender, receiver)
}

/// Builds a verifier from configured keys, falling back to allow-all.
fn verifier_from_keys(keys: Vec<String>) -> Arc<dyn TokenVerifier> {
    if keys.is_empty() {
        tracing::warn!("no API keys configured; accepting any credential");
        Arc::new(AllowAll)
    } else {
        Arc::new(StaticVerifier::new(keys))
    }
}

// ============================================================================
// SECTION: Control Plane
// ============================================================================

/// Runs the control-plane service until shutdown.
async fn run_control() -> Result<(), String> {
    let settings = ControlSettings::from_env().map_err(|err| err.to_string())?;
    let store: Arc<dyn ConfigStore> =
        Arc::new(SqliteConfigStore::open(&settings.db_path).map_err(|err| err.to_string())?);
    let cache: Arc<dyn SharedCache> = Arc::new(MemorySharedCache::new());
    let bus: Arc<dyn ConfigBus> = Arc::new(BroadcastBus::new());
    let signer = settings.signing_key.as_ref().map(|key| ConfigSigner::new(key.as_bytes()));

    let publisher = Publisher::new(
        Arc::clone(&store),
        cache,
        Arc::clone(&bus),
        signer,
        settings.cache_ttl,
    );
    let state = Arc::new(ControlState {
        publisher,
        store,
        bus,
        verifier: verifier_from_keys(settings.api_keys.clone()),
        heartbeat: settings.heartbeat_interval,
    });

    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .map_err(|err| err.to_string())?;
    tracing::info!(port = settings.port, db = %settings.db_path, "control plane listening");

    let (_shutdown_tx, shutdown_rx) = shutdown_channel();
    flagdeck_control::serve(state, listener, shutdown_rx).await.map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Edge Evaluator
// ============================================================================

/// Runs an edge evaluator until shutdown.
async fn run_edge() -> Result<(), String> {
    let settings = EdgeSettings::from_env().map_err(|err| err.to_string())?;

    let fetcher = HttpConfigFetcher::new(
        settings.control_url.clone(),
        settings.api_key.clone(),
        settings.http_timeout,
    )
    .map_err(|err| err.to_string())?;
    let mut builder = Distributor::builder()
        .fetcher(fetcher)
        .poll_interval(settings.poll_interval)
        .offline(settings.offline);
    if let Some(path) = &settings.bootstrap_path {
        let bootstrap =
            load_bootstrap(std::path::Path::new(path)).map_err(|err| err.to_string())?;
        builder = builder.bootstrap(bootstrap);
    }
    let distributor = Arc::new(builder.build());

    let (_shutdown_tx, shutdown_rx) = shutdown_channel();
    distributor.spawn_poller(shutdown_rx.clone());

    let (emitter, receiver) = ExposureEmitter::new(settings.exposure_queue);
    let sink = HttpExposureSink::new(
        &settings.ingest_url,
        settings.api_key.clone(),
        settings.http_timeout,
    )
    .map_err(|err| err.to_string())?;
    spawn_forwarder(receiver, Arc::new(sink), shutdown_rx.clone(), settings.http_timeout);

    let state = Arc::new(EdgeState {
        distributor,
        emitter,
        verifier: verifier_from_keys(settings.accept_keys.clone()),
        eval_timeout: settings.eval_timeout,
    });
    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .map_err(|err| err.to_string())?;
    tracing::info!(
        port = settings.port,
        control = %settings.control_url,
        "edge evaluator listening"
    );

    flagdeck_edge::serve(state, listener, shutdown_rx).await.map_err(|err| err.to_string())
}

// ============================================================================
// SECTION: Event Ingest
// ============================================================================

/// Runs the ingest service until shutdown.
async fn run_ingest() -> Result<(), String> {
    let settings = IngestSettings::from_env().map_err(|err| err.to_string())?;

    // The bundled columnar store is in-memory; production deployments
    // plug their analytics backend into the ColumnarStore seam.
    let store = Arc::new(MemoryColumnarStore::new());
    let retry = settings.retry_enabled.then(|| Arc::new(RetryQueue::new(settings.retry_capacity)));

    let state = Arc::new(IngestState::new(
        EventBuffers::new(settings.buffer_capacity, settings.flush_threshold),
        Arc::clone(&store) as _,
        retry.clone(),
        verifier_from_keys(settings.api_keys.clone()),
        settings.store_timeout,
    ));

    let (_shutdown_tx, shutdown_rx) = shutdown_channel();
    spawn_flusher(Arc::clone(&state), settings.flush_interval, shutdown_rx.clone());
    if let Some(retry) = retry {
        spawn_retry_worker(
            retry,
            Arc::clone(&store) as _,
            settings.store_timeout,
            shutdown_rx.clone(),
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", settings.port))
        .await
        .map_err(|err| err.to_string())?;
    tracing::info!(port = settings.port, "event ingest listening");

    flagdeck_ingest::serve(state, listener, shutdown_rx, settings.drain_timeout)
        .await
        .map_err(|err| err.to_string())
}
