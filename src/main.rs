use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use dotenv::dotenv;
use log::{debug, info};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use watch_sync_lib::{
    cli::parse_args,
    clock::SystemClock,
    config::Config,
    db::establish_pg_store,
    logging::{format_error_report, init_logging},
    remote::{build_global_rate_limiter, ClientRegistry},
    reporting::TracingReporter,
    server::setup_server_with_addr,
    state::AppState,
    sync_service::{
        types::{BatchSize, SyncRunSummary},
        Error, SchedulerKind, SyncOrchestrator,
    },
};

/// Stops the metrics server when a SIGTERM or SIGINT signal is received.
async fn handle_shutdown_signals(state: Arc<AppState>) {
    let (Ok(mut sigterm), Ok(mut sigint)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        tracing::warn!(event = "signal_handler_failed", "could not register signal handlers");
        return;
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down.");
        }
        _ = sigint.recv() => {
            info!("SIGINT received, shutting down.");
        }
        _ = state.shutdown_token.cancelled() => {}
    }

    state.shutdown_token.cancel();
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let logging = init_logging("checkwatches", "info");
    let args = parse_args();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(event = "config_invalid", error = %err, "configuration is invalid");
            return ExitCode::from(2);
        }
    };
    debug!("Config loaded");

    // Tracker adapters are linked in by the deployment and registered here.
    let registry = ClientRegistry::new()
        .with_rate_limiter(build_global_rate_limiter(config.remote_requests_per_second));
    if registry.is_empty() {
        tracing::error!(
            event = "no_tracker_adapters",
            "no tracker adapters are registered, nothing can be synchronized"
        );
        return ExitCode::FAILURE;
    }
    info!(
        "Registered tracker kinds: {:?}",
        registry.kinds().collect::<Vec<_>>()
    );

    let jobs = args.jobs.unwrap_or(config.sync_jobs);
    let pool_size = u32::try_from(jobs.saturating_add(1)).unwrap_or(u32::MAX);
    let store = match establish_pg_store(&config.db_url, pool_size) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::error!(
                event = "database_unavailable",
                error = %format_error_report(&err),
                "could not open the watch database"
            );
            return ExitCode::FAILURE;
        }
    };

    let state = Arc::new(AppState::new(CancellationToken::new()));
    let shutdown_handle = tokio::spawn(handle_shutdown_signals(state.clone()));
    let server_handle = match config.metrics_addr {
        Some(addr) => match setup_server_with_addr(state.clone(), addr).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(
                    event = "metrics_server_unavailable",
                    error = %err,
                    addr = %addr,
                    "continuing without metrics server"
                );
                None
            }
        },
        None => None,
    };

    let orchestrator = SyncOrchestrator::new(
        store,
        Arc::new(registry),
        Arc::new(TracingReporter::new(logging.run_id.clone())),
        Arc::new(SystemClock),
    );

    let batch_size = args.batch_size.map(BatchSize::from_count).or(config.batch_size);
    let scheduler = SchedulerKind::from_worker_count(jobs);

    let start_time = Instant::now();
    info!("Beginning watch synchronization");
    let outcome = if args.reset {
        reset_and_resync(&orchestrator, &args.trackers, batch_size).await
    } else {
        orchestrator.run_all(&args.trackers, batch_size, scheduler).await
    };
    info!("Synchronization time elapsed: {:?}", start_time.elapsed());

    state.shutdown_token.cancel();
    let _ = shutdown_handle.await;
    if let Some(handle) = server_handle {
        let _ = handle.await;
    }

    match outcome {
        Ok(summary) if summary.failed() == 0 => ExitCode::SUCCESS,
        Ok(summary) => {
            tracing::warn!(
                event = "sync_run_incomplete",
                failed = summary.failed(),
                "some trackers failed to synchronize"
            );
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!(
                event = "sync_run_failed",
                error = %format_error_report(&err),
                "sync run aborted"
            );
            ExitCode::FAILURE
        }
    }
}

async fn reset_and_resync(
    orchestrator: &SyncOrchestrator,
    trackers: &[String],
    batch_size: Option<BatchSize>,
) -> Result<SyncRunSummary, Error> {
    let mut combined = SyncRunSummary::default();
    for tracker in trackers {
        let summary = orchestrator.force_full_resync(tracker, batch_size).await?;
        combined.trackers.extend(summary.trackers);
    }
    combined.trackers.sort_by(|left, right| left.tracker.cmp(&right.tracker));
    Ok(combined)
}
