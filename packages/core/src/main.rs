use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::watch;

use missed_bolus_detector::{
    alerts::{pushover::PushoverNotifier, AlertStateStore},
    api,
    cli::Cli,
    clock::SystemClock,
    config::Config,
    db,
    detection::{nightscout_adapter::NightscoutDataProvider, MissedBolusDetector},
    error::AppError,
    logging::init_logging,
    metrics::AppMetrics,
    repository::AlertRepository,
    scheduler::{CycleOutcome, PollCycle, PollSettings},
    services::nightscout::NightscoutClient,
};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging();

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(err.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::from_env().map_err(AppError::Config)?;
    config.apply_cli(&cli).map_err(AppError::Config)?;
    tracing::info!("Service started with config: {:?}", config);

    let pool = db::create_pool(&config.state_db_url).await?;
    let repository = AlertRepository::new(pool);
    let store = AlertStateStore::load(repository.clone(), config.alert_policy.clone()).await?;

    let client = NightscoutClient::new(
        config.nightscout_url.clone(),
        config.nightscout_token.expose().to_string(),
        config.request_timeout,
    )
    .map_err(|e| AppError::Config(format!("Failed to build remote client: {}", e)))?;
    let provider = Arc::new(NightscoutDataProvider::new(
        client,
        config.entries_count,
        config.treatments_count,
    ));

    let notifier = Arc::new(
        PushoverNotifier::new(
            config.pushover_api_url.clone(),
            config.pushover_api_token.expose().to_string(),
            config.pushover_user_key.expose().to_string(),
            config.request_timeout,
        )
        .map_err(|e| AppError::Config(format!("Failed to build notifier: {}", e)))?,
    );

    let app_metrics = Arc::new(
        AppMetrics::new().map_err(|e| AppError::Config(format!("Failed to register metrics: {}", e)))?,
    );

    let mut cycle = PollCycle::new(
        provider,
        notifier,
        Arc::new(SystemClock),
        store,
        MissedBolusDetector::new(config.detection.clone()),
        PollSettings::from_config(&config),
    )
    .with_metrics(app_metrics.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(listen_for_shutdown(shutdown_tx));

    if let Some(addr) = config.metrics_addr {
        let app = api::status_router(repository, app_metrics);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(addr, app, rx).await {
                tracing::error!("Status server error: {}", e);
            }
        });
    }

    if cli.once {
        return match cycle.run_cycle().await {
            CycleOutcome::Completed(_) => Ok(()),
            CycleOutcome::Skipped(err) => Err(err),
        };
    }

    cycle.run(shutdown_rx).await
}

/// Flip the shutdown flag on SIGINT or SIGTERM. The poll loop finishes its
/// current cycle before it looks at the flag.
async fn listen_for_shutdown(tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received. Stopping after the current cycle.");
    let _ = tx.send(true);
}
