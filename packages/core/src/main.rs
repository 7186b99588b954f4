use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;

use postpartum_care::{
    alerts::{publisher::AlertPublisher, webhook::WebhookNotifier, LogNotifier, Notifier},
    api::{create_router, AppState},
    care::CareService,
    cli::Cli,
    config::Config,
    db::create_pool,
    error::AppError,
    logging::init_logging,
    metrics::AppMetrics,
    repository::CareRepository,
    services::directory::SqliteDirectory,
};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(err) = run(Cli::parse()).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let config = Config::load(&cli).map_err(AppError::Config)?;
    tracing::info!("Service starting with config: {:?}", config);

    let pool = create_pool(&config.database_url).await?;
    let repository = Arc::new(CareRepository::new(pool.clone()));
    let metrics =
        Arc::new(AppMetrics::new().map_err(|err| AppError::Internal(err.to_string()))?);

    let notifier: Arc<dyn Notifier + Send + Sync> = match &config.alert_webhook_url {
        Some(url) => {
            let webhook = WebhookNotifier::new(url.clone(), config.notify_timeout())
                .map_err(|err| AppError::Config(err.to_string()))?;
            tracing::info!("Publishing urgent alerts to {}", webhook.url());
            Arc::new(webhook)
        }
        None => {
            tracing::warn!("ALERT_WEBHOOK_URL not set; urgent alerts are only logged");
            Arc::new(LogNotifier)
        }
    };

    let publisher = AlertPublisher::new(notifier, repository.clone(), Some(metrics.clone()));
    let service = CareService::new(
        repository.clone(),
        Arc::new(SqliteDirectory::new(pool)),
        publisher,
        config.policy.clone(),
        Some(metrics.clone()),
    );

    let app = create_router(AppState {
        service: Arc::new(service),
        repository,
        metrics,
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|err| AppError::Config(format!("cannot bind {}: {}", config.bind_addr, err)))?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(err.to_string()))?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
}
