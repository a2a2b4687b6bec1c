use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gymdesk::{
    api,
    clock::{Clock, SystemClock},
    config::Settings,
    jobs::{self, Job},
    notifications::LogNotifier,
    payments::{BillingGateway, DisabledGateway, StripeClient},
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gymdesk=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting Gymdesk server on {}:{}", settings.server.host, settings.server.port);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let stripe_client = if settings.stripe.enabled {
        match (settings.stripe.secret_key.clone(), settings.stripe.webhook_secret.clone()) {
            (Some(api_key), Some(webhook_secret)) => {
                tracing::info!("Stripe payment processing enabled");
                Some(Arc::new(StripeClient::new(api_key, webhook_secret)))
            }
            _ => {
                tracing::warn!("Stripe enabled but missing configuration");
                None
            }
        }
    } else {
        tracing::info!("Stripe payment processing disabled");
        None
    };

    let gateway: Arc<dyn BillingGateway> = match &stripe_client {
        Some(client) => client.clone() as Arc<dyn BillingGateway>,
        None => Arc::new(DisabledGateway),
    };
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let service_context = Arc::new(ServiceContext::new(db_pool.clone(), &settings, clock, gateway));
    service_context.dispatcher.register(Arc::new(LogNotifier)).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut background = Vec::new();

    if settings.jobs.enabled {
        let reminders: Arc<dyn Job> = service_context.reminders.clone();
        background.push(jobs::spawn_job(
            reminders,
            Duration::from_secs(settings.jobs.reminder_interval_minutes.max(1) * 60),
            shutdown_rx.clone(),
        ));

        let reconciler: Arc<dyn Job> = service_context.reconciler.clone();
        background.push(jobs::spawn_job(
            reconciler,
            Duration::from_secs(settings.jobs.reconciliation_interval_hours.max(1) * 3600),
            shutdown_rx.clone(),
        ));

        let dispatcher = service_context.dispatcher.clone();
        let poll = Duration::from_secs(settings.jobs.outbox_poll_seconds.max(1));
        let rx = shutdown_rx.clone();
        background.push(tokio::spawn(async move { dispatcher.run(poll, rx).await }));
    } else {
        tracing::info!("Background jobs disabled");
    }

    let app = api::create_app(service_context, stripe_client, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background jobs");
    shutdown_tx.send(true).ok();
    for handle in background {
        if let Err(e) = handle.await {
            tracing::error!("Background task ended abnormally: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
