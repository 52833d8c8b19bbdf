use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, Router};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

use storefront_api::{
    api_v1_routes,
    config::{init_tracing, load_config},
    db::{establish_connection_from_app_config, run_migrations},
    events::{process_events, EventSender},
    services::{
        notifications::{MerchantNotifier, NullNotifier, WebhookNotifier},
        payments::{PaymentGateway, RazorpayGateway},
        AppServices,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(load_config()?);
    init_tracing(config.log_level(), config.log_json);

    info!(
        environment = %config.environment,
        "Starting storefront settlement API"
    );

    let db = Arc::new(establish_connection_from_app_config(&config).await?);
    if config.auto_migrate {
        run_migrations(&db).await?;
        info!("Database migrations applied");
    }

    let (event_tx, event_rx) = mpsc::channel(1000);
    tokio::spawn(process_events(event_rx));
    let event_sender = Arc::new(EventSender::new(event_tx));

    if !config.gateway_configured() {
        warn!("Payment gateway credentials are not configured; online payments will be rejected");
    }
    let gateway: Arc<dyn PaymentGateway> = Arc::new(RazorpayGateway::from_config(&config)?);
    let notifier: Arc<dyn MerchantNotifier> = match &config.merchant_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
        None => Arc::new(NullNotifier),
    };

    let services = AppServices::new(
        db.clone(),
        event_sender.clone(),
        gateway,
        notifier,
        config.currency.clone(),
        config.delivery_charge_minor,
    );

    let state = AppState {
        db,
        config: config.clone(),
        event_sender,
        services,
    };

    let cors = match &config.cors_allowed_origins {
        Some(origins) => {
            let parsed = origins
                .split(',')
                .filter_map(|o| o.trim().parse::<axum::http::HeaderValue>().ok())
                .collect::<Vec<_>>();
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None if config.is_development() => CorsLayer::permissive(),
        None => CorsLayer::new(),
    };

    let app = Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
