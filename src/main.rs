use asset_lifecycle::config::LifecycleConfig;
use asset_lifecycle::infrastructure::{database, storage};
use asset_lifecycle::services::events::{EventChannel, EventConsumer};
use asset_lifecycle::services::lifecycle::LifecycleService;
use asset_lifecycle::services::scheduler::CleanupScheduler;
use asset_lifecycle::services::storage::StorageService;
use asset_lifecycle::{AppState, create_app};
use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Administrative HTTP API only
    Api,
    /// Event consumer and cleanup scheduler only
    Worker,
    /// Both in one process
    All,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Reference-counted asset lifecycle service")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::All, env = "LIFECYCLE_MODE")]
    mode: Mode,

    #[arg(long, default_value_t = 3000, env = "PORT")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asset_lifecycle=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting asset lifecycle service ({:?} mode)...", args.mode);

    let config = LifecycleConfig::from_env();
    info!(
        "🧹 Cleanup Config: enabled={}, temp max age={}h, orphan grace={}h, interval={}m, auto orphan cleanup={}",
        config.cleanup_enabled,
        config.temp_max_age_hours,
        config.orphan_grace_period_hours,
        config.cleanup_interval_minutes,
        config.orphan_auto_cleanup
    );
    if config.admin_secret.is_none() {
        tracing::warn!("⚠️  ADMIN_SECRET is not set, administrative routes will reject every request");
    }

    // Setup Infrastructure
    let db = database::setup_database().await?;
    let storage_service: Arc<dyn StorageService> = storage::setup_storage().await?;
    let events = Arc::new(EventChannel::new(
        config.event_topic_prefix.clone(),
        config.event_channel_capacity,
    ));

    let shutdown = CancellationToken::new();
    let service = Arc::new(
        LifecycleService::new(db, storage_service, Arc::clone(&events), config.clone())
            .with_shutdown(shutdown.clone()),
    );

    let mut workers = Vec::new();
    if matches!(args.mode, Mode::Worker | Mode::All) {
        let consumer = EventConsumer::with_stock_handlers(
            Arc::clone(&events),
            Arc::clone(&service),
            &config,
            shutdown.child_token(),
        );
        workers.push(consumer.spawn(shutdown.child_token()));

        if config.cleanup_enabled {
            let scheduler = CleanupScheduler::new(Arc::clone(&service), &config);
            let token = shutdown.child_token();
            workers.push(tokio::spawn(async move { scheduler.run(token).await }));
        } else {
            info!("⏸️  Scheduled cleanup disabled");
        }
    }

    if matches!(args.mode, Mode::Api | Mode::All) {
        let app = create_app(AppState::new(Arc::clone(&service))).layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id,
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        );

        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        info!("✅ Server ready at http://{}", addr);
        info!("📖 Swagger UI: http://{}/swagger-ui", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let token = shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                token.cancel();
            })
            .await?;
    } else {
        shutdown_signal().await;
        shutdown.cancel();
    }

    for handle in workers {
        if let Err(e) = handle.await {
            tracing::error!("Background task ended abnormally: {}", e);
        }
    }

    info!("🛑 Service shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
