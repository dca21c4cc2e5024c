use events::{HandlerRegistry, TIMELINE_POSTS_CHANNEL};
use listener::{PgNotificationSource, UpstreamListener};
use log::*;
use migration::{Migrator, MigratorTrait};
use service::{config::Config, logging::Logger};
use sse::{Broadcaster, NewPostBroadcastHandler};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start the logger: {e}");
    }

    info!(
        "Starting the Agent Timeline API [{}] in {} mode",
        env!("CARGO_PKG_VERSION"),
        config.runtime_env()
    );

    let db = match service::init_database(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };

    if config.run_migrations {
        if let Err(e) = Migrator::up(db.as_ref(), None).await {
            error!("Failed to apply database migrations: {e}");
            std::process::exit(1);
        }
    }

    let broadcaster = Arc::new(Broadcaster::new());

    let handlers = Arc::new(HandlerRegistry::new());
    handlers.register(
        TIMELINE_POSTS_CHANNEL,
        Arc::new(NewPostBroadcastHandler::new(Arc::clone(&broadcaster))),
    );

    // LISTEN holds its connection for the life of the process, so it gets its
    // own instead of borrowing one from the pool.
    let source = match PgNotificationSource::connect(
        config.database_url(),
        &[TIMELINE_POSTS_CHANNEL],
    )
    .await
    {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to listen on '{TIMELINE_POSTS_CHANNEL}': {e}");
            std::process::exit(1);
        }
    };

    let upstream = UpstreamListener::new(Arc::clone(&handlers));
    if let Err(e) = upstream.start(source) {
        error!("Failed to start the notification listener: {e}");
        std::process::exit(1);
    }

    let shutdown = CancellationToken::new();
    let app_state = AppState::new(config, &db, &broadcaster, shutdown.clone());

    let on_signal = shutdown.clone();
    let served = web::init_server(app_state, async move {
        shutdown_signal().await;
        info!("Shutdown requested, closing event streams");
        on_signal.cancel();
    })
    .await;

    shutdown.cancel();
    upstream.stop().await;

    if let Err(e) = served {
        error!("Server stopped with an error: {e}");
        std::process::exit(1);
    }

    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
