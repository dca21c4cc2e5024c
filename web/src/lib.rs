//! HTTP surface of the timeline: the post query endpoints, the health probe
//! and the server-sent event stream.

use log::*;
use sea_orm::DatabaseConnection;
use service::config::Config;
use sse::Broadcaster;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

mod controller;
mod error;
mod params;
pub mod router;
mod sse_handler;

pub use self::error::{Error, Result};

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub database_connection: Arc<DatabaseConnection>,
    pub config: Config,
    pub broadcaster: Arc<Broadcaster>,
    /// Cancelled once on process shutdown; every open event stream ends with it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        app_config: Config,
        db: &Arc<DatabaseConnection>,
        broadcaster: &Arc<Broadcaster>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            database_connection: Arc::clone(db),
            config: app_config,
            broadcaster: Arc::clone(broadcaster),
            shutdown,
        }
    }

    pub fn db_conn_ref(&self) -> &DatabaseConnection {
        self.database_connection.as_ref()
    }
}

/// Binds the configured interface and port and serves until `shutdown_signal`
/// resolves. In-flight event streams are expected to end on the same signal
/// through [`AppState::shutdown`].
pub async fn init_server<F>(app_state: AppState, shutdown_signal: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server_url = format!("{}:{}", app_state.config.interface, app_state.config.port);
    let listener = TcpListener::bind(&server_url).await?;

    info!(
        "Timeline API listening on http://{server_url}{}",
        app_state.config.base_path()
    );

    let router = router::define_routes(app_state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal)
        .await
}
