use crate::error::Error;
use async_trait::async_trait;
use events::RawNotification;
use log::*;
use sqlx::postgres::PgListener;

/// A long-lived subscription that yields upstream notifications one at a time.
#[async_trait]
pub trait NotificationSource: Send + 'static {
    /// Wait for the next notification. An `Err` is a transport failure; the
    /// listener logs it and calls `recv` again.
    async fn recv(&mut self) -> Result<RawNotification, Error>;
}

/// Postgres `LISTEN` subscription.
///
/// `PgListener` owns its own connection, separate from the sea-orm pool used
/// for queries: the subscription has to stay on the same backend for its
/// whole lifetime.
pub struct PgNotificationSource {
    listener: PgListener,
}

impl PgNotificationSource {
    /// Open the dedicated connection and issue `LISTEN` for every channel.
    pub async fn connect(database_url: &str, channels: &[&str]) -> Result<Self, Error> {
        let mut listener = PgListener::connect(database_url)
            .await
            .map_err(Error::connection)?;

        listener
            .listen_all(channels.iter().copied())
            .await
            .map_err(Error::connection)?;

        info!("PostgreSQL LISTEN started on channel(s) {channels:?}");

        Ok(Self { listener })
    }
}

#[async_trait]
impl NotificationSource for PgNotificationSource {
    async fn recv(&mut self) -> Result<RawNotification, Error> {
        let notification = self.listener.recv().await.map_err(Error::transport)?;
        Ok(RawNotification::new(
            notification.channel(),
            notification.payload(),
        ))
    }
}
