// ABOUTME: PostgreSQL connection management with TLS and retry
// ABOUTME: Spawns the connection task and hands back the client plus its join handle

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, Config};

use crate::utils::retry_with_backoff;

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Set whether self-signed server certificates are accepted.
///
/// Only the first call has an effect; later calls are ignored.
pub fn init_tls_policy(allow_self_signed: bool) {
    let _ = ALLOW_SELF_SIGNED.set(allow_self_signed);
}

fn allow_self_signed() -> bool {
    ALLOW_SELF_SIGNED.get().copied().unwrap_or(false)
}

fn make_tls() -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    if allow_self_signed() {
        tracing::warn!("Accepting self-signed TLS certificates");
        builder.danger_accept_invalid_certs(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// An open client and the task driving its connection.
pub struct Connection {
    pub client: Client,
    pub task: JoinHandle<()>,
}

/// Connect once using the given configuration.
pub async fn connect(config: &Config) -> Result<Connection> {
    let tls = make_tls()?;
    let (client, connection) = config
        .connect(tls)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let task = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(Connection { client, task })
}

/// Connect with up to 3 retries, doubling the delay from 1 second.
pub async fn connect_with_retry(config: &Config) -> Result<Connection> {
    retry_with_backoff(|| connect(config), 3, Duration::from_secs(1)).await
}
