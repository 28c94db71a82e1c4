//! Daemon lifecycle: key setup, storage health check, systemd notify, HTTP server

use std::sync::Arc;

use anyhow::{Context, Result};
use regvault_core::config::RegvaultConfig;
use regvault_crypto::{EnvelopeCipher, FieldCipher};
use regvault_storage::{OpendalStore, S3Credentials, StudentStore};
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::metrics::Metrics;
use crate::registry::StudentRegistry;

pub async fn run(config: RegvaultConfig) -> Result<()> {
    info!("daemon starting");

    let state = build_state(&config)?;

    match state.registry.ready().await {
        Ok(()) => info!(uri = ?config.storage.uri, "storage: connected"),
        // Keep serving; /readyz reports the outage
        Err(e) => warn!(uri = ?config.storage.uri, "storage: {e}"),
    }

    let app = api::router(
        state,
        config.server.body_limit_bytes,
        config.server.metrics,
    );
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;

    info!(addr = %config.server.listen, "http: listening");
    notify_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("daemon stopped");
    Ok(())
}

/// Build the ciphers, store and registry. Fails before anything is served if
/// the server secret or storage uri is unusable.
pub fn build_state(config: &RegvaultConfig) -> Result<AppState> {
    config.validate().context("invalid configuration")?;

    let envelope = EnvelopeCipher::from_secret(config.envelope.secret()?)
        .context("building envelope cipher")?;

    if config.field.is_default() {
        warn!("CLIENT_SECRET not set; using the demo client secret");
    }
    let fields = FieldCipher::new(config.field.secret.clone());

    let credentials = s3_credentials_from_env();
    let op = regvault_storage::build_from_core_config(&config.storage, credentials.as_ref())
        .context("building storage operator")?;
    let store: Arc<dyn StudentStore> = Arc::new(OpendalStore::new(op));

    let metrics = Arc::new(Metrics::new());
    let registry = StudentRegistry::new(
        store,
        envelope,
        fields,
        config.limits.clone(),
        metrics.clone(),
    );

    Ok(AppState {
        registry: Arc::new(registry),
        metrics,
    })
}

fn s3_credentials_from_env() -> Option<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
    Some(S3Credentials {
        access_key_id,
        secret_access_key,
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("ctrl-c handler failed: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler failed: {e}");
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
    info!("shutdown signal received");
}

fn notify_ready() {
    // Send sd_notify(READY=1) to systemd if running as a service
    // Uses $NOTIFY_SOCKET env var; no-op if not set
    #[cfg(unix)]
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
