//! regvaultd: student registration daemon
//!
//! Usage:
//!   regvaultd [--config regvault.toml] [--listen 0.0.0.0:5000]
//!
//! SERVER_SECRET (exactly 32 bytes) and STORAGE_URI are required, either in
//! the config file or the environment.

mod api;
mod daemon;
mod metrics;
mod registry;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use regvault_core::config::RegvaultConfig;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "regvaultd", version, about = "regvault student registration daemon")]
struct Cli {
    /// Path to regvault.toml configuration file
    #[arg(long, short = 'c', env = "REGVAULT_CONFIG", default_value = "regvault.toml")]
    config: PathBuf,

    /// HTTP listen address (overrides server.listen)
    #[arg(long, env = "REGVAULT_LISTEN")]
    listen: Option<String>,

    /// Listen on 0.0.0.0:<port> (overrides server.listen)
    #[arg(long, env = "PORT", conflicts_with = "listen")]
    port: Option<u16>,

    /// Envelope key, exactly 32 bytes (overrides envelope.server_secret)
    #[arg(long, env = "SERVER_SECRET", hide_env_values = true)]
    server_secret: Option<String>,

    /// Client field secret used for login checks (overrides field.secret)
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Storage connection string: memory://, fs://<path>, s3://<bucket>
    #[arg(long, env = "STORAGE_URI")]
    storage_uri: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REGVAULT_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "REGVAULT_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "regvaultd starting"
    );

    let mut config = RegvaultConfig::load(&cli.config)?;
    apply_overrides(&cli, &mut config);

    daemon::run(config).await
}

/// Command-line and environment values win over the config file.
fn apply_overrides(cli: &Cli, config: &mut RegvaultConfig) {
    if let Some(listen) = &cli.listen {
        config.server.listen = listen.clone();
    }
    if let Some(port) = cli.port {
        config.server.listen = format!("0.0.0.0:{port}");
    }
    if let Some(secret) = &cli.server_secret {
        config.envelope.server_secret = Some(secret.clone());
    }
    if let Some(secret) = &cli.client_secret {
        config.field.secret = secret.clone();
    }
    if let Some(uri) = &cli.storage_uri {
        config.storage.uri = Some(uri.clone());
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    // Built directly instead of parsed, so PORT or REGVAULT_LISTEN on the
    // host cannot leak in.
    fn cli(listen: Option<&str>, port: Option<u16>) -> Cli {
        Cli {
            config: PathBuf::from("regvault.toml"),
            listen: listen.map(str::to_string),
            port,
            server_secret: Some("0123456789abcdef0123456789abcdef".into()),
            client_secret: Some("other".into()),
            storage_uri: Some("memory://".into()),
            log: "info".into(),
            log_format: LogFormat::Text,
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = RegvaultConfig::default();
        apply_overrides(&cli(None, Some(8080)), &mut config);

        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.storage.uri.as_deref(), Some("memory://"));
        assert_eq!(config.field.secret, "other");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_listen_override() {
        let mut config = RegvaultConfig::default();
        apply_overrides(&cli(Some("127.0.0.1:9000"), None), &mut config);
        assert_eq!(config.server.listen, "127.0.0.1:9000");
    }
}
