use serde::Deserialize;
use std::path::Path;

use crate::error::{RegError, RegResult};

/// Required byte length of the envelope (server) secret
pub const SERVER_SECRET_LEN: usize = 32;

/// Fallback client secret, matching the stock browser client build
pub const DEFAULT_CLIENT_SECRET: &str = "client_demo_secret_123";

/// Top-level daemon configuration (loaded from regvault.toml)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegvaultConfig {
    pub server: ServerConfig,
    pub envelope: EnvelopeConfig,
    pub field: FieldConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP listen address for the HTTP API (default: 0.0.0.0:5000)
    pub listen: String,
    /// Maximum accepted JSON body size in bytes (default: 5 MiB)
    pub body_limit_bytes: usize,
    /// Serve Prometheus text format on /metrics
    pub metrics: bool,
}

/// Server-side envelope key. Required; exactly 32 bytes.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    pub server_secret: Option<String>,
}

/// Client-side field cipher secret. The daemon only needs it for login checks.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Connection string: memory://, fs://<path>, or s3://<bucket>. Required.
    pub uri: Option<String>,
    /// S3 endpoint (s3:// only)
    pub endpoint: String,
    /// S3 region (s3:// only)
    pub region: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum records returned by GET /api/students
    pub list_max: usize,
    /// Maximum records scanned by POST /api/login
    pub login_scan_max: usize,
}

impl RegvaultConfig {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> RegResult<Self> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "config file not found (using defaults)");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| RegError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Check the settings the daemon cannot start without.
    pub fn validate(&self) -> RegResult<()> {
        self.envelope.secret()?;
        self.storage.uri()?;
        if self.limits.list_max == 0 || self.limits.login_scan_max == 0 {
            return Err(RegError::Config("limits must be greater than zero".into()));
        }
        Ok(())
    }
}

impl EnvelopeConfig {
    /// The configured server secret, checked for presence and length.
    pub fn secret(&self) -> RegResult<&str> {
        let secret = self
            .server_secret
            .as_deref()
            .ok_or_else(|| RegError::Config("SERVER_SECRET is not set".into()))?;
        if secret.len() != SERVER_SECRET_LEN {
            return Err(RegError::Config(format!(
                "SERVER_SECRET must be exactly {SERVER_SECRET_LEN} bytes (got {})",
                secret.len()
            )));
        }
        Ok(secret)
    }
}

impl FieldConfig {
    pub fn is_default(&self) -> bool {
        self.secret == DEFAULT_CLIENT_SECRET
    }
}

impl StorageConfig {
    pub fn uri(&self) -> RegResult<&str> {
        match self.uri.as_deref() {
            Some(uri) if !uri.trim().is_empty() => Ok(uri.trim()),
            _ => Err(RegError::Config("STORAGE_URI is not set".into())),
        }
    }
}

impl std::fmt::Debug for EnvelopeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeConfig")
            .field(
                "server_secret",
                &self.server_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl std::fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".into(),
            body_limit_bytes: 5 * 1024 * 1024,
            metrics: true,
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            secret: DEFAULT_CLIENT_SECRET.into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uri: None,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            enforce_tls: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            list_max: 100,
            login_scan_max: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_32: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:8080"
body_limit_bytes = 1024
metrics = false

[envelope]
server_secret = "0123456789abcdef0123456789abcdef"

[field]
secret = "another-client-secret"

[storage]
uri = "fs:///var/lib/regvault"
endpoint = "https://s3.example.com"
region = "eu-west-1"
enforce_tls = true

[limits]
list_max = 25
login_scan_max = 200
"#;
        let config: RegvaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(config.server.body_limit_bytes, 1024);
        assert!(!config.server.metrics);
        assert_eq!(config.envelope.secret().unwrap(), SECRET_32);
        assert_eq!(config.field.secret, "another-client-secret");
        assert!(!config.field.is_default());
        assert_eq!(config.storage.uri().unwrap(), "fs:///var/lib/regvault");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.limits.list_max, 25);
        assert_eq!(config.limits.login_scan_max, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config: RegvaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:5000");
        assert_eq!(config.server.body_limit_bytes, 5 * 1024 * 1024);
        assert!(config.server.metrics);
        assert!(config.field.is_default());
        assert_eq!(config.limits.list_max, 100);
        assert_eq!(config.limits.login_scan_max, 1000);
        assert!(config.envelope.server_secret.is_none());
        assert!(config.storage.uri.is_none());
    }

    #[test]
    fn test_defaults_do_not_validate() {
        let config = RegvaultConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RegError::Config(_)));
        assert!(err.to_string().contains("SERVER_SECRET"));
    }

    #[test]
    fn test_short_server_secret_rejected() {
        let config = RegvaultConfig {
            envelope: EnvelopeConfig {
                server_secret: Some("0123456789".into()),
            },
            storage: StorageConfig {
                uri: Some("memory://".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RegError::Config(_)));
        assert!(err.to_string().contains("got 10"));
    }

    #[test]
    fn test_missing_storage_uri_rejected() {
        let config = RegvaultConfig {
            envelope: EnvelopeConfig {
                server_secret: Some(SECRET_32.into()),
            },
            storage: StorageConfig {
                uri: Some("   ".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("STORAGE_URI"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = RegvaultConfig {
            envelope: EnvelopeConfig {
                server_secret: Some(SECRET_32.into()),
            },
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains(SECRET_32));
        assert!(!debug.contains(DEFAULT_CLIENT_SECRET));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = RegvaultConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:5000");
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("regvault.toml");
        std::fs::write(&path, "[server\nlisten = ").unwrap();
        let err = RegvaultConfig::load(&path).unwrap_err();
        assert!(matches!(err, RegError::Config(_)));
    }
}
