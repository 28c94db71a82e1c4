//! OpenDAL Operator factory for the record store

use opendal::Operator;
use regvault_core::config::StorageConfig;
use regvault_core::{RegError, RegResult};
use std::path::PathBuf;

/// Parsed storage connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageUri {
    /// `memory://`
    Memory,
    /// `fs://<path>`
    Fs(PathBuf),
    /// `s3://<bucket>[/<root>]`
    S3 { bucket: String, root: Option<String> },
}

impl StorageUri {
    pub fn parse(uri: &str) -> RegResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| RegError::Config(format!("storage uri has no scheme: {uri}")))?;

        match scheme {
            "memory" => Ok(StorageUri::Memory),
            "fs" if !rest.is_empty() => Ok(StorageUri::Fs(PathBuf::from(rest))),
            "s3" => {
                let (bucket, root) = match rest.split_once('/') {
                    Some((bucket, root)) if !root.trim_matches('/').is_empty() => {
                        (bucket, Some(format!("/{}", root.trim_matches('/'))))
                    }
                    Some((bucket, _)) => (bucket, None),
                    None => (rest, None),
                };
                if bucket.is_empty() {
                    return Err(RegError::Config(format!("s3 uri has no bucket: {uri}")));
                }
                Ok(StorageUri::S3 {
                    bucket: bucket.to_string(),
                    root,
                })
            }
            "fs" => Err(RegError::Config(format!("fs uri has no path: {uri}"))),
            other => Err(RegError::Config(format!(
                "unsupported storage scheme '{other}' (expected memory://, fs://, or s3://)"
            ))),
        }
    }
}

/// Static S3 credentials
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for a parsed connection string.
///
/// S3 uses path-style addressing (the opendal default), which SeaweedFS and
/// MinIO require.
pub fn build_operator(
    uri: &StorageUri,
    storage: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> RegResult<Operator> {
    let op = match uri {
        StorageUri::Memory => Operator::new(opendal::services::Memory::default())
            .map_err(storage_err)?
            .finish(),
        StorageUri::Fs(root) => {
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            Operator::new(builder).map_err(storage_err)?.finish()
        }
        StorageUri::S3 { bucket, root } => {
            let creds = credentials.ok_or_else(|| {
                RegError::Config(
                    "s3 storage needs AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".into(),
                )
            })?;
            let mut builder = opendal::services::S3::default()
                .endpoint(&storage.endpoint)
                .region(&storage.region)
                .bucket(bucket)
                .access_key_id(&creds.access_key_id)
                .secret_access_key(&creds.secret_access_key);
            if let Some(root) = root {
                builder = builder.root(root);
            }
            Operator::new(builder)
                .map_err(storage_err)?
                .layer(
                    opendal::layers::RetryLayer::new()
                        .with_max_times(5)
                        .with_jitter(),
                )
                .finish()
        }
    };

    Ok(op.layer(opendal::layers::LoggingLayer::default()))
}

/// Build an operator from the core storage config.
///
/// If `enforce_tls` is true and an S3 endpoint uses HTTP, this returns an
/// error. Otherwise a warning is logged for non-HTTPS endpoints.
pub fn build_from_core_config(
    storage: &StorageConfig,
    credentials: Option<&S3Credentials>,
) -> RegResult<Operator> {
    let uri = StorageUri::parse(storage.uri()?)?;

    if matches!(uri, StorageUri::S3 { .. }) && storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            return Err(RegError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted. \
             Set storage.enforce_tls = true and use HTTPS in production."
        );
    }
    if uri == StorageUri::Memory {
        tracing::warn!("memory:// storage selected; records are lost when the process exits");
    }

    build_operator(&uri, storage, credentials)
}

fn storage_err(e: opendal::Error) -> RegError {
    RegError::Storage(format!("creating OpenDAL operator: {e}"))
}
