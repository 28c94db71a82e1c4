//! Server envelope key

use regvault_core::config::SERVER_SECRET_LEN;
use regvault_core::{RegError, RegResult};
use zeroize::Zeroize;

use crate::KEY_SIZE;

/// The 256-bit envelope key, taken byte-for-byte from the server secret.
/// Zeroized on drop.
#[derive(Clone)]
pub struct ServerKey {
    bytes: [u8; KEY_SIZE],
}

impl ServerKey {
    /// Build the key from the configured secret. The UTF-8 byte length must
    /// be exactly 32; anything else is a configuration error.
    pub fn from_secret(secret: &str) -> RegResult<Self> {
        let raw = secret.as_bytes();
        if raw.len() != SERVER_SECRET_LEN {
            return Err(RegError::Config(format!(
                "server secret must be exactly {SERVER_SECRET_LEN} bytes (got {})",
                raw.len()
            )));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ServerKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
