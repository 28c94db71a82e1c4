//! Server-side record envelope
//!
//! Envelope format (text):
//! ```text
//! hex(iv[16]) ":" hex(AES-256-CBC-PKCS7(server_key, iv, plaintext))
//! ```
//!
//! The IV is freshly random for every call, so sealing the same field map
//! twice never yields the same envelope.

use regvault_core::{RegError, RegResult};
use serde::{de::DeserializeOwned, Serialize};

use crate::keys::ServerKey;
use crate::{aes_cbc, IV_SIZE};

const SEPARATOR: char = ':';

#[derive(Debug, Clone)]
pub struct EnvelopeCipher {
    key: ServerKey,
}

impl EnvelopeCipher {
    pub fn new(key: ServerKey) -> Self {
        Self { key }
    }

    /// Construct from the configured server secret (must be exactly 32 bytes).
    pub fn from_secret(secret: &str) -> RegResult<Self> {
        ServerKey::from_secret(secret).map(Self::new)
    }

    /// Seal `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> String {
        self.encrypt_with_iv(&aes_cbc::random_iv(), plaintext)
    }

    fn encrypt_with_iv(&self, iv: &[u8; IV_SIZE], plaintext: &str) -> String {
        let ciphertext = aes_cbc::encrypt(self.key.as_bytes(), iv, plaintext.as_bytes());
        format!("{}{SEPARATOR}{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Open an envelope.
    ///
    /// - [`RegError::Format`]: no separator, an empty half, bad hex, or an IV
    ///   that is not 16 bytes
    /// - [`RegError::Decrypt`]: bad ciphertext length, bad padding, or
    ///   non-UTF-8 plaintext (typically the wrong key)
    pub fn decrypt(&self, envelope: &str) -> RegResult<String> {
        let (iv_hex, ct_hex) = envelope
            .split_once(SEPARATOR)
            .ok_or_else(|| RegError::Format("missing ':' separator".into()))?;
        if iv_hex.is_empty() || ct_hex.is_empty() {
            return Err(RegError::Format("empty iv or ciphertext segment".into()));
        }

        let iv: [u8; IV_SIZE] = hex::decode(iv_hex)
            .map_err(|e| RegError::Format(format!("iv is not hex: {e}")))?
            .try_into()
            .map_err(|v: Vec<u8>| {
                RegError::Format(format!("iv must be {IV_SIZE} bytes (got {})", v.len()))
            })?;
        let ciphertext = hex::decode(ct_hex)
            .map_err(|e| RegError::Format(format!("ciphertext is not hex: {e}")))?;

        let plaintext = aes_cbc::decrypt(self.key.as_bytes(), &iv, &ciphertext)?;
        String::from_utf8(plaintext)
            .map_err(|_| RegError::Decrypt("decrypted envelope is not UTF-8".into()))
    }

    /// Serialize `value` to JSON and seal it.
    pub fn encrypt_json<T: Serialize>(&self, value: &T) -> RegResult<String> {
        let json = serde_json::to_string(value)?;
        Ok(self.encrypt(&json))
    }

    /// Open an envelope and parse its JSON payload.
    pub fn decrypt_json<T: DeserializeOwned>(&self, envelope: &str) -> RegResult<T> {
        let json = self.decrypt(envelope)?;
        Ok(serde_json::from_str(&json)?)
    }
}
