//! Per-field client cipher (OpenSSL / CryptoJS passphrase format)
//!
//! Encrypted field format (base64 text):
//! ```text
//! "Salted__" || salt[8] || AES-256-CBC-PKCS7(key, iv, utf8(text))
//! (key[32], iv[16]) = EVP_BytesToKey(MD5, secret, salt, count = 1)
//! ```
//!
//! This is what `CryptoJS.AES.encrypt(text, passphrase)` emits, so values
//! encrypted in a browser decrypt here and vice versa. The random salt makes
//! every encryption of the same value distinct.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;
use regvault_core::types::{is_empty_value, FieldMap};
use regvault_core::{RegError, RegResult};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use zeroize::Zeroize;

use crate::{aes_cbc, IV_SIZE, KEY_SIZE, SALT_SIZE};

const SALT_MAGIC: &[u8; 8] = b"Salted__";

pub struct FieldCipher {
    secret: SecretString,
}

impl FieldCipher {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
        }
    }

    /// Encrypt one field value.
    ///
    /// `null` and `""` encrypt to `""`, so absent optional fields stay
    /// visibly absent. Every other value, strings included, is encrypted as
    /// its JSON text, so `"123"` and `123` stay distinguishable on decrypt.
    pub fn encrypt_field(&self, value: &Value) -> String {
        if is_empty_value(value) {
            return String::new();
        }
        self.encrypt_text(&value.to_string())
    }

    /// Encrypt a text value (empty text stays empty).
    pub fn encrypt_text(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        self.encrypt_with_salt(&salt, text)
    }

    fn encrypt_with_salt(&self, salt: &[u8; SALT_SIZE], text: &str) -> String {
        let (mut key, mut iv) = evp_bytes_to_key(self.secret.expose_secret().as_bytes(), salt);
        let ciphertext = aes_cbc::encrypt(&key, &iv, text.as_bytes());
        key.zeroize();
        iv.zeroize();

        let mut blob = Vec::with_capacity(SALT_MAGIC.len() + SALT_SIZE + ciphertext.len());
        blob.extend_from_slice(SALT_MAGIC);
        blob.extend_from_slice(salt);
        blob.extend_from_slice(&ciphertext);
        STANDARD.encode(blob)
    }

    /// Decrypt one field ciphertext.
    ///
    /// `""` decrypts to `""`. The recovered text is parsed as JSON when it is
    /// valid JSON, otherwise returned as a string. Any failure is a
    /// [`RegError::Decrypt`]; callers that want the lossy display behavior
    /// use [`FieldCipher::decrypt_field_or_empty`].
    pub fn decrypt_field(&self, ciphertext: &str) -> RegResult<Value> {
        if ciphertext.is_empty() {
            return Ok(Value::String(String::new()));
        }
        let text = self.decrypt_text(ciphertext)?;
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    /// Decrypt one field to the exact text the user typed: a JSON string
    /// literal is unwrapped, anything else is returned verbatim. Used for
    /// credential comparison, where `"007"` must not read as `7`.
    pub fn decrypt_field_text(&self, ciphertext: &str) -> RegResult<String> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let text = self.decrypt_text(ciphertext)?;
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(text),
        }
    }

    /// Like [`FieldCipher::decrypt_field`], masking failures as `""`.
    pub fn decrypt_field_or_empty(&self, ciphertext: &str) -> Value {
        self.decrypt_field(ciphertext).unwrap_or_else(|e| {
            tracing::debug!("field decrypt masked: {e}");
            Value::String(String::new())
        })
    }

    /// Decrypt a field held as a JSON value. Only strings are ciphertexts;
    /// `null` reads as `""`.
    pub fn decrypt_value(&self, value: &Value) -> RegResult<Value> {
        match value {
            Value::String(s) => self.decrypt_field(s),
            Value::Null => Ok(Value::String(String::new())),
            other => Err(RegError::Decrypt(format!(
                "field ciphertext must be a string, got {other}"
            ))),
        }
    }

    fn decrypt_text(&self, ciphertext: &str) -> RegResult<String> {
        let blob = STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| RegError::Decrypt(format!("field is not base64: {e}")))?;
        if blob.len() < SALT_MAGIC.len() + SALT_SIZE || &blob[..SALT_MAGIC.len()] != SALT_MAGIC {
            return Err(RegError::Decrypt("field is missing the salt header".into()));
        }

        let (salt, body) = blob[SALT_MAGIC.len()..].split_at(SALT_SIZE);
        let salt: &[u8; SALT_SIZE] = salt
            .try_into()
            .map_err(|_| RegError::Decrypt("truncated salt".into()))?;

        let (mut key, mut iv) = evp_bytes_to_key(self.secret.expose_secret().as_bytes(), salt);
        let result = aes_cbc::decrypt(&key, &iv, body);
        key.zeroize();
        iv.zeroize();

        String::from_utf8(result?)
            .map_err(|_| RegError::Decrypt("decrypted field is not UTF-8".into()))
    }

    /// Encrypt every value of a map, keeping its keys.
    pub fn encrypt_object(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .map(|(name, value)| (name.clone(), Value::String(self.encrypt_field(value))))
            .collect()
    }

    /// Decrypt every value of a map. Fails on the first undecryptable field.
    pub fn decrypt_object(&self, fields: &FieldMap) -> RegResult<FieldMap> {
        fields
            .iter()
            .map(|(name, value)| {
                self.decrypt_value(value)
                    .map(|plain| (name.clone(), plain))
                    .map_err(|e| RegError::Decrypt(format!("{name}: {e}")))
            })
            .collect()
    }

    /// Decrypt every value of a map, showing undecryptable fields as `""`.
    pub fn decrypt_object_lossy(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .map(|(name, value)| {
                let plain = self.decrypt_value(value).unwrap_or_else(|e| {
                    tracing::debug!(field = %name, "field decrypt masked: {e}");
                    Value::String(String::new())
                });
                (name.clone(), plain)
            })
            .collect()
    }
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// OpenSSL `EVP_BytesToKey` with MD5 and a single iteration:
/// `D_i = MD5(D_{i-1} || secret || salt)` until 48 bytes are available.
fn evp_bytes_to_key(secret: &[u8], salt: &[u8; SALT_SIZE]) -> ([u8; KEY_SIZE], [u8; IV_SIZE]) {
    let mut derived = Vec::with_capacity(KEY_SIZE + IV_SIZE + 16);
    let mut prev: Vec<u8> = Vec::new();
    while derived.len() < KEY_SIZE + IV_SIZE {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(secret);
        hasher.update(salt);
        prev = hasher.finalize().to_vec();
        derived.extend_from_slice(&prev);
    }

    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    key.copy_from_slice(&derived[..KEY_SIZE]);
    iv.copy_from_slice(&derived[KEY_SIZE..KEY_SIZE + IV_SIZE]);
    derived.zeroize();
    prev.zeroize();
    (key, iv)
}
