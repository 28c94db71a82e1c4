//! regvault-crypto: two-layer encryption for student records
//!
//! Layers:
//! ```text
//! Field Cipher (client secret, per value)
//!   value → "U2FsdGVkX1..."   base64("Salted__" || salt[8] || AES-256-CBC(EVP_BytesToKey(secret, salt)))
//!
//! Envelope Cipher (server key, per record)
//!   JSON(field map) → "ivHex:cipherHex"   AES-256-CBC, random 16-byte IV per call
//! ```
//!
//! Neither layer is authenticated: tampering is only caught when it happens
//! to break the PKCS#7 padding or UTF-8 decoding.

mod aes_cbc;
pub mod envelope;
pub mod field;
pub mod keys;

pub use envelope::EnvelopeCipher;
pub use field::FieldCipher;
pub use keys::ServerKey;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// AES block / CBC IV size in bytes
pub const IV_SIZE: usize = 16;

/// Salt size of the OpenSSL-compatible field format
pub const SALT_SIZE: usize = 8;
