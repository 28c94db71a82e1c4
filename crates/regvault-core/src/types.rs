use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RegError, RegResult};

/// Field names of the registration form
pub const FIELD_NAMES: [&str; 8] = [
    "fullName", "email", "phone", "dob", "gender", "address", "course", "password",
];

/// Fields a registration must carry (non-empty)
pub const REQUIRED_FIELDS: [&str; 2] = ["fullName", "email"];

/// Client-supplied identity keys stripped before a map is sealed
pub const IDENTITY_KEYS: [&str; 2] = ["_id", "id"];

/// Per-item marker for a record whose envelope could not be opened
pub const DECRYPT_FAILED: &str = "decrypt_failed";

/// Field name → value (plaintext or field ciphertext)
pub type FieldMap = serde_json::Map<String, Value>;

/// A persisted student document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    /// Envelope (`ivHex:cipherHex`) around the JSON field map
    pub encrypted_data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentRecord {
    pub fn new(encrypted_data: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            encrypted_data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One entry of the GET /api/students response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListedStudent {
    Failed {
        id: String,
        error: String,
    },
    Fields {
        id: String,
        #[serde(flatten)]
        fields: FieldMap,
    },
}

impl ListedStudent {
    pub fn failed(id: &Uuid) -> Self {
        ListedStudent::Failed {
            id: id.to_string(),
            error: DECRYPT_FAILED.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ListedStudent::Failed { id, .. } | ListedStudent::Fields { id, .. } => id,
        }
    }
}

/// `{ id, message }` body returned by register, update, delete and login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAck {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Drop client-supplied identity keys so a body can never pick its own id.
pub fn strip_identity(fields: &mut FieldMap) {
    for key in IDENTITY_KEYS {
        fields.remove(key);
    }
}

/// Required-field check for a registration body.
pub fn validate_registration(fields: &FieldMap) -> RegResult<()> {
    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|name| fields.get(*name).map_or(true, is_empty_value))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegError::Validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// `null` and `""` count as absent.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Text form of a decrypted field, for display and comparison.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
