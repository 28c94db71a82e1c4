//! Student form: field flags, client-side validation, listing view

use clap::Args;
use regvault_core::types::{field_text, ListedStudent};
use regvault_core::{FieldMap, RegError, RegResult};
use regvault_crypto::FieldCipher;
use serde_json::Value;

/// Form fields as command-line flags. Unset flags are left out of updates
/// and sent as empty values on registration.
#[derive(Args, Debug, Clone, Default)]
pub struct StudentUpdate {
    #[arg(long)]
    pub full_name: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    #[arg(long)]
    pub dob: Option<String>,
    #[arg(long)]
    pub gender: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub course: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
}

impl StudentUpdate {
    /// `(wire name, value)` for every form field.
    fn entries(&self) -> [(&'static str, Option<&String>); 8] {
        [
            ("fullName", self.full_name.as_ref()),
            ("email", self.email.as_ref()),
            ("phone", self.phone.as_ref()),
            ("dob", self.dob.as_ref()),
            ("gender", self.gender.as_ref()),
            ("address", self.address.as_ref()),
            ("course", self.course.as_ref()),
            ("password", self.password.as_ref()),
        ]
    }

    /// The full plaintext form, unset fields as `""`.
    pub fn to_registration(&self) -> FieldMap {
        self.entries()
            .into_iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    Value::String(value.cloned().unwrap_or_default()),
                )
            })
            .collect()
    }

    /// Overwrite the set fields of a decrypted record.
    pub fn apply_to(&self, fields: &mut FieldMap) {
        for (name, value) in self.entries() {
            if let Some(value) = value {
                fields.insert(name.to_string(), Value::String(value.clone()));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, value)| value.is_none())
    }
}

/// Decrypt the current record, apply `changes`, and re-encrypt the result.
///
/// Every stored field must decrypt with this secret. A record written under
/// another secret is refused rather than resubmitted with blanked fields.
pub fn prepare_update(
    cipher: &FieldCipher,
    current: &ListedStudent,
    changes: &StudentUpdate,
) -> RegResult<FieldMap> {
    let ListedStudent::Fields { id, fields } = current else {
        return Err(RegError::Decrypt(format!(
            "student {} cannot be decrypted by the server",
            current.id()
        )));
    };
    let mut plain = cipher.decrypt_object(fields).map_err(|e| {
        RegError::Decrypt(format!("student {id} has fields this client secret cannot read ({e})"))
    })?;
    changes.apply_to(&mut plain);
    Ok(cipher.encrypt_object(&plain))
}

/// A listing entry after client-side decryption.
#[derive(Debug, Clone, PartialEq)]
pub enum StudentRow {
    Fields { id: String, fields: FieldMap },
    Failed { id: String },
}

impl StudentRow {
    /// Decrypt a listing entry. Undecryptable fields read as `""`.
    pub fn decrypt(cipher: &FieldCipher, item: &ListedStudent) -> Self {
        match item {
            ListedStudent::Fields { id, fields } => StudentRow::Fields {
                id: id.clone(),
                fields: cipher.decrypt_object_lossy(fields),
            },
            ListedStudent::Failed { id, .. } => StudentRow::Failed { id: id.clone() },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            StudentRow::Fields { id, .. } | StudentRow::Failed { id } => id,
        }
    }

    pub fn field(&self, name: &str) -> String {
        match self {
            StudentRow::Fields { fields, .. } => fields.get(name).map(field_text).unwrap_or_default(),
            StudentRow::Failed { .. } => String::new(),
        }
    }

    /// Case-insensitive substring match on name, email and course.
    /// Failed rows only match an empty term.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        if term.is_empty() {
            return true;
        }
        ["fullName", "email", "course"]
            .iter()
            .any(|name| self.field(name).to_lowercase().contains(&term))
    }

    /// One display line.
    pub fn render(&self) -> String {
        match self {
            StudentRow::Failed { id } => format!("{id}  [decrypt_failed]"),
            StudentRow::Fields { id, .. } => {
                let mut line = format!("{id}  {}  <{}>", self.field("fullName"), self.field("email"));
                for name in ["phone", "course", "gender", "dob"] {
                    let value = self.field(name);
                    if !value.is_empty() {
                        line.push_str(&format!("  {name}={value}"));
                    }
                }
                line
            }
        }
    }
}

/// Login form rules: a plausible email and a password of 6+ characters.
pub fn validate_login(email: &str, password: &str) -> Result<(), String> {
    if !is_email_shaped(email) {
        return Err(format!("not a valid email address: {email}"));
    }
    if password.chars().count() < 6 {
        return Err("password must be at least 6 characters".into());
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace and exactly one `@`.
pub fn is_email_shaped(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
