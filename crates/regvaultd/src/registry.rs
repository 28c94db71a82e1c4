//! Registration pipelines: seal, persist, open, compare
//!
//! Every record is stored as one envelope around the JSON field map the client
//! sent. Field values inside that map stay encrypted with the client secret;
//! only login opens them, to compare the stored email and password.

use std::sync::Arc;

use regvault_core::config::LimitsConfig;
use regvault_core::types::{strip_identity, validate_registration, ListedStudent};
use regvault_core::{FieldMap, RegError, RegResult, StudentRecord};
use regvault_crypto::{EnvelopeCipher, FieldCipher};
use regvault_storage::StudentStore;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{LoginOutcome, Metrics};

pub struct StudentRegistry {
    store: Arc<dyn StudentStore>,
    envelope: EnvelopeCipher,
    fields: FieldCipher,
    limits: LimitsConfig,
    metrics: Arc<Metrics>,
}

impl StudentRegistry {
    pub fn new(
        store: Arc<dyn StudentStore>,
        envelope: EnvelopeCipher,
        fields: FieldCipher,
        limits: LimitsConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            envelope,
            fields,
            limits,
            metrics,
        }
    }

    /// Validate, seal and persist a new registration.
    pub async fn register(&self, body: Value) -> RegResult<Uuid> {
        let fields = into_field_map(body)?;
        validate_registration(&fields)?;
        let sealed = self.seal(fields)?;

        let record = self.store.create(sealed).await?;
        self.metrics.registrations.inc();
        info!(id = %record.id, "student registered");
        Ok(record.id)
    }

    /// Most recent records first, each opened or marked `decrypt_failed`.
    pub async fn list(&self) -> RegResult<Vec<ListedStudent>> {
        let records = self.store.recent(self.limits.list_max).await?;
        let mut listed = Vec::with_capacity(records.len());
        for record in &records {
            match self.open(record) {
                Ok(fields) => listed.push(ListedStudent::Fields {
                    id: record.id.to_string(),
                    fields,
                }),
                Err(e) if e.is_decrypt_failure() => listed.push(ListedStudent::failed(&record.id)),
                Err(e) => return Err(e),
            }
        }
        Ok(listed)
    }

    /// Replace the whole sealed map of an existing record.
    pub async fn update(&self, id: &str, body: Value) -> RegResult<Uuid> {
        let id = parse_id(id)?;
        let fields = into_field_map(body)?;
        let sealed = self.seal(fields)?;

        match self.store.replace(&id, sealed).await? {
            Some(record) => {
                self.metrics.updates.inc();
                info!(id = %record.id, "student updated");
                Ok(record.id)
            }
            None => Err(not_found(&id)),
        }
    }

    pub async fn delete(&self, id: &str) -> RegResult<Uuid> {
        let id = parse_id(id)?;
        match self.store.remove(&id).await? {
            Some(record) => {
                self.metrics.deletes.inc();
                info!(id = %record.id, "student deleted");
                Ok(record.id)
            }
            None => Err(not_found(&id)),
        }
    }

    /// Scan the most recent records for one whose stored email and password
    /// decrypt to the submitted values. `None` means no match.
    pub async fn login(&self, email: &str, password: &str) -> RegResult<Option<Uuid>> {
        let records = self.store.recent(self.limits.login_scan_max).await?;

        for record in &records {
            let fields = match self.open(record) {
                Ok(fields) => fields,
                Err(e) if e.is_decrypt_failure() => continue,
                Err(e) => return Err(e),
            };
            if self.field_matches(&fields, "email", email)
                && self.field_matches(&fields, "password", password)
            {
                self.metrics.login(LoginOutcome::Success);
                info!(id = %record.id, "login matched");
                return Ok(Some(record.id));
            }
        }

        self.metrics.login(LoginOutcome::Failure);
        debug!(scanned = records.len(), "login did not match");
        Ok(None)
    }

    /// Storage reachability, for readiness probes.
    pub async fn ready(&self) -> RegResult<()> {
        self.store.ping().await
    }

    fn seal(&self, mut fields: FieldMap) -> RegResult<String> {
        strip_identity(&mut fields);
        self.envelope.encrypt_json(&fields)
    }

    fn open(&self, record: &StudentRecord) -> RegResult<FieldMap> {
        let opened = self
            .envelope
            .decrypt_json::<Value>(&record.encrypted_data)
            .and_then(|value| match value {
                Value::Object(mut fields) => {
                    strip_identity(&mut fields);
                    Ok(fields)
                }
                other => Err(RegError::Format(format!(
                    "sealed payload is not an object: {}",
                    json_kind(&other)
                ))),
            });

        match &opened {
            Err(e) if e.is_decrypt_failure() => {
                self.metrics.decrypt_failures.inc();
                warn!(id = %record.id, "student envelope failed to open: {e}");
            }
            _ => {}
        }
        opened
    }

    /// Compare the exact decrypted text, so `"007"` never matches `"7"`.
    fn field_matches(&self, fields: &FieldMap, name: &str, submitted: &str) -> bool {
        let Some(Value::String(stored)) = fields.get(name) else {
            return false;
        };
        match self.fields.decrypt_field_text(stored) {
            Ok(plain) => plain == submitted,
            Err(e) => {
                debug!(field = name, "stored field did not decrypt: {e}");
                false
            }
        }
    }
}

fn into_field_map(body: Value) -> RegResult<FieldMap> {
    match body {
        Value::Object(fields) => Ok(fields),
        other => Err(RegError::Validation(format!(
            "request body must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

/// Ids that are not UUIDs cannot name a record.
fn parse_id(id: &str) -> RegResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| RegError::NotFound(format!("student {id}")))
}

fn not_found(id: &Uuid) -> RegError {
    RegError::NotFound(format!("student {id}"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regvault_core::config::DEFAULT_CLIENT_SECRET;
    use regvault_storage::OpendalStore;
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    struct Fixture {
        store: Arc<OpendalStore>,
        registry: StudentRegistry,
        client: FieldCipher,
        metrics: Arc<Metrics>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(OpendalStore::memory().unwrap());
        let metrics = Arc::new(Metrics::new());
        let registry = StudentRegistry::new(
            store.clone(),
            EnvelopeCipher::from_secret(SECRET).unwrap(),
            FieldCipher::new(DEFAULT_CLIENT_SECRET),
            LimitsConfig::default(),
            metrics.clone(),
        );
        Fixture {
            store,
            registry,
            client: FieldCipher::new(DEFAULT_CLIENT_SECRET),
            metrics,
        }
    }

    fn encrypted(client: &FieldCipher, plain: Value) -> Value {
        Value::Object(client.encrypt_object(plain.as_object().unwrap()))
    }

    #[tokio::test]
    async fn test_register_then_list() {
        let f = fixture();
        let body = encrypted(
            &f.client,
            json!({"fullName": "Ann", "email": "a@x.com", "password": "secret1"}),
        );
        let id = f.registry.register(body).await.unwrap();

        let listed = f.registry.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        let ListedStudent::Fields { id: listed_id, fields } = &listed[0] else {
            panic!("expected decrypted entry, got {:?}", listed[0]);
        };
        assert_eq!(listed_id, &id.to_string());
        assert_eq!(f.client.decrypt_object(fields).unwrap()["email"], "a@x.com");
        assert_eq!(f.metrics.registrations.get(), 1);
    }

    #[tokio::test]
    async fn test_stored_blob_is_an_envelope() {
        let f = fixture();
        let id = f
            .registry
            .register(json!({"fullName": "x", "email": "y"}))
            .await
            .unwrap();

        let record = f.store.get(&id).await.unwrap().unwrap();
        let (iv, ct) = record.encrypted_data.split_once(':').unwrap();
        assert_eq!(iv.len(), 32);
        assert!(!ct.is_empty());
        assert!(!record.encrypted_data.contains("fullName"));
    }

    #[tokio::test]
    async fn test_register_requires_name_and_email() {
        let f = fixture();
        let err = f
            .registry
            .register(json!({"fullName": "Ann", "email": ""}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegError::Validation(_)));

        let err = f.registry.register(json!(["not", "a", "map"])).await.unwrap_err();
        assert!(matches!(err, RegError::Validation(_)));
        assert!(f.store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_strips_client_identity() {
        let f = fixture();
        let id = f
            .registry
            .register(json!({"_id": "mine", "id": "also-mine", "fullName": "a", "email": "b"}))
            .await
            .unwrap();

        let listed = f.registry.list().await.unwrap();
        let ListedStudent::Fields { id: listed_id, fields } = &listed[0] else {
            panic!("expected decrypted entry");
        };
        assert_eq!(listed_id, &id.to_string());
        assert!(!fields.contains_key("_id"));
        assert!(!fields.contains_key("id"));
    }

    #[tokio::test]
    async fn test_one_corrupt_envelope_among_many() {
        let f = fixture();
        for name in ["a", "b", "c"] {
            f.registry
                .register(json!({"fullName": name, "email": format!("{name}@x.com")}))
                .await
                .unwrap();
        }
        let bad = f.store.create("not-an-envelope".into()).await.unwrap();

        let listed = f.registry.list().await.unwrap();
        assert_eq!(listed.len(), 4);
        let failed: Vec<_> = listed
            .iter()
            .filter(|item| matches!(item, ListedStudent::Failed { .. }))
            .collect();
        assert_eq!(failed, vec![&ListedStudent::failed(&bad.id)]);
        assert_eq!(f.metrics.decrypt_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_foreign_key_and_non_object_payloads_are_marked() {
        let f = fixture();
        let other = EnvelopeCipher::from_secret("ffffffffffffffffffffffffffffffff").unwrap();
        f.store
            .create(other.encrypt(r#"{"fullName":"x"}"#))
            .await
            .unwrap();
        let envelope = EnvelopeCipher::from_secret(SECRET).unwrap();
        f.store.create(envelope.encrypt("[1,2,3]")).await.unwrap();
        f.store.create(envelope.encrypt("{truncated")).await.unwrap();

        let listed = f.registry.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed
            .iter()
            .all(|item| matches!(item, ListedStudent::Failed { error, .. } if error == "decrypt_failed")));

        for record in f.store.recent(10).await.unwrap() {
            let err = f.registry.open(&record).unwrap_err();
            assert!(err.is_decrypt_failure(), "{err:?} must read as a decrypt failure");
        }
    }

    #[tokio::test]
    async fn test_list_is_capped() {
        let store = Arc::new(OpendalStore::memory().unwrap());
        let registry = StudentRegistry::new(
            store,
            EnvelopeCipher::from_secret(SECRET).unwrap(),
            FieldCipher::new(DEFAULT_CLIENT_SECRET),
            LimitsConfig {
                list_max: 2,
                ..Default::default()
            },
            Arc::new(Metrics::new()),
        );
        for i in 0..3 {
            registry
                .register(json!({"fullName": i.to_string(), "email": "e"}))
                .await
                .unwrap();
        }
        assert_eq!(registry.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_replaces_wholesale() {
        let f = fixture();
        let id = f
            .registry
            .register(json!({"fullName": "Ann", "email": "a@x.com", "course": "math"}))
            .await
            .unwrap();

        let updated = f
            .registry
            .update(&id.to_string(), json!({"fullName": "Ann B"}))
            .await
            .unwrap();
        assert_eq!(updated, id);

        let listed = f.registry.list().await.unwrap();
        let ListedStudent::Fields { fields, .. } = &listed[0] else {
            panic!("expected decrypted entry");
        };
        assert_eq!(fields.get("fullName"), Some(&json!("Ann B")));
        assert!(fields.get("course").is_none());
        assert_eq!(f.metrics.updates.get(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_or_malformed_id() {
        let f = fixture();
        let err = f
            .registry
            .update(&Uuid::new_v4().to_string(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, RegError::NotFound(_)));

        let err = f.registry.update("not-a-uuid", json!({})).await.unwrap_err();
        assert!(matches!(err, RegError::NotFound(_)));
        assert!(f.store.recent(10).await.unwrap().is_empty(), "update must not upsert");
    }

    #[tokio::test]
    async fn test_delete() {
        let f = fixture();
        let id = f
            .registry
            .register(json!({"fullName": "a", "email": "b"}))
            .await
            .unwrap();

        assert_eq!(f.registry.delete(&id.to_string()).await.unwrap(), id);
        assert!(f.registry.list().await.unwrap().is_empty());

        let err = f.registry.delete(&id.to_string()).await.unwrap_err();
        assert!(matches!(err, RegError::NotFound(_)));
        assert_eq!(f.metrics.deletes.get(), 1);
    }

    #[tokio::test]
    async fn test_login_decrypts_and_compares() {
        let f = fixture();
        let id = f
            .registry
            .register(encrypted(
                &f.client,
                json!({"fullName": "Ann", "email": "a@x.com", "password": "secret1"}),
            ))
            .await
            .unwrap();

        assert_eq!(f.registry.login("a@x.com", "secret1").await.unwrap(), Some(id));
        assert_eq!(f.registry.login("a@x.com", "wrong").await.unwrap(), None);
        assert_eq!(f.registry.login("b@x.com", "secret1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_with_numeric_looking_credentials() {
        let f = fixture();
        let id = f
            .registry
            .register(encrypted(
                &f.client,
                json!({"fullName": "Num", "email": "n@x.com", "password": "123456789012345678901234"}),
            ))
            .await
            .unwrap();
        let padded = f
            .registry
            .register(encrypted(
                &f.client,
                json!({"fullName": "Pad", "email": "p@x.com", "password": "007007"}),
            ))
            .await
            .unwrap();

        assert_eq!(
            f.registry.login("n@x.com", "123456789012345678901234").await.unwrap(),
            Some(id)
        );
        assert_eq!(f.registry.login("p@x.com", "007007").await.unwrap(), Some(padded));
        assert_eq!(f.registry.login("p@x.com", "7007").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_accepts_raw_text_fields() {
        let f = fixture();
        let id = f
            .registry
            .register(json!({
                "fullName": f.client.encrypt_text("Ann"),
                "email": f.client.encrypt_text("a@x.com"),
                "password": f.client.encrypt_text("1.50e3"),
            }))
            .await
            .unwrap();

        assert_eq!(f.registry.login("a@x.com", "1.50e3").await.unwrap(), Some(id));
        assert_eq!(f.registry.login("a@x.com", "1500").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_skips_unreadable_records() {
        let f = fixture();
        f.store.create("garbage".into()).await.unwrap();
        f.registry
            .register(json!({"fullName": "plain", "email": "not-ciphertext", "password": "x"}))
            .await
            .unwrap();
        let id = f
            .registry
            .register(encrypted(
                &f.client,
                json!({"fullName": "Ann", "email": "a@x.com", "password": "secret1"}),
            ))
            .await
            .unwrap();

        assert_eq!(f.registry.login("a@x.com", "secret1").await.unwrap(), Some(id));
        assert_eq!(f.registry.login("not-ciphertext", "x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ready() {
        let f = fixture();
        assert!(f.registry.ready().await.is_ok());
    }
}
