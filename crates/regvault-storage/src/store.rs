//! Student record store
//!
//! Layout: one JSON document per student at `students/<uuid>.json`
//! (`{ _id, encryptedData, createdAt, updatedAt }`). Every write replaces the
//! whole object, which is the unit of atomicity the backend guarantees.

use async_trait::async_trait;
use chrono::Utc;
use opendal::{ErrorKind, Operator};
use regvault_core::{RegError, RegResult, StudentRecord};
use uuid::Uuid;

pub const RECORD_PREFIX: &str = "students/";

/// Create / find / update / delete over opaque sealed blobs.
#[async_trait]
pub trait StudentStore: Send + Sync {
    /// Persist a new record holding `encrypted_data`.
    async fn create(&self, encrypted_data: String) -> RegResult<StudentRecord>;

    /// Up to `limit` records, most recently created first.
    ///
    /// `limit` bounds the result, not the scan: implementations may read
    /// every record to find the newest ones.
    async fn recent(&self, limit: usize) -> RegResult<Vec<StudentRecord>>;

    async fn get(&self, id: &Uuid) -> RegResult<Option<StudentRecord>>;

    /// Replace the sealed blob of an existing record. `None` if absent.
    ///
    /// Not atomic with respect to [`StudentStore::remove`]: a delete that
    /// lands between the existence check and the write is undone.
    async fn replace(&self, id: &Uuid, encrypted_data: String)
        -> RegResult<Option<StudentRecord>>;

    /// Delete a record, returning what was removed. `None` if absent.
    async fn remove(&self, id: &Uuid) -> RegResult<Option<StudentRecord>>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> RegResult<()>;
}

#[derive(Debug, Clone)]
pub struct OpendalStore {
    op: Operator,
}

impl OpendalStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// An in-process store on the OpenDAL memory service.
    pub fn memory() -> RegResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| RegError::Storage(format!("memory operator: {e}")))?
            .finish();
        Ok(Self::new(op))
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Write a record document as-is (create or overwrite).
    pub async fn put(&self, record: &StudentRecord) -> RegResult<()> {
        let body = serde_json::to_vec(record)?;
        self.op
            .write(&record_path(&record.id), body)
            .await
            .map_err(|e| RegError::Storage(format!("writing student {}: {e}", record.id)))?;
        Ok(())
    }

    async fn read_path(&self, path: &str) -> RegResult<Option<StudentRecord>> {
        match self.op.read(path).await {
            Ok(buf) => Ok(Some(serde_json::from_slice(&buf.to_vec())?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegError::Storage(format!("reading {path}: {e}"))),
        }
    }
}

#[async_trait]
impl StudentStore for OpendalStore {
    async fn create(&self, encrypted_data: String) -> RegResult<StudentRecord> {
        let record = StudentRecord::new(encrypted_data);
        self.put(&record).await?;
        tracing::debug!(id = %record.id, "student record created");
        Ok(record)
    }

    // Documents carry no ordering in their paths, so every one under the
    // prefix is read and parsed before the sort and truncate.
    async fn recent(&self, limit: usize) -> RegResult<Vec<StudentRecord>> {
        let entries = match self.op.list(RECORD_PREFIX).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RegError::Storage(format!("listing students: {e}"))),
        };

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            if !path.ends_with(".json") {
                continue;
            }
            match self.read_path(path).await {
                Ok(Some(record)) => records.push(record),
                // Deleted between list and read
                Ok(None) => {}
                Err(RegError::Serialization(e)) => {
                    tracing::warn!(path = %path, "skipping unreadable student document: {e}");
                }
                Err(e) => return Err(e),
            }
        }

        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn get(&self, id: &Uuid) -> RegResult<Option<StudentRecord>> {
        self.read_path(&record_path(id)).await
    }

    async fn replace(
        &self,
        id: &Uuid,
        encrypted_data: String,
    ) -> RegResult<Option<StudentRecord>> {
        // get-then-put: a concurrent remove between the two is overwritten
        let Some(mut record) = self.get(id).await? else {
            return Ok(None);
        };
        record.encrypted_data = encrypted_data;
        record.updated_at = Utc::now();
        self.put(&record).await?;
        Ok(Some(record))
    }

    async fn remove(&self, id: &Uuid) -> RegResult<Option<StudentRecord>> {
        let Some(record) = self.get(id).await? else {
            return Ok(None);
        };
        self.op
            .delete(&record_path(id))
            .await
            .map_err(|e| RegError::Storage(format!("deleting student {id}: {e}")))?;
        Ok(Some(record))
    }

    async fn ping(&self) -> RegResult<()> {
        crate::health::check_health(&self.op).await
    }
}

fn record_path(id: &Uuid) -> String {
    format!("{RECORD_PREFIX}{id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record_at(secs: i64, data: &str) -> StudentRecord {
        let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        StudentRecord {
            id: Uuid::new_v4(),
            encrypted_data: data.into(),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = OpendalStore::memory().unwrap();
        let record = store.create("aa:bb".into()).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.created_at, loaded.updated_at);
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = OpendalStore::memory().unwrap();
        assert!(store.get(&Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_empty_store() {
        let store = OpendalStore::memory().unwrap();
        assert!(store.recent(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_capped() {
        let store = OpendalStore::memory().unwrap();
        for (secs, data) in [(10, "second"), (0, "first"), (20, "third")] {
            store.put(&record_at(secs, data)).await.unwrap();
        }

        let all = store.recent(100).await.unwrap();
        let order: Vec<&str> = all.iter().map(|r| r.encrypted_data.as_str()).collect();
        assert_eq!(order, ["third", "second", "first"]);

        let capped = store.recent(2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].encrypted_data, "third");
    }

    #[tokio::test]
    async fn test_replace_keeps_created_at() {
        let store = OpendalStore::memory().unwrap();
        let original = record_at(0, "old");
        store.put(&original).await.unwrap();

        let updated = store.replace(&original.id, "new".into()).await.unwrap().unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.encrypted_data, "new");
        assert_eq!(updated.created_at, original.created_at);
        assert!(updated.updated_at > original.updated_at + Duration::seconds(1));

        let loaded = store.get(&original.id).await.unwrap().unwrap();
        assert_eq!(loaded.encrypted_data, "new");
    }

    #[tokio::test]
    async fn test_replace_missing_returns_none() {
        let store = OpendalStore::memory().unwrap();
        assert!(store.replace(&Uuid::new_v4(), "x".into()).await.unwrap().is_none());
        assert!(store.recent(10).await.unwrap().is_empty(), "replace must not upsert");
    }

    #[tokio::test]
    async fn test_replace_after_remove_stays_removed() {
        let store = OpendalStore::memory().unwrap();
        let record = store.create("aa:bb".into()).await.unwrap();
        store.remove(&record.id).await.unwrap();

        assert!(store.replace(&record.id, "cc:dd".into()).await.unwrap().is_none());
        assert!(store.get(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = OpendalStore::memory().unwrap();
        let record = store.create("aa:bb".into()).await.unwrap();

        let removed = store.remove(&record.id).await.unwrap().unwrap();
        assert_eq!(removed.id, record.id);
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.remove(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_skips_unparseable_documents() {
        let store = OpendalStore::memory().unwrap();
        store.put(&record_at(0, "good")).await.unwrap();
        store
            .operator()
            .write("students/garbage.json", b"{not json".to_vec())
            .await
            .unwrap();

        let all = store.recent(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].encrypted_data, "good");
    }

    #[tokio::test]
    async fn test_recent_limit_picks_newest_regardless_of_listing_order() {
        let store = OpendalStore::memory().unwrap();
        for secs in (0..20).rev() {
            store.put(&record_at(secs, &secs.to_string())).await.unwrap();
        }

        let newest = store.recent(1).await.unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].encrypted_data, "19");
    }

    #[tokio::test]
    async fn test_ping() {
        let store = OpendalStore::memory().unwrap();
        assert!(store.ping().await.is_ok());
    }
}
