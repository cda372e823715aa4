//! Request record persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::RequestRecord;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt request store {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("request id {id} already exists")]
    Duplicate { id: String },

    #[error("request {id} not found")]
    NotFound { id: String },
}

/// Keyed storage for request records
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Add a new record. Fails if the id is taken.
    async fn insert(&self, record: RequestRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<RequestRecord>, StoreError>;

    /// Replace an existing record
    async fn update(&self, record: &RequestRecord) -> Result<(), StoreError>;

    /// Drop every record whose window has passed; returns how many were removed
    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

type Records = IndexMap<String, RequestRecord>;

fn insert_record(records: &mut Records, record: RequestRecord) -> Result<(), StoreError> {
    if records.contains_key(&record.id) {
        return Err(StoreError::Duplicate { id: record.id });
    }
    records.insert(record.id.clone(), record);
    Ok(())
}

fn update_record(records: &mut Records, record: &RequestRecord) -> Result<(), StoreError> {
    match records.get_mut(&record.id) {
        Some(slot) => {
            *slot = record.clone();
            Ok(())
        }
        None => Err(StoreError::NotFound {
            id: record.id.clone(),
        }),
    }
}

fn purge(records: &mut Records, now: DateTime<Utc>, window: chrono::Duration) -> usize {
    let before = records.len();
    records.retain(|_, r| !r.is_expired(now, window));
    before - records.len()
}

/// In-process store; records are lost on restart
#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    records: Mutex<Records>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for MemoryRequestStore {
    async fn insert(&self, record: RequestRecord) -> Result<(), StoreError> {
        insert_record(&mut *self.records.lock().await, record)
    }

    async fn get(&self, id: &str) -> Result<Option<RequestRecord>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update(&self, record: &RequestRecord) -> Result<(), StoreError> {
        update_record(&mut *self.records.lock().await, record)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<usize, StoreError> {
        Ok(purge(&mut *self.records.lock().await, now, window))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.lock().await.len())
    }
}

/// Store backed by a single JSON document.
///
/// Every mutation rewrites the file through a temp file and a rename, so a
/// crash leaves either the old or the new document.
#[derive(Debug)]
pub struct JsonFileRequestStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileRequestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn load(&self) -> Result<Records, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Records::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Records::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, records: &Records) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!("Saved {} request record(s) to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl RequestStore for JsonFileRequestStore {
    async fn insert(&self, record: RequestRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        insert_record(&mut records, record)?;
        self.save(&records).await
    }

    async fn get(&self, id: &str) -> Result<Option<RequestRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.shift_remove(id))
    }

    async fn update(&self, record: &RequestRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        update_record(&mut records, record)?;
        self.save(&records).await
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
        window: chrono::Duration,
    ) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;
        let removed = purge(&mut records, now, window);
        if removed > 0 {
            self.save(&records).await?;
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.len())
    }
}
