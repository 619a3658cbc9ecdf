//! Backing record store
//!
//! The authoritative source of truth. The cache layers may lose or drop
//! anything; this store may not. Errors from it always reach the caller.
//!
//! Records are grouped by *kind* (a case-sensitive tag such as `"Question"`)
//! and addressed by a [`RecordKey`]. Each record is one opaque blob,
//! however many fields the DTO built from it exposes.

mod memory;

pub use memory::MemoryRecordStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored record
///
/// Numeric ids are allocated by the store; names are supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Id(i64),
    Name(String),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RecordKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Storage representation of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Entity kind tag
    pub kind: String,
    /// `None` until a numeric id has been allocated by `put`
    pub key: Option<RecordKey>,
    /// Serialized payload
    pub data: Vec<u8>,
}

impl Record {
    pub fn new(kind: impl Into<String>, key: Option<RecordKey>, data: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            key,
            data,
        }
    }
}

/// Opaque scan position handed back by [`RecordStore::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCursor(pub String);

/// One page of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    /// Where the next page starts; `None` once the store knows it is done
    pub cursor: Option<ScanCursor>,
}

/// Contract of the authoritative key/value entity store
///
/// Only `get_by_id`, `get_by_name`, `put`, `delete` and `scan` are required;
/// the batched operations fall back to one call per record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by numeric id
    async fn get_by_id(&self, kind: &str, id: i64) -> Result<Option<Record>>;

    /// Fetch a record by caller-supplied name
    async fn get_by_name(&self, kind: &str, name: &str) -> Result<Option<Record>>;

    /// Fetch a record by either kind of key
    async fn get(&self, kind: &str, key: &RecordKey) -> Result<Option<Record>> {
        match key {
            RecordKey::Id(id) => self.get_by_id(kind, *id).await,
            RecordKey::Name(name) => self.get_by_name(kind, name).await,
        }
    }

    /// Fetch many records; the result is aligned with `keys`
    async fn get_multi(&self, kind: &str, keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            records.push(self.get(kind, key).await?);
        }
        Ok(records)
    }

    /// Persist a record, allocating a numeric id if it has no key.
    /// Returns the record's key.
    async fn put(&self, record: Record) -> Result<RecordKey>;

    /// Persist many records; the keys are aligned with `records`
    async fn put_batch(&self, records: Vec<Record>) -> Result<Vec<RecordKey>> {
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            keys.push(self.put(record).await?);
        }
        Ok(keys)
    }

    /// Remove a record; removing a missing record is not an error
    async fn delete(&self, kind: &str, key: &RecordKey) -> Result<()>;

    /// Read one page of a kind, starting after `cursor`
    async fn scan(&self, kind: &str, cursor: Option<&ScanCursor>) -> Result<ScanPage>;

    /// Get the name of this store
    fn name(&self) -> &'static str {
        "unknown"
    }
}
