//! Generic record DAOs
//!
//! One [`RecordDao`] per entity kind. Each record is stored as one JSON
//! object blob; the DAO reads through and writes through the cache facade,
//! and the store stays authoritative.
//!
//! # Example
//!
//! ```rust,no_run
//! use record_cache::dao::{DaoConfig, KeyStrategy, RecordDao, RecordDto};
//! use record_cache::store::MemoryRecordStore;
//! use record_cache::CacheSystem;
//! use std::sync::Arc;
//!
//! # async fn example() -> record_cache::Result<()> {
//! let system = CacheSystem::in_memory();
//! let questions: RecordDao<RecordDto> = RecordDao::new(
//!     Arc::new(MemoryRecordStore::new()),
//!     DaoConfig::new("Question", KeyStrategy::NumericId).track_last_modified(),
//! );
//!
//! let cache = system.facade();
//! let mut dto = RecordDto::new(None, serde_json::Map::new());
//! let id = questions.save(&cache, &mut dto).await?;
//! let loaded = questions.load(&cache, Some(&id)).await?;
//! # Ok(())
//! # }
//! ```

mod record_dao;

pub use record_dao::RecordDao;

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::store::{Record, RecordKey};

/// Field stamped by last-modified DAOs
pub const LAST_MODIFIED_FIELD: &str = "last_modified";

/// Field read by [`Dto::description`]
pub const DESCRIPTION_FIELD: &str = "description";

/// In-memory view of one record: an optional key plus a JSON object
///
/// DTOs are never what gets stored; the DAO encodes [`Dto::dict`] into the
/// record payload.
pub trait Dto: Clone + Send + Sync + 'static {
    fn from_parts(id: Option<RecordKey>, dict: Map<String, Value>) -> Self;

    fn id(&self) -> Option<&RecordKey>;

    fn set_id(&mut self, id: RecordKey);

    fn dict(&self) -> &Map<String, Value>;

    fn dict_mut(&mut self) -> &mut Map<String, Value>;

    fn description(&self) -> Option<&str> {
        self.dict().get(DESCRIPTION_FIELD).and_then(Value::as_str)
    }

    /// Last save time as fractional UNIX seconds
    fn last_modified(&self) -> Option<f64> {
        self.dict().get(LAST_MODIFIED_FIELD).and_then(Value::as_f64)
    }

    fn set_last_modified(&mut self, timestamp: f64) {
        self.dict_mut()
            .insert(LAST_MODIFIED_FIELD.to_string(), Value::from(timestamp));
    }
}

/// Plain DTO with no typed fields of its own
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordDto {
    pub id: Option<RecordKey>,
    pub dict: Map<String, Value>,
}

impl RecordDto {
    #[must_use]
    pub fn new(id: Option<RecordKey>, dict: Map<String, Value>) -> Self {
        Self { id, dict }
    }

    /// Build from a JSON value; anything but an object yields an empty dict
    #[must_use]
    pub fn from_value(id: Option<RecordKey>, value: Value) -> Self {
        match value {
            Value::Object(dict) => Self { id, dict },
            _ => Self {
                id,
                dict: Map::new(),
            },
        }
    }
}

impl Dto for RecordDto {
    fn from_parts(id: Option<RecordKey>, dict: Map<String, Value>) -> Self {
        Self { id, dict }
    }

    fn id(&self) -> Option<&RecordKey> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordKey) {
        self.id = Some(id);
    }

    fn dict(&self) -> &Map<String, Value> {
        &self.dict
    }

    fn dict_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.dict
    }
}

/// How a kind addresses its records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Store-allocated integer ids
    NumericId,
    /// Caller-supplied names
    StringName,
}

impl KeyStrategy {
    /// Coerce `key` into the form this strategy stores
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for a non-numeric name under
    /// [`KeyStrategy::NumericId`].
    pub fn normalize(self, kind: &str, key: &RecordKey) -> Result<RecordKey> {
        match (self, key) {
            (Self::NumericId, RecordKey::Id(_)) | (Self::StringName, RecordKey::Name(_)) => {
                Ok(key.clone())
            }
            (Self::NumericId, RecordKey::Name(name)) => name
                .trim()
                .parse::<i64>()
                .map(RecordKey::Id)
                .map_err(|_| Error::InvalidKey {
                    kind: kind.to_string(),
                    key: key.clone(),
                    reason: "expected a numeric id",
                }),
            (Self::StringName, RecordKey::Id(id)) => Ok(RecordKey::Name(id.to_string())),
        }
    }
}

/// Runs once per batch of store-loaded DTOs, mutating them in place
pub type PostLoadHook<D> = Arc<dyn Fn(&mut [D]) + Send + Sync>;

/// Runs on every record about to be persisted
pub type PrePersistHook<D> = Arc<dyn Fn(&D, &mut Record) -> Result<()> + Send + Sync>;

/// Per-kind DAO configuration
pub struct DaoConfig<D> {
    kind: String,
    strategy: KeyStrategy,
    post_load_hooks: Vec<PostLoadHook<D>>,
    pre_persist_hooks: Vec<PrePersistHook<D>>,
    track_last_modified: bool,
    ttl: Option<Duration>,
}

impl<D> DaoConfig<D> {
    pub fn new(kind: impl Into<String>, strategy: KeyStrategy) -> Self {
        Self {
            kind: kind.into(),
            strategy,
            post_load_hooks: Vec::new(),
            pre_persist_hooks: Vec::new(),
            track_last_modified: false,
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_post_load_hook(mut self, hook: impl Fn(&mut [D]) + Send + Sync + 'static) -> Self {
        self.post_load_hooks.push(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_pre_persist_hook(
        mut self,
        hook: impl Fn(&D, &mut Record) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.pre_persist_hooks.push(Arc::new(hook));
        self
    }

    /// Stamp `last_modified` on every save
    #[must_use]
    pub fn track_last_modified(mut self) -> Self {
        self.track_last_modified = true;
        self
    }

    /// Cache entries of this kind for `ttl` instead of the configured default
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    #[must_use]
    pub fn tracks_last_modified(&self) -> bool {
        self.track_last_modified
    }

    pub(crate) fn post_load_hooks(&self) -> &[PostLoadHook<D>] {
        &self.post_load_hooks
    }

    pub(crate) fn pre_persist_hooks(&self) -> &[PrePersistHook<D>] {
        &self.pre_persist_hooks
    }
}

impl<D> Clone for DaoConfig<D> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            strategy: self.strategy,
            post_load_hooks: self.post_load_hooks.clone(),
            pre_persist_hooks: self.pre_persist_hooks.clone(),
            track_last_modified: self.track_last_modified,
            ttl: self.ttl,
        }
    }
}

impl<D> fmt::Debug for DaoConfig<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaoConfig")
            .field("kind", &self.kind)
            .field("strategy", &self.strategy)
            .field("post_load_hooks", &self.post_load_hooks.len())
            .field("pre_persist_hooks", &self.pre_persist_hooks.len())
            .field("track_last_modified", &self.track_last_modified)
            .field("ttl", &self.ttl)
            .finish()
    }
}
