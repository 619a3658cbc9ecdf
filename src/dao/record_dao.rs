//! Read-through / write-through DAO over a [`RecordStore`]

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{DaoConfig, Dto, KeyStrategy};
use crate::codecs::JsonCodec;
use crate::distributed::WriteOutcome;
use crate::error::{Error, Result};
use crate::facade::CacheFacade;
use crate::keys::{aggregate_key, entity_key};
use crate::store::{Record, RecordKey, RecordStore};
use crate::traits::CacheCodec;
use crate::value::CacheValue;

/// One row of the aggregate "all records" entry
#[derive(Debug, Serialize, Deserialize)]
struct AggregateRow {
    id: RecordKey,
    data: Map<String, Value>,
}

fn now_timestamp() -> f64 {
    let now = chrono::Utc::now();
    #[allow(clippy::cast_precision_loss)]
    let secs = now.timestamp() as f64;
    secs + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
}

/// DAO for one entity kind
///
/// `C` encodes the record payload. Cache entries always hold the decoded
/// JSON object, whatever the payload codec.
///
/// Store failures are returned as [`Error::Store`]. Cache failures never
/// surface; the DAO falls back to the store.
pub struct RecordDao<D: Dto, C: CacheCodec = JsonCodec> {
    store: Arc<dyn RecordStore>,
    config: DaoConfig<D>,
    codec: C,
}

impl<D: Dto> RecordDao<D, JsonCodec> {
    /// Create a DAO storing JSON payloads
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, config: DaoConfig<D>) -> Self {
        Self::with_codec(store, config, JsonCodec)
    }
}

impl<D: Dto, C: CacheCodec> RecordDao<D, C> {
    /// Create a DAO storing payloads with `codec`
    #[must_use]
    pub fn with_codec(store: Arc<dyn RecordStore>, config: DaoConfig<D>, codec: C) -> Self {
        Self {
            store,
            config,
            codec,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        self.config.kind()
    }

    #[must_use]
    pub fn config(&self) -> &DaoConfig<D> {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn normalize(&self, key: &RecordKey) -> Result<RecordKey> {
        self.config.strategy().normalize(self.kind(), key)
    }

    fn decode(&self, key: &RecordKey, data: &[u8]) -> Result<Map<String, Value>> {
        self.codec
            .deserialize::<Map<String, Value>>(data)
            .map_err(|source| Error::Decode {
                kind: self.kind().to_string(),
                key: key.clone(),
                source,
            })
    }

    fn run_post_load_hooks(&self, dtos: &mut [D]) {
        if dtos.is_empty() {
            return;
        }
        for hook in self.config.post_load_hooks() {
            hook(dtos);
        }
    }

    /// Interpret a cached single-record entry
    ///
    /// `Some(None)` is a cached "does not exist"; `None` means the entry is
    /// unusable and the store must be consulted.
    fn from_cached(&self, key: &RecordKey, value: &CacheValue) -> Option<Option<D>> {
        match value {
            CacheValue::Absent => Some(None),
            CacheValue::Found(Value::Object(dict)) => {
                Some(Some(D::from_parts(Some(key.clone()), dict.clone())))
            }
            CacheValue::Found(_) => {
                warn!(kind = %self.kind(), key = %key, "Cached record is not an object, reloading");
                None
            }
        }
    }

    /// Load one record
    ///
    /// `None` id returns `None` without touching the cache or the store.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidKey`] if `id` does not fit the key strategy,
    /// [`Error::Store`] if the store fails on a cache miss,
    /// [`Error::Decode`] if the stored payload is not a JSON object.
    pub async fn load(&self, cache: &CacheFacade, id: Option<&RecordKey>) -> Result<Option<D>> {
        let Some(id) = id else {
            return Ok(None);
        };
        let key = self.normalize(id)?;
        let cache_key = entity_key(self.kind(), &key);

        let cached = cache.get(&cache_key, None).await;
        if let Some(dto) = cached.and_then(|value| self.from_cached(&key, &value)) {
            return Ok(dto);
        }

        let record = self
            .store
            .get(self.kind(), &key)
            .await
            .map_err(Error::Store)?;

        let Some(record) = record else {
            cache
                .set(&cache_key, CacheValue::Absent, self.config.ttl(), None)
                .await;
            return Ok(None);
        };

        let dict = self.decode(&key, &record.data)?;
        cache
            .set(
                &cache_key,
                CacheValue::Found(Value::Object(dict.clone())),
                self.config.ttl(),
                None,
            )
            .await;

        let mut loaded = [D::from_parts(Some(key), dict)];
        self.run_post_load_hooks(&mut loaded);
        let [dto] = loaded;
        Ok(Some(dto))
    }

    /// Load many records; the result is aligned with `ids`
    ///
    /// One cache multi-get, one batched store fetch for the misses and one
    /// cache multi-set for what the store returned (including "does not
    /// exist" entries).
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub async fn bulk_load(&self, cache: &CacheFacade, ids: &[RecordKey]) -> Result<Vec<Option<D>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys = ids
            .iter()
            .map(|id| self.normalize(id))
            .collect::<Result<Vec<_>>>()?;
        let cache_keys: Vec<String> = keys.iter().map(|k| entity_key(self.kind(), k)).collect();
        let cached = cache.get_multi(&cache_keys, None).await;

        let mut results: Vec<Option<D>> = Vec::with_capacity(keys.len());
        let mut from_store: Vec<bool> = Vec::with_capacity(keys.len());
        let mut missing: Vec<RecordKey> = Vec::new();
        let mut pending: HashSet<RecordKey> = HashSet::new();
        for (key, cache_key) in keys.iter().zip(&cache_keys) {
            match cached.get(cache_key).and_then(|value| self.from_cached(key, value)) {
                Some(dto) => {
                    results.push(dto);
                    from_store.push(false);
                }
                None => {
                    if pending.insert(key.clone()) {
                        missing.push(key.clone());
                    }
                    results.push(None);
                    from_store.push(true);
                }
            }
        }

        if missing.is_empty() {
            return Ok(results);
        }

        let records = self
            .store
            .get_multi(self.kind(), &missing)
            .await
            .map_err(Error::Store)?;

        let mut entries = Vec::with_capacity(missing.len());
        let mut loaded_keys = Vec::new();
        let mut loaded = Vec::new();
        for (key, record) in missing.iter().zip(records) {
            let cache_key = entity_key(self.kind(), key);
            match record {
                Some(record) => {
                    let dict = self.decode(key, &record.data)?;
                    entries.push((cache_key, CacheValue::Found(Value::Object(dict.clone()))));
                    loaded_keys.push(key.clone());
                    loaded.push(D::from_parts(Some(key.clone()), dict));
                }
                None => entries.push((cache_key, CacheValue::Absent)),
            }
        }

        self.run_post_load_hooks(&mut loaded);
        cache.set_multi(entries, self.config.ttl(), None).await;

        let by_key: HashMap<RecordKey, D> = loaded_keys.into_iter().zip(loaded).collect();
        for ((slot, key), needs_store) in results.iter_mut().zip(&keys).zip(from_store) {
            if needs_store {
                *slot = by_key.get(key).cloned();
            }
        }

        debug!(
            kind = %self.kind(),
            requested = ids.len(),
            fetched = missing.len(),
            "Bulk load"
        );
        Ok(results)
    }

    /// Build the storage record for `dto`: encode, then run pre-persist hooks
    fn to_record(&self, dto: &D) -> Result<Record> {
        let key = match dto.id() {
            Some(id) => Some(self.normalize(id)?),
            None if self.config.strategy() == KeyStrategy::StringName => {
                return Err(Error::MissingKey {
                    kind: self.kind().to_string(),
                });
            }
            None => None,
        };

        let data = self
            .codec
            .serialize(dto.dict())
            .map_err(|source| Error::Encode {
                kind: self.kind().to_string(),
                source,
            })?;

        let mut record = Record::new(self.kind(), key, data);
        for hook in self.config.pre_persist_hooks() {
            hook(dto, &mut record)?;
        }
        Ok(record)
    }

    /// Persist `dto` and return its key
    ///
    /// A DTO without an id gets a fresh one from the store (numeric kinds
    /// only); the id is written back into `dto`. The aggregate entry is
    /// invalidated and the single-record entry republished.
    ///
    /// # Errors
    ///
    /// [`Error::MissingKey`] for a name-keyed DTO without an id,
    /// [`Error::Encode`] or a pre-persist hook error before anything is
    /// written, [`Error::Store`] if the store rejects the write, and
    /// [`Error::InvariantViolation`] if the facade is in a snapshot, in
    /// which case nothing is written.
    pub async fn save(&self, cache: &CacheFacade, dto: &mut D) -> Result<RecordKey> {
        cache.ensure_writable("save")?;
        if self.config.tracks_last_modified() {
            dto.set_last_modified(now_timestamp());
        }

        let record = self.to_record(dto)?;
        let payload = record.data.clone();
        let key = self.store.put(record).await.map_err(Error::Store)?;

        cache.delete(&aggregate_key(self.kind()), None).await?;
        let dict = self.decode(&key, &payload)?;
        let cache_key = entity_key(self.kind(), &key);
        let outcome = cache
            .set(
                &cache_key,
                CacheValue::Found(Value::Object(dict)),
                self.config.ttl(),
                None,
            )
            .await;
        // A dropped republish must not leave the previous entry behind
        if outcome != WriteOutcome::Stored {
            cache.delete(&cache_key, None).await?;
        }

        dto.set_id(key.clone());
        debug!(kind = %self.kind(), key = %key, "Saved record");
        Ok(key)
    }

    /// Persist every DTO in one store call; keys are aligned with `dtos`
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save). Nothing is written if any DTO fails to
    /// encode.
    pub async fn save_all(&self, cache: &CacheFacade, dtos: &mut [D]) -> Result<Vec<RecordKey>> {
        if dtos.is_empty() {
            return Ok(Vec::new());
        }
        cache.ensure_writable("save_all")?;

        if self.config.tracks_last_modified() {
            let stamp = now_timestamp();
            for dto in dtos.iter_mut() {
                dto.set_last_modified(stamp);
            }
        }

        let records = dtos
            .iter()
            .map(|dto| self.to_record(dto))
            .collect::<Result<Vec<_>>>()?;
        let payloads: Vec<Vec<u8>> = records.iter().map(|r| r.data.clone()).collect();

        let keys = self
            .store
            .put_batch(records)
            .await
            .map_err(Error::Store)?;
        if keys.len() != dtos.len() {
            return Err(Error::Store(anyhow!(
                "store returned {} keys for {} records",
                keys.len(),
                dtos.len()
            )));
        }

        cache.delete(&aggregate_key(self.kind()), None).await?;

        let mut entries = Vec::with_capacity(keys.len());
        for ((dto, key), payload) in dtos.iter_mut().zip(&keys).zip(&payloads) {
            dto.set_id(key.clone());
            let dict = self.decode(key, payload)?;
            entries.push((
                entity_key(self.kind(), key),
                CacheValue::Found(Value::Object(dict)),
            ));
        }
        let cache_keys: Vec<String> = entries.iter().map(|(key, _)| key.clone()).collect();
        let outcome = cache.set_multi(entries, self.config.ttl(), None).await;
        if outcome != WriteOutcome::Stored {
            cache.delete_multi(&cache_keys, None).await?;
        }

        debug!(kind = %self.kind(), count = keys.len(), "Saved records");
        Ok(keys)
    }

    /// Delete the record behind `dto`
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the record does not exist, [`Error::MissingKey`]
    /// if `dto` has no id, [`Error::Store`] if the store fails, and
    /// [`Error::InvariantViolation`] if the facade is in a snapshot, in which
    /// case nothing is deleted.
    pub async fn delete(&self, cache: &CacheFacade, dto: &D) -> Result<()> {
        cache.ensure_writable("delete")?;
        let Some(id) = dto.id() else {
            return Err(Error::MissingKey {
                kind: self.kind().to_string(),
            });
        };
        let key = self.normalize(id)?;

        let existing = self
            .store
            .get(self.kind(), &key)
            .await
            .map_err(Error::Store)?;
        if existing.is_none() {
            return Err(Error::NotFound {
                kind: self.kind().to_string(),
                key,
            });
        }

        self.store
            .delete(self.kind(), &key)
            .await
            .map_err(Error::Store)?;

        cache
            .delete_multi(
                &[aggregate_key(self.kind()), entity_key(self.kind(), &key)],
                None,
            )
            .await?;

        debug!(kind = %self.kind(), key = %key, "Deleted record");
        Ok(())
    }

    /// Every record of the kind, straight from the store
    ///
    /// Pages through the store until a page comes back empty.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] if any page fails.
    pub async fn scan_all(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut cursor = None;
        loop {
            let page = self
                .store
                .scan(self.kind(), cursor.as_ref())
                .await
                .map_err(Error::Store)?;
            if page.records.is_empty() {
                break;
            }
            records.extend(page.records);
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    async fn load_all_rows(&self, cache: &CacheFacade) -> Result<Vec<AggregateRow>> {
        let cache_key = aggregate_key(self.kind());

        match cache.get(&cache_key, None).await {
            Some(CacheValue::Absent) => return Ok(Vec::new()),
            Some(CacheValue::Found(value)) => match serde_json::from_value(value) {
                Ok(rows) => return Ok(rows),
                Err(e) => {
                    warn!(kind = %self.kind(), error = %e, "Cached aggregate unreadable, rescanning");
                }
            },
            None => {}
        }

        let mut rows = Vec::new();
        for record in self.scan_all().await? {
            let Some(key) = record.key else {
                return Err(Error::Store(anyhow!(
                    "scan of {} returned a record without a key",
                    self.kind()
                )));
            };
            let data = self.decode(&key, &record.data)?;
            rows.push(AggregateRow { id: key, data });
        }

        let value = if rows.is_empty() {
            CacheValue::Absent
        } else {
            serde_json::to_value(&rows)
                .map(CacheValue::Found)
                .map_err(|e| Error::Encode {
                    kind: self.kind().to_string(),
                    source: e.into(),
                })?
        };
        cache.set(&cache_key, value, self.config.ttl(), None).await;

        Ok(rows)
    }

    /// Every record of the kind, via the aggregate cache entry
    ///
    /// Post-load hooks are not applied.
    ///
    /// # Errors
    ///
    /// [`Error::Store`] or [`Error::Decode`] if a rescan is needed and fails.
    pub async fn get_all(&self, cache: &CacheFacade) -> Result<Vec<D>> {
        Ok(self
            .load_all_rows(cache)
            .await?
            .into_iter()
            .map(|row| D::from_parts(Some(row.id), row.data))
            .collect())
    }

    /// [`get_all`](Self::get_all) keyed by record key
    ///
    /// # Errors
    ///
    /// Same as [`get_all`](Self::get_all).
    pub async fn get_all_mapped(&self, cache: &CacheFacade) -> Result<BTreeMap<RecordKey, D>> {
        Ok(self
            .load_all_rows(cache)
            .await?
            .into_iter()
            .map(|row| (row.id.clone(), D::from_parts(Some(row.id), row.data)))
            .collect())
    }

    /// Fail if any record already has `dict[field] == value`
    ///
    /// # Errors
    ///
    /// [`Error::Collision`] on a duplicate, otherwise as
    /// [`get_all`](Self::get_all).
    pub async fn ensure_unique(&self, cache: &CacheFacade, field: &str, value: &Value) -> Result<()> {
        let taken = self
            .load_all_rows(cache)
            .await?
            .iter()
            .any(|row| row.data.get(field) == Some(value));
        if taken {
            return Err(Error::Collision {
                kind: self.kind().to_string(),
                field: field.to_string(),
                value: value.as_str().map_or_else(|| value.to_string(), str::to_string),
            });
        }
        Ok(())
    }

    /// Deep copy of the payload with no id
    #[must_use]
    pub fn clone_dto(&self, dto: &D) -> D {
        D::from_parts(None, dto.dict().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheSystem;
    use crate::dao::RecordDto;
    use crate::store::MemoryRecordStore;
    use serde_json::json;

    fn dto(value: Value) -> RecordDto {
        RecordDto::from_value(None, value)
    }

    #[tokio::test]
    async fn test_negative_entry_spares_the_store() {
        let store = Arc::new(MemoryRecordStore::new());
        let dao: RecordDao<RecordDto> =
            RecordDao::new(store.clone(), DaoConfig::new("Label", KeyStrategy::NumericId));
        let system = CacheSystem::in_memory();
        let cache = system.facade();

        assert!(dao.load(&cache, Some(&RecordKey::Id(99))).await.unwrap().is_none());
        assert!(dao.load(&cache, Some(&RecordKey::Id(99))).await.unwrap().is_none());
        assert_eq!(store.read_calls(), 1);
    }

    #[tokio::test]
    async fn test_none_id_touches_nothing() {
        let store = Arc::new(MemoryRecordStore::new());
        let dao: RecordDao<RecordDto> =
            RecordDao::new(store.clone(), DaoConfig::new("Label", KeyStrategy::NumericId));
        let system = CacheSystem::in_memory();
        let cache = system.facade();

        assert!(dao.load(&cache, None).await.unwrap().is_none());
        assert_eq!(store.read_calls(), 0);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_pre_persist_hook_shapes_cached_entry() {
        let store = Arc::new(MemoryRecordStore::new());
        let config = DaoConfig::new("Label", KeyStrategy::NumericId).with_pre_persist_hook(
            |_dto: &RecordDto, record: &mut Record| {
                record.data = serde_json::to_vec(&json!({"stamped": true}))
                    .map_err(|e| Error::Encode {
                        kind: "Label".into(),
                        source: e.into(),
                    })?;
                Ok(())
            },
        );
        let dao = RecordDao::new(store.clone(), config);
        let system = CacheSystem::in_memory();
        let cache = system.facade();

        let mut label = dto(json!({"title": "x"}));
        let id = dao.save(&cache, &mut label).await.unwrap();
        let loaded = dao.load(&cache, Some(&id)).await.unwrap().unwrap();

        assert_eq!(loaded.dict, json!({"stamped": true}).as_object().unwrap().clone());
        assert_eq!(store.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_non_object_entry_reloads_from_store() {
        let store = Arc::new(MemoryRecordStore::new());
        let dao: RecordDao<RecordDto> =
            RecordDao::new(store.clone(), DaoConfig::new("Label", KeyStrategy::NumericId));
        let system = CacheSystem::in_memory();
        let cache = system.facade();

        let mut label = dto(json!({"title": "x"}));
        let id = dao.save(&cache, &mut label).await.unwrap();
        let cache_key = entity_key("Label", &id);
        cache
            .set(&cache_key, CacheValue::found(json!([1, 2])), None, None)
            .await;

        let loaded = dao.load(&cache, Some(&id)).await.unwrap().unwrap();
        assert_eq!(loaded.dict, label.dict);
        assert_eq!(store.read_calls(), 1);

        cache
            .set(&cache_key, CacheValue::found(json!("x")), None, None)
            .await;
        let bulk = dao.bulk_load(&cache, &[id.clone()]).await.unwrap();
        assert_eq!(bulk[0].as_ref().map(|d| d.dict.clone()), Some(label.dict));
        assert_eq!(store.read_calls(), 2);
    }

    #[tokio::test]
    async fn test_clone_drops_id() {
        let dao: RecordDao<RecordDto> = RecordDao::new(
            Arc::new(MemoryRecordStore::new()),
            DaoConfig::new("Label", KeyStrategy::NumericId),
        );
        let original = RecordDto::from_value(Some(RecordKey::Id(3)), json!({"a": [1, 2]}));
        let copy = dao.clone_dto(&original);
        assert_eq!(copy.id, None);
        assert_eq!(copy.dict, original.dict);
    }
}
