//! In-process record store
//!
//! A complete [`RecordStore`] kept in memory. Useful for tests, local
//! development and benchmarks: it allocates ids like a real entity store,
//! pages its scans, can be switched into an outage, and counts the calls it
//! serves so callers can verify what reached the source of truth.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use tracing::debug;

use super::{Record, RecordKey, RecordStore, ScanCursor, ScanPage};

/// Default number of records returned per scan page
pub const DEFAULT_PAGE_SIZE: usize = 100;

type KindTable = BTreeMap<RecordKey, Vec<u8>>;

/// Record store backed by ordered in-memory tables, one per kind
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, KindTable>>,
    next_id: AtomicI64,
    page_size: usize,
    unavailable: AtomicBool,
    read_calls: AtomicU64,
    write_calls: AtomicU64,
    scan_calls: AtomicU64,
}

impl MemoryRecordStore {
    /// Create an empty store with the default page size
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create an empty store returning at most `page_size` records per scan
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            page_size: page_size.max(1),
            unavailable: AtomicBool::new(false),
            read_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
            scan_calls: AtomicU64::new(0),
        }
    }

    /// Simulate an outage: every call fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of read calls served (a batched read counts once)
    #[must_use]
    pub fn read_calls(&self) -> u64 {
        self.read_calls.load(Ordering::Relaxed)
    }

    /// Number of write calls served (a batched write counts once)
    #[must_use]
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Number of scan pages served
    #[must_use]
    pub fn scan_calls(&self) -> u64 {
        self.scan_calls.load(Ordering::Relaxed)
    }

    /// Number of records stored under `kind`
    #[must_use]
    pub fn len(&self, kind: &str) -> usize {
        self.tables.read().get(kind).map_or(0, BTreeMap::len)
    }

    /// `true` if `kind` holds no records
    #[must_use]
    pub fn is_empty(&self, kind: &str) -> bool {
        self.len(kind) == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::Relaxed) {
            bail!("record store unavailable");
        }
        Ok(())
    }

    fn allocate_key(&self, key: Option<RecordKey>) -> RecordKey {
        match key {
            Some(RecordKey::Id(id)) => {
                // Keep allocation ahead of caller-chosen ids.
                self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
                RecordKey::Id(id)
            }
            Some(name @ RecordKey::Name(_)) => name,
            None => RecordKey::Id(self.next_id.fetch_add(1, Ordering::Relaxed)),
        }
    }

    fn read_one(&self, kind: &str, key: &RecordKey) -> Option<Record> {
        self.tables
            .read()
            .get(kind)
            .and_then(|table| table.get(key))
            .map(|data| Record::new(kind, Some(key.clone()), data.clone()))
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_cursor(key: &RecordKey) -> Result<ScanCursor> {
    Ok(ScanCursor(serde_json::to_string(key)?))
}

fn decode_cursor(cursor: &ScanCursor) -> Result<RecordKey> {
    serde_json::from_str(&cursor.0).with_context(|| format!("malformed scan cursor: {}", cursor.0))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_by_id(&self, kind: &str, id: i64) -> Result<Option<Record>> {
        self.ensure_available()?;
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.read_one(kind, &RecordKey::Id(id)))
    }

    async fn get_by_name(&self, kind: &str, name: &str) -> Result<Option<Record>> {
        self.ensure_available()?;
        self.read_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.read_one(kind, &RecordKey::Name(name.to_string())))
    }

    async fn get_multi(&self, kind: &str, keys: &[RecordKey]) -> Result<Vec<Option<Record>>> {
        self.ensure_available()?;
        self.read_calls.fetch_add(1, Ordering::Relaxed);

        let tables = self.tables.read();
        let table = tables.get(kind);
        Ok(keys
            .iter()
            .map(|key| {
                table
                    .and_then(|t| t.get(key))
                    .map(|data| Record::new(kind, Some(key.clone()), data.clone()))
            })
            .collect())
    }

    async fn put(&self, record: Record) -> Result<RecordKey> {
        self.ensure_available()?;
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        let key = self.allocate_key(record.key);
        self.tables
            .write()
            .entry(record.kind)
            .or_default()
            .insert(key.clone(), record.data);
        Ok(key)
    }

    async fn put_batch(&self, records: Vec<Record>) -> Result<Vec<RecordKey>> {
        self.ensure_available()?;
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        let mut tables = self.tables.write();
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            let key = self.allocate_key(record.key);
            tables
                .entry(record.kind)
                .or_default()
                .insert(key.clone(), record.data);
            keys.push(key);
        }
        debug!(count = keys.len(), "[MemoryStore] Batch put");
        Ok(keys)
    }

    async fn delete(&self, kind: &str, key: &RecordKey) -> Result<()> {
        self.ensure_available()?;
        self.write_calls.fetch_add(1, Ordering::Relaxed);

        if let Some(table) = self.tables.write().get_mut(kind) {
            table.remove(key);
        }
        Ok(())
    }

    async fn scan(&self, kind: &str, cursor: Option<&ScanCursor>) -> Result<ScanPage> {
        self.ensure_available()?;
        self.scan_calls.fetch_add(1, Ordering::Relaxed);

        let start = match cursor {
            Some(cursor) => Bound::Excluded(decode_cursor(cursor)?),
            None => Bound::Unbounded,
        };

        let tables = self.tables.read();
        let Some(table) = tables.get(kind) else {
            return Ok(ScanPage::default());
        };

        let records: Vec<Record> = table
            .range((start, Bound::Unbounded))
            .take(self.page_size)
            .map(|(key, data)| Record::new(kind, Some(key.clone()), data.clone()))
            .collect();

        let cursor = match records.last().and_then(|r| r.key.as_ref()) {
            Some(last) => Some(encode_cursor(last)?),
            None => None,
        };

        Ok(ScanPage { records, cursor })
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: &str, key: Option<RecordKey>, data: &str) -> Record {
        Record::new(kind, key, data.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_put_allocates_increasing_ids() {
        let store = MemoryRecordStore::new();
        let first = store.put(record("Question", None, "{}")).await.unwrap();
        let second = store.put(record("Question", None, "{}")).await.unwrap();
        assert_eq!(first, RecordKey::Id(1));
        assert_eq!(second, RecordKey::Id(2));

        store
            .put(record("Question", Some(RecordKey::Id(10)), "{}"))
            .await
            .unwrap();
        let next = store.put(record("Question", None, "{}")).await.unwrap();
        assert_eq!(next, RecordKey::Id(11));
    }

    #[tokio::test]
    async fn test_scan_pages_until_empty() {
        let store = MemoryRecordStore::with_page_size(2);
        for _ in 0..5 {
            store.put(record("Label", None, "{}")).await.unwrap();
        }

        let mut cursor = None;
        let mut seen = Vec::new();
        loop {
            let page = store.scan("Label", cursor.as_ref()).await.unwrap();
            if page.records.is_empty() {
                break;
            }
            seen.extend(page.records.into_iter().filter_map(|r| r.key));
            cursor = page.cursor;
        }

        assert_eq!(seen, (1..=5).map(RecordKey::Id).collect::<Vec<_>>());
        // 3 full/partial pages + the empty terminator
        assert_eq!(store.scan_calls(), 4);
    }

    #[tokio::test]
    async fn test_outage_fails_every_call() {
        let store = MemoryRecordStore::new();
        store.set_unavailable(true);
        assert!(store.get_by_id("Role", 1).await.is_err());
        assert!(store.put(record("Role", None, "{}")).await.is_err());
        assert!(store.scan("Role", None).await.is_err());

        store.set_unavailable(false);
        assert!(store.get_by_id("Role", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let store = MemoryRecordStore::new();
        let key = store.put(record("Question", None, "{\"a\":1}")).await.unwrap();
        assert!(store.get("Label", &key).await.unwrap().is_none());
        assert!(store.get("Question", &key).await.unwrap().is_some());
    }
}
