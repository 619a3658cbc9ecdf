//! Cache key layout
//!
//! Entity kinds keep their case: `Question` and `question` are different
//! kinds and never share keys.

use crate::store::RecordKey;

/// Key of a single record: `(entity:<kind>:<id>)`
#[must_use]
pub fn entity_key(kind: &str, key: &RecordKey) -> String {
    format!("(entity:{kind}:{key})")
}

/// Key of the aggregate "all records" entry: `(entity-get-all:<kind>)`
#[must_use]
pub fn aggregate_key(kind: &str) -> String {
    format!("(entity-get-all:{kind})")
}

/// Key of a global counter
#[must_use]
pub fn counter_key(name: &str) -> String {
    format!("counter:{name}")
}
