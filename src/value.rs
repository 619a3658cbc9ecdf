//! Cache values and the negative-cache marker
//!
//! A lookup returns `Option<CacheValue>`:
//!
//! ```text
//! None                      never looked up / not in cache
//! Some(CacheValue::Absent)  looked up, confirmed not to exist
//! Some(CacheValue::Found)   cached record data
//! ```
//!
//! `Absent` is its own variant, so an empty or `null` payload can never be
//! mistaken for it.

use serde::{Deserialize, Serialize};

/// A value held by either cache tier
///
/// On the wire this is a tagged envelope:
/// `{"state":"found","value":...}` or `{"state":"absent"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    /// Cached data
    Found(serde_json::Value),
    /// Negative entry
    Absent,
}

impl CacheValue {
    /// Wrap any JSON value
    pub fn found(value: impl Into<serde_json::Value>) -> Self {
        Self::Found(value.into())
    }

    /// `true` for the negative entry
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Borrow the cached data, `None` for a negative entry
    #[must_use]
    pub fn as_found(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent => None,
        }
    }

    /// Take the cached data, `None` for a negative entry
    #[must_use]
    pub fn into_found(self) -> Option<serde_json::Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_is_not_absent() {
        assert_ne!(CacheValue::found(json!({})), CacheValue::Absent);
        assert_ne!(CacheValue::found(serde_json::Value::Null), CacheValue::Absent);
        assert!(!CacheValue::found(json!({})).is_absent());
    }

    #[test]
    fn test_envelope_shape() {
        let absent = serde_json::to_value(CacheValue::Absent).unwrap();
        assert_eq!(absent, json!({"state": "absent"}));

        let found = serde_json::to_value(CacheValue::found(json!({"x": 1}))).unwrap();
        assert_eq!(found, json!({"state": "found", "value": {"x": 1}}));

        let decoded: CacheValue = serde_json::from_value(json!({"state": "found", "value": {}})).unwrap();
        assert_eq!(decoded, CacheValue::found(json!({})));
    }
}
