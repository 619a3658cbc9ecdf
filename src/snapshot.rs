//! Read-only snapshot sessions
//!
//! A snapshot freezes what one unit of work sees of the cache: the first
//! lookup of each key goes to the distributed tier, and every later lookup
//! of it is answered from a private map. Sessions are reentrant; only the
//! outermost `end` tears the map down.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::value::CacheValue;

/// Resource that must be frozen while a snapshot is open
///
/// Typically the content store of the tenant the current request is
/// serving. It is told when the outermost snapshot begins and ends.
pub trait ReadOnlyContext: Send + Sync {
    /// Identity used to detect a snapshot being continued from a different
    /// context
    fn context_id(&self) -> &str;

    fn begin_read_only(&self);

    fn end_read_only(&self);

    fn is_read_only(&self) -> bool;
}

/// Per-session map of (namespace, key) to the last known lookup result
///
/// A stored `None` records a miss, so repeating the lookup stays local.
#[derive(Debug, Default)]
pub struct LocalSnapshotCache {
    entries: HashMap<(String, String), Option<CacheValue>>,
}

impl LocalSnapshotCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(result)` if the key was recorded in this session
    #[must_use]
    pub fn lookup(&self, namespace: &str, key: &str) -> Option<Option<CacheValue>> {
        self.entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }

    pub fn record(&mut self, namespace: &str, key: &str, value: Option<CacheValue>) {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reentrant snapshot state owned by one facade
///
/// Invariant: `reentry_count == 0` exactly when `local` is `None`, and an
/// owning context is only recorded while the session is active.
#[derive(Default)]
pub struct SnapshotSession {
    reentry_count: usize,
    owning_context: Option<Arc<dyn ReadOnlyContext>>,
    local: Option<LocalSnapshotCache>,
}

impl fmt::Debug for SnapshotSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotSession")
            .field("reentry_count", &self.reentry_count)
            .field(
                "owning_context",
                &self.owning_context.as_ref().map(|c| c.context_id().to_string()),
            )
            .field("local", &self.local)
            .finish()
    }
}

impl SnapshotSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.local.is_some()
    }

    /// Current nesting depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.reentry_count
    }

    #[must_use]
    pub fn local(&self) -> Option<&LocalSnapshotCache> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut LocalSnapshotCache> {
        self.local.as_mut()
    }

    /// Open (or re-enter) the session
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the session state is
    /// inconsistent or `context` differs from the owning context. The
    /// session is cleared first.
    pub fn begin(&mut self, context: Option<Arc<dyn ReadOnlyContext>>) -> Result<()> {
        self.check_consistent()?;
        self.check_same_context(context.as_ref())?;

        if self.reentry_count == 0 {
            if let Some(context) = &context {
                context.begin_read_only();
            }
            info!(
                context = context.as_ref().map_or("-", |c| c.context_id()),
                "Snapshot begin"
            );
            self.owning_context = context;
            self.local = Some(LocalSnapshotCache::new());
        }
        self.reentry_count += 1;
        Ok(())
    }

    /// Leave one level of the session, tearing it down at the outermost level
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if no session is open or
    /// `context` differs from the owning context. The session is cleared
    /// first.
    pub fn end(&mut self, context: Option<&Arc<dyn ReadOnlyContext>>) -> Result<()> {
        if self.reentry_count == 0 {
            return Err(self.violation("snapshot end without matching begin"));
        }
        self.check_consistent()?;
        self.check_same_context(context)?;

        self.reentry_count -= 1;
        if self.reentry_count == 0 {
            if let Some(owner) = self.owning_context.take() {
                owner.end_read_only();
            }
            let entries = self.local.take().map_or(0, |local| local.len());
            info!(entries = entries, "Snapshot end");
        }
        Ok(())
    }

    /// Unconditionally reset to the inactive state
    pub fn clear(&mut self) {
        self.reentry_count = 0;
        self.local = None;
        if let Some(owner) = self.owning_context.take() {
            if owner.is_read_only() {
                owner.end_read_only();
            }
        }
    }

    /// Clear the session and build the error describing why
    pub(crate) fn violation(&mut self, message: &str) -> Error {
        error!(depth = self.reentry_count, "Snapshot invariant violated: {message}");
        self.clear();
        Error::InvariantViolation(message.to_string())
    }

    fn check_consistent(&mut self) -> Result<()> {
        if (self.reentry_count == 0) != self.local.is_none() {
            return Err(self.violation("reentry count and local map disagree"));
        }
        if self.reentry_count == 0 && self.owning_context.is_some() {
            return Err(self.violation("inactive session still owns a context"));
        }
        Ok(())
    }

    // An unowned session may be re-entered from anywhere.
    fn check_same_context(&mut self, context: Option<&Arc<dyn ReadOnlyContext>>) -> Result<()> {
        let Some(owner) = &self.owning_context else {
            return Ok(());
        };
        let same = context.is_some_and(|c| c.context_id() == owner.context_id());
        if same {
            Ok(())
        } else {
            Err(self.violation("unable to switch context during a snapshot"))
        }
    }
}
