//! Pagination cursor manager.
//!
//! Remote continuation tokens never leave the process. Callers get an opaque
//! cursor bound to the operation and argument fingerprint that produced it;
//! replaying it against anything else is an [`OpsError::InvalidCursor`].

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::request::Operation;
use crate::types::{OpsError, OpsResult, Page};

/// Idle lifetime of an issued cursor.
pub const DEFAULT_CURSOR_TTL: Duration = Duration::from_secs(15 * 60);
/// Most cursors held at once; the oldest is evicted beyond this.
pub const DEFAULT_MAX_CURSORS: usize = 1024;

#[derive(Debug, Clone)]
struct CursorEntry {
    operation: Operation,
    fingerprint: String,
    remote_token: String,
    issued_at: Instant,
}

/// Issues and redeems opaque, single-use pagination cursors.
#[derive(Debug)]
pub struct CursorManager {
    ttl: Duration,
    capacity: usize,
    cursors: Mutex<HashMap<String, CursorEntry>>,
}

impl Default for CursorManager {
    fn default() -> Self {
        Self::new(DEFAULT_CURSOR_TTL, DEFAULT_MAX_CURSORS)
    }
}

impl CursorManager {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the next page of an enumeration.
    ///
    /// `fetch` receives the remote token to resume from (`None` starts a
    /// fresh enumeration). The returned cursor is `None` once the remote
    /// side reports no further pages. A failed fetch consumes the cursor.
    pub async fn next_page<T, F, Fut>(
        &self,
        operation: Operation,
        fingerprint: &str,
        cursor: Option<&str>,
        fetch: F,
    ) -> OpsResult<(Vec<T>, Option<String>)>
    where
        F: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = OpsResult<Page<T>>>,
    {
        let token = self.resume(operation, fingerprint, cursor).await?;
        let page = fetch(token).await?;
        let next = self.issue(operation, fingerprint, page.next_token).await;
        Ok((page.items, next))
    }

    /// Redeem a cursor for its remote token.
    ///
    /// A mismatched replay leaves the cursor in place so the rightful
    /// enumeration can still continue.
    pub async fn resume(
        &self,
        operation: Operation,
        fingerprint: &str,
        cursor: Option<&str>,
    ) -> OpsResult<Option<String>> {
        let Some(cursor) = cursor else {
            return Ok(None);
        };

        let mut cursors = self.cursors.lock().await;
        self.expire(&mut cursors);

        let entry = cursors.get(cursor).ok_or_else(|| {
            OpsError::InvalidCursor(format!("cursor '{cursor}' is unknown or has expired"))
        })?;
        if entry.operation != operation {
            return Err(OpsError::InvalidCursor(format!(
                "cursor was issued for {}, not {operation}",
                entry.operation
            )));
        }
        if entry.fingerprint != fingerprint {
            return Err(OpsError::InvalidCursor(format!(
                "cursor was issued for different {operation} arguments"
            )));
        }

        Ok(cursors.remove(cursor).map(|e| e.remote_token))
    }

    /// Store a remote token and hand out a cursor for it.
    pub async fn issue(
        &self,
        operation: Operation,
        fingerprint: &str,
        remote_token: Option<String>,
    ) -> Option<String> {
        let remote_token = remote_token.filter(|t| !t.is_empty())?;

        let mut cursors = self.cursors.lock().await;
        self.expire(&mut cursors);
        while cursors.len() >= self.capacity {
            let oldest = cursors
                .iter()
                .min_by_key(|(_, e)| e.issued_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!(cursor = %key, "Evicting oldest pagination cursor");
                    cursors.remove(&key);
                }
                None => break,
            }
        }

        let cursor = uuid::Uuid::new_v4().to_string();
        cursors.insert(
            cursor.clone(),
            CursorEntry {
                operation,
                fingerprint: fingerprint.to_string(),
                remote_token,
                issued_at: Instant::now(),
            },
        );
        Some(cursor)
    }

    /// Number of live cursors.
    pub async fn len(&self) -> usize {
        let mut cursors = self.cursors.lock().await;
        self.expire(&mut cursors);
        cursors.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expire(&self, cursors: &mut HashMap<String, CursorEntry>) {
        let ttl = self.ttl;
        cursors.retain(|_, e| e.issued_at.elapsed() < ttl);
    }
}

/// Canonical JSON of a tool's arguments with the cursor field removed.
pub fn fingerprint(arguments: &Value) -> String {
    let mut canonical = canonicalize(arguments);
    if let Value::Object(map) = &mut canonical {
        map.remove("cursor");
    }
    canonical.to_string()
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
