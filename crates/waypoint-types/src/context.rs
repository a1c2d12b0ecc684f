// ---------------------------------------------------------------------------
// TransactionContext: per-transaction key space plus an optional pooled handle
// ---------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::path::Path;
use crate::payload::{Payload, Table};
use crate::resource::{Resource, ResourcePool};
use crate::{Result, WaypointError};

/// State shared by every node that handles one input message.
///
/// The dispatcher creates a context at the start of a transaction and hands
/// `&mut` access to each node in turn, so access is sequential by
/// construction. The key space is a [`Table`] payload addressed with the same
/// path grammar as payloads.
///
/// If a [`ResourcePool`] is attached, the first call to
/// [`acquire_shared_resource`](Self::acquire_shared_resource) reserves one
/// handle that every later node in the transaction reuses. The handle goes
/// back to the pool when the context is finished or dropped; nodes cannot
/// release it.
pub struct TransactionContext {
    id: Uuid,
    started_at: DateTime<Utc>,
    values: Payload,
    pool: Option<Arc<dyn ResourcePool>>,
    resource: Option<Box<dyn Resource>>,
}

impl TransactionContext {
    /// Create an empty context with a fresh transaction id.
    pub fn new() -> Self {
        let ctx = Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            values: Payload::table(Table::new()),
            pool: None,
            resource: None,
        };
        tracing::debug!(transaction = %ctx.id, "Transaction started");
        ctx
    }

    /// Create an empty context that can borrow from `pool`.
    pub fn with_pool(pool: Arc<dyn ResourcePool>) -> Self {
        let mut ctx = Self::new();
        ctx.attach_pool(pool);
        ctx
    }

    pub fn attach_pool(&mut self, pool: Arc<dyn ResourcePool>) {
        self.pool = Some(pool);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    // --- Key space ---

    pub fn get(&self, path: &Path) -> Option<Payload> {
        self.values.get(path)
    }

    pub fn get_all(&self, path: &Path) -> Vec<Payload> {
        self.values.get_all(path)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.values.exists(path)
    }

    /// Text at `path`, if present and representable as text.
    pub fn get_text(&self, path: &Path) -> Option<String> {
        self.get(path)
            .and_then(|v| v.as_text().ok().map(str::to_string))
    }

    /// Write `value` at `path`, creating intermediate tables.
    ///
    /// Replacing the whole key space (the empty path) requires a table.
    pub fn set(&mut self, path: &Path, value: impl Into<Payload>) -> Result<()> {
        let value = value.into();
        if path.is_root() && value.as_table().is_none() {
            return Err(WaypointError::PathMismatch {
                path: path.to_string(),
                message: format!(
                    "context root must be a table, got {}",
                    value.kind().as_str()
                ),
            });
        }
        self.values.set(path, value)
    }

    /// The whole key space as a table payload.
    pub fn values(&self) -> &Payload {
        &self.values
    }

    /// JSON rendering of the key space for auditing.
    pub fn snapshot(&self) -> serde_json::Value {
        self.values.to_json()
    }

    // --- Shared resource ---

    /// `true` if a handle is held or can be acquired from an attached pool.
    pub fn has_shared_resource(&self) -> bool {
        self.resource.is_some() || self.pool.is_some()
    }

    /// Borrow the transaction's pooled handle, acquiring it on first use.
    pub fn acquire_shared_resource(&mut self) -> Result<&mut (dyn Resource + 'static)> {
        if self.resource.is_none() {
            let pool = self.pool.as_ref().ok_or_else(|| {
                WaypointError::Resource("no resource pool attached to transaction".into())
            })?;
            let handle = pool.acquire()?;
            tracing::debug!(
                transaction = %self.id,
                resource = %handle.describe(),
                "Shared resource acquired"
            );
            self.resource = Some(handle);
        }
        self.resource
            .as_deref_mut()
            .ok_or_else(|| WaypointError::Resource("shared resource unavailable".into()))
    }

    /// One-line diagnostic summary: id, age, keys, resource.
    pub fn describe(&self) -> String {
        let age = Utc::now().signed_duration_since(self.started_at);
        let keys: Vec<&str> = self
            .values
            .as_table()
            .map(|t| t.keys().collect())
            .unwrap_or_default();
        let resource = self
            .resource
            .as_ref()
            .map(|r| r.describe())
            .unwrap_or_else(|| "none".to_string());
        format!(
            "transaction {} age={}ms keys=[{}] resource={}",
            self.id,
            age.num_milliseconds(),
            keys.join(", "),
            resource
        )
    }

    /// End the transaction, returning any held handle to its pool.
    pub fn finish(mut self) {
        tracing::debug!(transaction = %self.id, summary = %self.describe(), "Transaction finished");
        self.release_resource();
    }

    fn release_resource(&mut self) {
        if let Some(handle) = self.resource.take() {
            match &self.pool {
                Some(pool) => {
                    tracing::debug!(transaction = %self.id, "Shared resource released");
                    pool.release(handle);
                }
                None => {
                    tracing::warn!(transaction = %self.id, "Shared resource dropped without a pool");
                }
            }
        }
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        self.release_resource();
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("values", &self.values)
            .field("pool", &self.pool.is_some())
            .field("resource", &self.resource.as_ref().map(|r| r.describe()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::resource::testing::{Connection, CountingPool};

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn set_and_get_nested_keys() {
        let mut ctx = TransactionContext::new();
        ctx.set(&p("requestType"), "NEW").unwrap();
        ctx.set(&p("customer.id"), "C-1").unwrap();
        assert_eq!(ctx.get_text(&p("requestType")).as_deref(), Some("NEW"));
        assert_eq!(ctx.get(&p("customer.id")), Some(Payload::text("C-1")));
        assert!(ctx.exists(&p("customer")));
        assert!(!ctx.exists(&p("customer.name")));
    }

    #[test]
    fn set_root_requires_table() {
        let mut ctx = TransactionContext::new();
        assert!(ctx.set(&Path::root(), "scalar").is_err());
        let table: Table = [("a", "1")].into_iter().collect();
        ctx.set(&Path::root(), table).unwrap();
        assert_eq!(ctx.get_text(&p("a")).as_deref(), Some("1"));
    }

    #[test]
    fn snapshot_is_json() {
        let mut ctx = TransactionContext::new();
        ctx.set(&p("header.id"), "7").unwrap();
        assert_eq!(ctx.snapshot(), serde_json::json!({ "header": { "id": "7" } }));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(TransactionContext::new().id(), TransactionContext::new().id());
    }

    #[test]
    fn resource_is_acquired_once() {
        let pool = Arc::new(CountingPool::default());
        let mut ctx = TransactionContext::with_pool(pool.clone());
        assert!(ctx.has_shared_resource());

        ctx.acquire_shared_resource()
            .unwrap()
            .downcast_mut::<Connection>()
            .unwrap()
            .statements
            .push("INSERT".into());
        let conn = ctx
            .acquire_shared_resource()
            .unwrap()
            .downcast_mut::<Connection>()
            .unwrap();
        assert_eq!(conn.statements, vec!["INSERT".to_string()]);
        assert_eq!(pool.acquired.load(Ordering::SeqCst), 1);

        ctx.finish();
        assert_eq!(pool.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn resource_is_released_on_drop() {
        let pool = Arc::new(CountingPool::default());
        {
            let mut ctx = TransactionContext::with_pool(pool.clone());
            ctx.acquire_shared_resource().unwrap();
        }
        assert_eq!(pool.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unused_pool_is_never_touched() {
        let pool = Arc::new(CountingPool::default());
        TransactionContext::with_pool(pool.clone()).finish();
        assert_eq!(pool.acquired.load(Ordering::SeqCst), 0);
        assert_eq!(pool.released.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn acquire_without_pool_fails() {
        let mut ctx = TransactionContext::new();
        assert!(!ctx.has_shared_resource());
        let err = ctx.acquire_shared_resource().err().unwrap();
        assert!(matches!(err, WaypointError::Resource(_)));
    }

    #[test]
    fn describe_lists_keys_and_resource() {
        let pool = Arc::new(CountingPool::default());
        let mut ctx = TransactionContext::with_pool(pool);
        ctx.set(&p("requestType"), "NEW").unwrap();
        ctx.acquire_shared_resource().unwrap();
        let summary = ctx.describe();
        assert!(summary.contains(&ctx.id().to_string()));
        assert!(summary.contains("keys=[requestType]"));
        assert!(summary.contains("connection #0"));
    }
}
