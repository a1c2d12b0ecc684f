//! Pooled external resources borrowed by a transaction.
//!
//! A pool hands out boxed handles; the [`TransactionContext`](crate::TransactionContext)
//! owns the handle for the lifetime of the transaction and gives it back
//! through [`ResourcePool::release`]. Nodes only ever see `&mut dyn Resource`.

use std::any::Any;

use crate::Result;

/// A handle to an external resource, such as a reserved database connection.
pub trait Resource: Any + Send {
    /// Human-readable description used in diagnostics.
    fn describe(&self) -> String;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Resource {
    /// Borrow the concrete handle type behind a resource.
    pub fn downcast_mut<T: Resource>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Source of [`Resource`] handles.
pub trait ResourcePool: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn Resource>>;

    fn release(&self, handle: Box<dyn Resource>);
}
