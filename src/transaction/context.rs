//! Execution context.
//!
//! A [`Context`] is an immutable, persistent value: deriving a new context never changes the
//! one it was derived from. It carries typed host values and at most one transaction store.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::transaction::store::StoreHandle;

struct ValueLayer {
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<ValueLayer>>,
}

/// The execution context scopes are attached to.
#[derive(Clone, Default)]
pub struct Context {
    values: Option<Arc<ValueLayer>>,
    store: Option<StoreHandle>,
}

impl Context {
    /// An empty context with no values and no store.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that also carries `value`.
    ///
    /// A later value of the same type shadows an earlier one.
    pub fn with_value<T: Any + Send + Sync>(&self, value: T) -> Self {
        Self {
            values: Some(Arc::new(ValueLayer {
                value: Arc::new(value),
                parent: self.values.clone(),
            })),
            store: self.store.clone(),
        }
    }

    /// The nearest value of type `T`.
    pub fn value<T: Any + Send + Sync>(&self) -> Option<&T> {
        let mut layer = self.values.as_deref();
        while let Some(current) = layer {
            if let Some(value) = current.value.downcast_ref::<T>() {
                return Some(value);
            }
            layer = current.parent.as_deref();
        }
        None
    }

    /// The store bound to this context, if any.
    pub fn store(&self) -> Option<&StoreHandle> {
        self.store.as_ref()
    }

    /// Check if a transaction store is bound to this context.
    pub fn is_tx_context(&self) -> bool {
        self.store.is_some()
    }

    pub(crate) fn with_store(&self, store: StoreHandle) -> Self {
        Self {
            values: self.values.clone(),
            store: Some(store),
        }
    }

    pub(crate) fn without_store(&self) -> Self {
        Self {
            values: self.values.clone(),
            store: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct RequestId(u32);

    #[test]
    fn test_background_is_empty() {
        let ctx = Context::background();
        assert!(!ctx.is_tx_context());
        assert!(ctx.store().is_none());
        assert!(ctx.value::<RequestId>().is_none());
    }

    #[test]
    fn test_values_are_persistent() {
        let base = Context::background();
        let first = base.with_value(RequestId(1));
        let second = first.with_value(RequestId(2));

        assert!(base.value::<RequestId>().is_none());
        assert_eq!(first.value::<RequestId>(), Some(&RequestId(1)));
        assert_eq!(second.value::<RequestId>(), Some(&RequestId(2)));
    }

    #[test]
    fn test_values_of_other_types_are_found_through_layers() {
        let ctx = Context::background()
            .with_value(RequestId(9))
            .with_value("tenant-a");

        assert_eq!(ctx.value::<RequestId>(), Some(&RequestId(9)));
        assert_eq!(ctx.value::<&str>(), Some(&"tenant-a"));
        assert!(ctx.value::<u64>().is_none());
    }
}
