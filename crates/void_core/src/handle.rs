//! Type-erased handles to loaded native objects
//!
//! Decoders produce meshes, textures, audio clips or whole bundles whose
//! concrete types are unknown to the registry and the cache. A
//! [`NativeHandle`] keeps such an object alive behind an `Arc`, remembers the
//! concrete type name for diagnostics, and can be downcast back by whoever
//! knows what it holds. Cloning is cheap and shares the object.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

/// Shared, type-erased loaded object
#[derive(Clone)]
pub struct NativeHandle {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl NativeHandle {
    /// Wrap a value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Wrap an already shared value without copying it
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: core::any::type_name::<T>(),
        }
    }

    /// Check the concrete type
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrow the concrete value
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Get a shared pointer to the concrete value
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.inner.clone().downcast::<T>().ok()
    }

    /// Name of the concrete type held
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// True when both handles share the same object
    pub fn ptr_eq(&self, other: &NativeHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles sharing the object
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("type", &self.type_name)
            .field("refs", &self.strong_count())
            .finish()
    }
}
