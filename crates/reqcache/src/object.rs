//! Shared handle to a request-scoped object.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle to an object handed out by `new_object` or stored in a session cache.
///
/// Cloning the handle does not clone the object: all clones point at the same
/// value. Use [`ObjectRef::ptr_eq`] to test identity.
pub struct ObjectRef<T>(Arc<RwLock<T>>);

impl<T> ObjectRef<T> {
    /// Wrap a standalone value.
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Lock the object for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read()
    }

    /// Lock the object for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write()
    }

    /// Whether two handles point at the same object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Overwrite the object in place if this is the only handle to it.
    ///
    /// Returns false, leaving the object untouched, when another handle exists.
    pub(crate) fn reset_unique(&mut self, value: T) -> bool {
        match Arc::get_mut(&mut self.0) {
            Some(lock) => {
                *lock.get_mut() = value;
                true
            }
            None => false,
        }
    }
}

impl<T: Default> Default for ObjectRef<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef").field(&*self.0.read()).finish()
    }
}
