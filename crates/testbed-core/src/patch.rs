//! Value patching with restore-on-drop guards.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::sync::{Mutex, PoisonError, RwLock};
use tracing::debug;

/// A shared location whose value can be swapped through `&self`.
///
/// Implemented for the interior-mutability types a patchable global or
/// fixture field lives in. The associated `Value` makes old and new value
/// the same type, so an incompatible patch does not compile.
pub trait Slot {
    type Value;

    /// Stores `value` and returns the previous value.
    fn replace(&self, value: Self::Value) -> Self::Value;
}

impl<T> Slot for Mutex<T> {
    type Value = T;

    fn replace(&self, value: T) -> T {
        let mut guard = self.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }
}

impl<T> Slot for RwLock<T> {
    type Value = T;

    fn replace(&self, value: T) -> T {
        let mut guard = self.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }
}

impl<T> Slot for RefCell<T> {
    type Value = T;

    fn replace(&self, value: T) -> T {
        RefCell::replace(self, value)
    }
}

impl<T> Slot for Cell<T> {
    type Value = T;

    fn replace(&self, value: T) -> T {
        Cell::replace(self, value)
    }
}

/// Restores a patched value when dropped.
#[must_use = "dropping the guard restores the original value immediately"]
pub struct PatchGuard {
    restore: Option<Box<dyn FnOnce()>>,
}

impl PatchGuard {
    fn new(restore: impl FnOnce() + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    /// Restores the original value now.
    pub fn restore(mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl Drop for PatchGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl fmt::Debug for PatchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchGuard")
            .field("armed", &self.restore.is_some())
            .finish()
    }
}

/// Replaces the value behind `dest` with `value`.
///
/// `dest` is any owning or `'static` handle to a [`Slot`]: `&'static
/// Mutex<T>` for globals, `Arc<Mutex<T>>` or `Rc<RefCell<T>>` for fixture
/// state. The returned guard puts the old value back.
///
/// ```
/// use std::sync::Mutex;
/// use testbed_core::patch_value;
///
/// static RETRIES: Mutex<u32> = Mutex::new(3);
///
/// let guard = patch_value(&RETRIES, 0);
/// assert_eq!(*RETRIES.lock().unwrap(), 0);
/// drop(guard);
/// assert_eq!(*RETRIES.lock().unwrap(), 3);
/// ```
pub fn patch_value<D>(dest: D, value: <D::Target as Slot>::Value) -> PatchGuard
where
    D: Deref + 'static,
    D::Target: Slot,
    <D::Target as Slot>::Value: 'static,
{
    let old = Slot::replace(&*dest, value);
    debug!(
        value_type = std::any::type_name::<<D::Target as Slot>::Value>(),
        "Patched value"
    );
    PatchGuard::new(move || {
        Slot::replace(&*dest, old);
    })
}
