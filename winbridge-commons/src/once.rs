//! Once-initialised state that can be cleared again.
//!
//! The detection probe, the mount table and the distro name are computed at
//! most once per process, but tests need to observe the initialisation more
//! than once. [`ResettableOnce`] gives both: `get_or_init` runs the
//! initialiser under an exclusive lock so concurrent first callers observe a
//! single execution, and [`ResettableOnce::reset`] returns the cell to its
//! empty state.

use parking_lot::{RwLock, const_rwlock};

/// A lazily initialised value guarded by a single-execution barrier.
#[derive(Debug)]
pub struct ResettableOnce<T> {
    value: RwLock<Option<T>>,
}

impl<T> Default for ResettableOnce<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResettableOnce<T> {
    /// Create an empty cell. Usable in `static` items.
    pub const fn new() -> Self {
        Self {
            value: const_rwlock(None),
        }
    }

    /// Forget the cached value; the next `get_or_init` runs its initialiser again.
    pub fn reset(&self) {
        *self.value.write() = None;
    }

    /// True once a value has been computed and not reset since.
    pub fn is_initialized(&self) -> bool {
        self.value.read().is_some()
    }
}

impl<T: Clone> ResettableOnce<T> {
    /// Return the cached value, computing it with `init` on first use.
    ///
    /// Readers after initialisation only take the shared lock.
    pub fn get_or_init<F>(&self, init: F) -> T
    where
        F: FnOnce() -> T,
    {
        if let Some(value) = self.value.read().as_ref() {
            return value.clone();
        }

        let mut guard = self.value.write();
        if let Some(value) = guard.as_ref() {
            return value.clone();
        }
        let value = init();
        *guard = Some(value.clone());
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn initialiser_runs_once_until_reset() {
        let cell = ResettableOnce::new();
        let calls = AtomicUsize::new(0);

        let first = cell.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            7
        });
        let second = cell.get_or_init(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            8
        });
        assert_eq!((first, second), (7, 7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cell.reset();
        assert!(!cell.is_initialized());
        assert_eq!(cell.get_or_init(|| 9), 9);
    }

    #[test]
    fn concurrent_first_callers_share_one_initialisation() {
        let cell = Arc::new(ResettableOnce::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cell.get_or_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(10));
                        "ready".to_string()
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "ready");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
