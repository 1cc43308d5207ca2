use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

/// Cross-thread exclusivity lock for a shared decoder context.
///
/// Locking hands out an owned [`ContextMutexGuard`] that is not tied to a borrow, so a decode
/// transaction can keep it across several backend calls and drop it while it sleeps. Only the
/// guard releases the lock. Clones share the same lock.
#[derive(Clone, Default)]
pub struct ContextMutex {
    inner: Arc<Mutex<()>>,
}

impl ContextMutex {
    /// Create an unlocked mutex.
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then hold it for the lifetime of the returned guard.
    ///
    /// Other users of the decoder context, such as a render thread reading decoded surfaces, take
    /// the lock this way too.
    pub fn lock(&self) -> ContextMutexGuard {
        ContextMutexGuard {
            _held: Mutex::lock_arc(&self.inner),
        }
    }

    /// Take the lock if it is free.
    pub fn try_lock(&self) -> Option<ContextMutexGuard> {
        Mutex::try_lock_arc(&self.inner).map(|held| ContextMutexGuard { _held: held })
    }

    /// Return `true` while someone holds the lock.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl std::fmt::Debug for ContextMutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextMutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Owned hold on a [`ContextMutex`]. Dropping it releases the lock.
#[must_use = "the lock is released when the guard is dropped"]
pub struct ContextMutexGuard {
    _held: ArcMutexGuard<RawMutex, ()>,
}

impl std::fmt::Debug for ContextMutexGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextMutexGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/backend/lock.rs"]
mod tests;
