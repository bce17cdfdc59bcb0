use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Non-blocking, best-effort exclusion flag. A second acquire while the
/// first guard is alive fails immediately instead of waiting.
#[derive(Debug, Default, Clone)]
pub struct AdvisoryLock {
    held: Arc<AtomicBool>,
}

/// Releases its lock when dropped, typically at the end of a background task.
#[derive(Debug)]
pub struct LockGuard {
    held: Arc<AtomicBool>,
}

impl AdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<LockGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LockGuard {
                held: self.held.clone(),
            })
    }

    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let lock = AdvisoryLock::new();
        let guard = lock.try_acquire().expect("first acquire");
        assert!(lock.is_locked());
        assert!(lock.try_acquire().is_none());
        drop(guard);
        assert!(!lock.is_locked());
        assert!(lock.try_acquire().is_some());
    }

    #[test]
    fn guard_released_from_another_thread() {
        let lock = AdvisoryLock::new();
        let guard = lock.try_acquire().unwrap();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert!(!lock.is_locked());
    }
}
