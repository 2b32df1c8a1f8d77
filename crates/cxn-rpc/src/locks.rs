//! Per-key mutual exclusion.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Serializes work that shares a key while letting distinct keys run in
/// parallel. Idle entries are dropped once their last holder finishes.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn with_lock<T>(&self, key: &str, f: impl FnOnce() -> T) -> T {
        let slot = Arc::clone(self.slots.lock().entry(key.to_string()).or_default());

        let result = {
            let _guard = slot.lock();
            f()
        };

        let mut slots = self.slots.lock();
        // The map and this call hold the only references: nobody else is
        // queued on this key.
        if Arc::strong_count(&slot) == 2 {
            slots.remove(key);
        }
        result
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                std::thread::spawn(move || {
                    locks.with_lock("app:a", || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(5));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn distinct_keys_run_concurrently() {
        let locks = Arc::new(KeyedLocks::default());
        // Both threads must be inside their critical sections at once to
        // get past the barrier.
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["app:a", "app:b"]
            .into_iter()
            .map(|key| {
                let locks = Arc::clone(&locks);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || locks.with_lock(key, || barrier.wait()))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn returns_closure_result() {
        let locks = KeyedLocks::default();
        assert_eq!(locks.with_lock("k", || 42), 42);
        assert_eq!(locks.len(), 0);
    }
}
