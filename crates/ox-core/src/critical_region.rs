//! Process-wide critical region
//!
//! One exclusive lock serializes machine-state-altering operations:
//! fault freezes, save/load, teardown. The lock is not reentrant;
//! acquiring it twice from one thread deadlocks.
//!
//! Lock-ordering invariant: the UI loop thread must never acquire the
//! region. A fault handler blocks inside the region waiting on the UI
//! loop to present a dialog, so a loop-side acquisition would deadlock
//! the whole process. The loop thread marks itself at startup and
//! `acquire` rejects it in debug builds.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::cell::Cell;

static GLOBAL_REGION: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

thread_local! {
    static IS_LOOP_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Guard over the process-wide critical region
pub struct GlobalLockGuard {
    _guard: MutexGuard<'static, ()>,
}

/// Mark the current thread as a UI loop thread.
///
/// Called once by the event loop when its worker starts.
pub fn mark_loop_thread() {
    IS_LOOP_THREAD.with(|flag| flag.set(true));
}

/// Whether the current thread is a marked UI loop thread
pub fn is_loop_thread() -> bool {
    IS_LOOP_THREAD.with(|flag| flag.get())
}

/// Acquire the process-wide critical region, blocking until available.
pub fn acquire() -> GlobalLockGuard {
    debug_assert!(
        !is_loop_thread(),
        "the UI loop thread must never take the global critical region"
    );
    GlobalLockGuard {
        _guard: GLOBAL_REGION.lock(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_across_threads() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let holders = Arc::new(AtomicU32::new(0));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let holders = Arc::clone(&holders);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    let _guard = acquire();
                    // Nobody else may be inside the region.
                    assert_eq!(holders.fetch_add(1, Ordering::SeqCst), 0);
                    assert_eq!(holders.fetch_sub(1, Ordering::SeqCst), 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(holders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_loop_thread_rejected() {
        // Mark and acquire on a throwaway thread so the marker does not
        // leak into other tests.
        let panicked = std::thread::spawn(|| {
            mark_loop_thread();
            std::panic::catch_unwind(|| {
                let _guard = acquire();
            })
            .is_err()
        })
        .join()
        .unwrap();

        if cfg!(debug_assertions) {
            assert!(panicked, "loop thread acquisition must be rejected");
        }
    }
}
