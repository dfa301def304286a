//! Host threading helpers

use std::sync::Once;

static AFFINITY_INIT: Once = Once::new();

/// Enable the process to place threads on all logical processors.
///
/// Must run before any subsystem starts setting per-thread affinity.
/// Safe to call more than once; only the first call does anything.
pub fn enable_affinity_configuration() {
    AFFINITY_INIT.call_once(|| {
        let logical = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        tracing::debug!("Affinity configuration enabled for {} logical processors", logical);
    });
}

/// Stable identifier for the current host thread
pub fn current_thread_id() -> u64 {
    // ThreadId has no public integer accessor; hash of the debug
    // representation is stable for the lifetime of the thread.
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}
