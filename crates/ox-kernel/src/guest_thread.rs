//! Guest thread objects
//!
//! Each guest thread runs translated code on a dedicated host thread.
//! Suspension is cooperative and counted like NtSuspendThread: raising
//! the count on another thread marks it suspended, while a thread
//! suspending itself blocks on the condvar until the count drops back
//! to zero.

use crate::object_table::{Handle, KernelObject, ObjectType};
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    /// Guest thread object bound to the calling host thread
    static CURRENT_THREAD: RefCell<Option<Arc<GuestThread>>> = const { RefCell::new(None) };
}

/// One guest thread
pub struct GuestThread {
    handle: Handle,
    name: String,
    /// Whether the crash-freeze sweep may suspend this thread. Host
    /// service threads masquerading as guest threads opt out.
    can_debugger_suspend: AtomicBool,
    state: Mutex<SuspendState>,
    resumed: Condvar,
}

#[derive(Debug)]
struct SuspendState {
    suspend_count: u32,
}

impl GuestThread {
    pub fn new(handle: Handle, name: &str, can_debugger_suspend: bool) -> Arc<Self> {
        Arc::new(Self {
            handle,
            name: name.to_string(),
            can_debugger_suspend: AtomicBool::new(can_debugger_suspend),
            state: Mutex::new(SuspendState { suspend_count: 0 }),
            resumed: Condvar::new(),
        })
    }

    /// Bind a guest thread object to the calling host thread
    pub fn bind_current(thread: &Arc<GuestThread>) {
        CURRENT_THREAD.with(|current| {
            *current.borrow_mut() = Some(Arc::clone(thread));
        });
    }

    /// The guest thread bound to the calling host thread, if any
    pub fn current() -> Option<Arc<GuestThread>> {
        CURRENT_THREAD.with(|current| current.borrow().clone())
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn can_debugger_suspend(&self) -> bool {
        self.can_debugger_suspend.load(Ordering::Acquire)
    }

    pub fn set_can_debugger_suspend(&self, value: bool) {
        self.can_debugger_suspend.store(value, Ordering::Release);
    }

    /// Raise the suspend count. Returns the previous count.
    ///
    /// This only marks the thread; a running thread parks at its next
    /// safepoint, and a thread suspending itself uses
    /// [`suspend_and_wait`](Self::suspend_and_wait) instead.
    pub fn suspend(&self) -> u32 {
        let mut state = self.state.lock();
        let previous = state.suspend_count;
        state.suspend_count += 1;
        tracing::debug!(
            "Thread {} suspend count {} -> {}",
            self.name,
            previous,
            state.suspend_count
        );
        previous
    }

    /// Drop the suspend count, waking the thread when it reaches zero.
    /// Returns the previous count.
    pub fn resume(&self) -> u32 {
        let mut state = self.state.lock();
        let previous = state.suspend_count;
        state.suspend_count = state.suspend_count.saturating_sub(1);
        if state.suspend_count == 0 {
            self.resumed.notify_all();
        }
        previous
    }

    /// Raise the suspend count and block until another thread resumes
    /// it back to zero. Call only from the host thread this object is
    /// bound to.
    pub fn suspend_and_wait(&self) {
        let mut state = self.state.lock();
        state.suspend_count += 1;
        tracing::info!("Thread {} suspending itself", self.name);
        while state.suspend_count > 0 {
            self.resumed.wait(&mut state);
        }
    }

    pub fn suspend_count(&self) -> u32 {
        self.state.lock().suspend_count
    }

    pub fn is_suspended(&self) -> bool {
        self.suspend_count() > 0
    }
}

impl KernelObject for GuestThread {
    fn object_type(&self) -> ObjectType {
        ObjectType::Thread
    }

    fn handle(&self) -> Handle {
        self.handle
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}
