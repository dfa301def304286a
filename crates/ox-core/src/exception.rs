//! Hardware exception routing.
//!
//! Subsystems that want a look at guest faults install a callback here.
//! Callbacks run in installation order and the first one that returns
//! `true` consumes the exception.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// What kind of fault the host trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCode {
    /// Faulted on an instruction the processor could not decode.
    IllegalInstruction,
    /// Read or write to a protected or unmapped page.
    AccessViolation,
}

/// A trapped hardware exception, translated out of the host signal or
/// vectored-handler context.
#[derive(Debug, Clone, Copy)]
pub struct Exception {
    code: ExceptionCode,
    /// Host instruction pointer at the fault site.
    pc: u64,
    /// Faulting data address, zero when the code has no associated address.
    fault_address: u64,
}

impl Exception {
    pub fn new(code: ExceptionCode, pc: u64, fault_address: u64) -> Self {
        Self {
            code,
            pc,
            fault_address,
        }
    }

    pub fn code(&self) -> ExceptionCode {
        self.code
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn fault_address(&self) -> u64 {
        self.fault_address
    }
}

type HandlerFn = dyn Fn(&Exception) -> bool + Send + Sync;

struct HandlerEntry {
    id: u64,
    callback: Arc<HandlerFn>,
}

static HANDLERS: Lazy<RwLock<Vec<HandlerEntry>>> = Lazy::new(|| RwLock::new(Vec::new()));
static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Scoped handle for an installed exception handler. Dropping it removes
/// the handler from the dispatch chain.
pub struct HandlerRegistration {
    id: u64,
}

impl Drop for HandlerRegistration {
    fn drop(&mut self) {
        HANDLERS.write().retain(|entry| entry.id != self.id);
    }
}

/// Installs `callback` at the end of the dispatch chain and returns the
/// registration keeping it alive.
pub fn install_handler<F>(callback: F) -> HandlerRegistration
where
    F: Fn(&Exception) -> bool + Send + Sync + 'static,
{
    let id = NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed);
    HANDLERS.write().push(HandlerEntry {
        id,
        callback: Arc::new(callback),
    });
    HandlerRegistration { id }
}

/// Routes `exception` through the installed handlers in installation
/// order. Returns `true` once a handler consumes it, `false` when every
/// handler declined.
pub fn dispatch(exception: &Exception) -> bool {
    // Snapshot the chain so a handler can install or drop registrations
    // without deadlocking against the registry lock.
    let callbacks: Vec<Arc<HandlerFn>> = HANDLERS
        .read()
        .iter()
        .map(|entry| Arc::clone(&entry.callback))
        .collect();

    for callback in callbacks {
        if callback(exception) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::{Mutex, MutexGuard};

    // The handler registry is process-wide, so these tests serialize on a
    // shared lock to keep each other's handlers out of the chain.
    static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn serial() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock()
    }

    fn fault() -> Exception {
        Exception::new(ExceptionCode::AccessViolation, 0x8210_0000, 0xDEAD_0000)
    }

    #[test]
    fn test_dispatch_without_handlers() {
        let _serial = serial();
        assert!(!dispatch(&fault()));
    }

    #[test]
    fn test_first_consumer_wins() {
        let _serial = serial();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = Arc::clone(&order);
            install_handler(move |_| {
                order.lock().push("first");
                false
            })
        };
        let second = {
            let order = Arc::clone(&order);
            install_handler(move |_| {
                order.lock().push("second");
                true
            })
        };
        let third = {
            let order = Arc::clone(&order);
            install_handler(move |_| {
                order.lock().push("third");
                true
            })
        };

        assert!(dispatch(&fault()));
        assert_eq!(*order.lock(), vec!["first", "second"]);

        drop(first);
        drop(second);
        drop(third);
    }

    #[test]
    fn test_registration_drop_uninstalls() {
        let _serial = serial();
        let registration = install_handler(|_| true);
        assert!(dispatch(&fault()));

        drop(registration);
        assert!(!dispatch(&fault()));
    }

    #[test]
    fn test_exception_accessors() {
        let ex = Exception::new(ExceptionCode::IllegalInstruction, 0x1000, 0);
        assert_eq!(ex.code(), ExceptionCode::IllegalInstruction);
        assert_eq!(ex.pc(), 0x1000);
        assert_eq!(ex.fault_address(), 0);
    }
}
