//! Guest debugger session and fault verdicts

use std::sync::atomic::{AtomicBool, Ordering};

use ox_core::exception::Exception;
use parking_lot::{Mutex, RwLock};

use crate::breakpoint::BreakpointManager;

/// Debug execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugState {
    /// Running normally
    Running,
    /// Paused (by user or breakpoint)
    Paused,
}

/// Guest debugger.
///
/// A session is opened while the emulator runs so a client can attach at
/// any point. Faults are only claimed when they belong to the debugger,
/// meaning the faulting pc carries one of its breakpoints.
pub struct Debugger {
    state: Mutex<DebugState>,
    breakpoints: RwLock<BreakpointManager>,
    session_active: AtomicBool,
    attached: AtomicBool,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    /// Create a new debugger
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DebugState::Running),
            breakpoints: RwLock::new(BreakpointManager::new()),
            session_active: AtomicBool::new(false),
            attached: AtomicBool::new(false),
        }
    }

    /// Open the debug session so clients can attach
    pub fn start_session(&self) {
        self.session_active.store(true, Ordering::SeqCst);
        tracing::info!("Debugger session started");
    }

    /// Close the debug session, detaching any client
    pub fn stop_session(&self) {
        self.session_active.store(false, Ordering::SeqCst);
        self.attached.store(false, Ordering::SeqCst);
        tracing::info!("Debugger session stopped");
    }

    /// Whether the session is open
    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    /// Whether a client is attached
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Flip the attach state (driven by the session transport)
    pub fn set_attached(&self, attached: bool) {
        self.attached.store(attached, Ordering::SeqCst);
    }

    /// Current execution state
    pub fn state(&self) -> DebugState {
        *self.state.lock()
    }

    /// Pause execution
    pub fn pause(&self) {
        *self.state.lock() = DebugState::Paused;
        tracing::info!("Debugger: paused");
    }

    /// Resume execution
    pub fn resume(&self) {
        *self.state.lock() = DebugState::Running;
        tracing::info!("Debugger: resumed");
    }

    /// Set a breakpoint at `address`, returning its ID
    pub fn add_breakpoint(&self, address: u64) -> u32 {
        self.breakpoints.write().add(address)
    }

    /// Remove a breakpoint by ID
    pub fn remove_breakpoint(&self, id: u32) -> bool {
        self.breakpoints.write().remove(id)
    }

    /// Whether an enabled breakpoint covers `address`
    pub fn has_breakpoint_at(&self, address: u64) -> bool {
        self.breakpoints.read().is_set_at(address)
    }

    /// Decide whether a guest fault belongs to this debugger.
    ///
    /// A fault whose pc carries a breakpoint is the breakpoint firing:
    /// record the hit, pause, and claim it. Anything else is not ours.
    pub fn on_unhandled_exception(&self, exception: &Exception) -> bool {
        if self.breakpoints.write().record_hit(exception.pc()) {
            tracing::info!("Breakpoint hit at 0x{:016x}", exception.pc());
            self.pause();
            return true;
        }

        tracing::debug!(
            "Fault at 0x{:016x} does not match any breakpoint",
            exception.pc()
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ox_core::exception::ExceptionCode;

    #[test]
    fn test_session_controls_attach_state() {
        let debugger = Debugger::new();
        assert!(!debugger.is_session_active());

        debugger.start_session();
        assert!(debugger.is_session_active());

        debugger.set_attached(true);
        assert!(debugger.is_attached());

        debugger.stop_session();
        assert!(!debugger.is_session_active());
        assert!(!debugger.is_attached());
    }

    #[test]
    fn test_breakpoint_fault_is_claimed() {
        let debugger = Debugger::new();
        debugger.add_breakpoint(0x8200_1000);

        let fault = Exception::new(ExceptionCode::IllegalInstruction, 0x8200_1000, 0);
        assert!(debugger.on_unhandled_exception(&fault));
        assert_eq!(debugger.state(), DebugState::Paused);
    }

    #[test]
    fn test_unrelated_fault_is_declined() {
        let debugger = Debugger::new();
        debugger.add_breakpoint(0x8200_1000);

        let fault = Exception::new(ExceptionCode::AccessViolation, 0x8200_2000, 0x1234);
        assert!(!debugger.on_unhandled_exception(&fault));
        assert_eq!(debugger.state(), DebugState::Running);
    }
}
