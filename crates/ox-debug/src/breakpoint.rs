//! Breakpoint management

/// A code breakpoint
#[derive(Debug, Clone)]
pub struct Breakpoint {
    /// Unique ID for this breakpoint
    pub id: u32,
    /// Guest address the breakpoint is set at
    pub address: u64,
    /// Whether the breakpoint is currently active
    pub enabled: bool,
    /// Number of times execution has hit it
    pub hit_count: u64,
}

/// Breakpoint manager
#[derive(Debug, Default)]
pub struct BreakpointManager {
    breakpoints: Vec<Breakpoint>,
    next_id: u32,
}

impl BreakpointManager {
    /// Create a new breakpoint manager
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            next_id: 1,
        }
    }

    /// Add a breakpoint at `address`, returning its ID
    pub fn add(&mut self, address: u64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.breakpoints.push(Breakpoint {
            id,
            address,
            enabled: true,
            hit_count: 0,
        });
        tracing::debug!("Breakpoint {} set at 0x{:016x}", id, address);
        id
    }

    /// Remove a breakpoint by ID, returning whether it existed
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        self.breakpoints.len() != before
    }

    /// Enable or disable a breakpoint by ID
    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        match self.breakpoints.iter_mut().find(|bp| bp.id == id) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Check whether an enabled breakpoint covers `address`
    pub fn is_set_at(&self, address: u64) -> bool {
        self.breakpoints
            .iter()
            .any(|bp| bp.enabled && bp.address == address)
    }

    /// Record a hit at `address`, returning whether a breakpoint matched
    pub fn record_hit(&mut self, address: u64) -> bool {
        match self
            .breakpoints
            .iter_mut()
            .find(|bp| bp.enabled && bp.address == address)
        {
            Some(bp) => {
                bp.hit_count += 1;
                true
            }
            None => false,
        }
    }

    /// All breakpoints
    pub fn all(&self) -> &[Breakpoint] {
        &self.breakpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove() {
        let mut manager = BreakpointManager::new();
        let id = manager.add(0x8200_1000);
        assert!(manager.is_set_at(0x8200_1000));
        assert!(manager.remove(id));
        assert!(!manager.is_set_at(0x8200_1000));
        assert!(!manager.remove(id));
    }

    #[test]
    fn test_disabled_breakpoint_does_not_match() {
        let mut manager = BreakpointManager::new();
        let id = manager.add(0x8200_2000);
        assert!(manager.set_enabled(id, false));
        assert!(!manager.is_set_at(0x8200_2000));
        assert!(!manager.record_hit(0x8200_2000));
    }

    #[test]
    fn test_record_hit_counts() {
        let mut manager = BreakpointManager::new();
        manager.add(0x8200_3000);
        assert!(manager.record_hit(0x8200_3000));
        assert!(manager.record_hit(0x8200_3000));
        assert_eq!(manager.all()[0].hit_count, 2);
    }
}
