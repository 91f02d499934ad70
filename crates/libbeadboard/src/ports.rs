use crate::error::OrchestratorError;
use beadboard_proto::BeadId;
use std::collections::HashMap;
use tracing::debug;

/// In-process registry of dev-server ports, keyed by bead. Pure
/// bookkeeping: it prevents two sessions from being handed the same
/// logical port number but does not probe OS-level bind availability;
/// that belongs to whatever process ultimately binds the port.
///
/// Mutated only under the orchestrator's lock, so allocation has a single
/// serialized decision point.
#[derive(Debug)]
pub struct PortAllocator {
    base_port: u16,
    port_span: u16,
    allocated: HashMap<BeadId, u16>,
}

impl PortAllocator {
    pub fn new(base_port: u16, port_span: u16) -> Self {
        Self {
            base_port,
            port_span,
            allocated: HashMap::new(),
        }
    }

    /// Hand out the first free port at or above the base port. Allocating
    /// again for a bead that already holds a port returns that same port.
    pub fn allocate(&mut self, bead_id: &str) -> Result<u16, OrchestratorError> {
        if let Some(&port) = self.allocated.get(bead_id) {
            return Ok(port);
        }
        for offset in 0..self.port_span {
            let Some(port) = self.base_port.checked_add(offset) else {
                break;
            };
            if !self.allocated.values().any(|&taken| taken == port) {
                self.allocated.insert(bead_id.to_string(), port);
                debug!(bead_id = %bead_id, port, "port allocated");
                return Ok(port);
            }
        }
        Err(OrchestratorError::NoPortsAvailable)
    }

    /// Release a bead's port. No-op when the bead holds none; never
    /// touches another bead's allocation.
    pub fn release(&mut self, bead_id: &str) -> Option<u16> {
        let released = self.allocated.remove(bead_id);
        if let Some(port) = released {
            debug!(bead_id = %bead_id, port, "port released");
        }
        released
    }

    pub fn port_for(&self, bead_id: &str) -> Option<u16> {
        self.allocated.get(bead_id).copied()
    }

    /// Current allocations sorted by port, for diagnostics.
    pub fn snapshot(&self) -> Vec<(BeadId, u16)> {
        let mut entries: Vec<_> = self
            .allocated
            .iter()
            .map(|(id, &port)| (id.clone(), port))
            .collect();
        entries.sort_by_key(|(_, port)| *port);
        entries
    }

    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_upward_and_reuses_freed_ports() {
        let mut ports = PortAllocator::new(3000, 10);
        assert_eq!(ports.allocate("t1").expect("allocate t1"), 3000);
        assert_eq!(ports.allocate("t2").expect("allocate t2"), 3001);

        ports.release("t1");
        assert_eq!(ports.allocate("t3").expect("allocate t3"), 3000);
    }

    #[test]
    fn allocate_is_idempotent_per_bead() {
        let mut ports = PortAllocator::new(3000, 10);
        let first = ports.allocate("t1").expect("allocate");
        let again = ports.allocate("t1").expect("allocate again");
        assert_eq!(first, again);
        assert_eq!(ports.len(), 1);
    }

    #[test]
    fn distinct_beads_never_share_a_port() {
        let mut ports = PortAllocator::new(3000, 50);
        let mut seen = std::collections::HashSet::new();
        for n in 0..20 {
            let port = ports.allocate(&format!("t{n}")).expect("allocate");
            assert!(seen.insert(port), "port {port} handed out twice");
        }
    }

    #[test]
    fn release_is_idempotent_and_leaves_others_alone() {
        let mut ports = PortAllocator::new(3000, 10);
        ports.allocate("t1").expect("allocate t1");
        ports.allocate("t2").expect("allocate t2");

        assert_eq!(ports.release("t1"), Some(3000));
        assert_eq!(ports.release("t1"), None);
        assert_eq!(ports.port_for("t2"), Some(3001));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut ports = PortAllocator::new(3000, 2);
        ports.allocate("t1").expect("allocate t1");
        ports.allocate("t2").expect("allocate t2");
        let err = ports.allocate("t3").expect_err("range exhausted");
        assert!(matches!(err, OrchestratorError::NoPortsAvailable));
    }

    #[test]
    fn span_past_u16_max_stops_cleanly() {
        let mut ports = PortAllocator::new(u16::MAX - 1, 10);
        assert_eq!(ports.allocate("t1").expect("allocate"), u16::MAX - 1);
        assert_eq!(ports.allocate("t2").expect("allocate"), u16::MAX);
        let err = ports.allocate("t3").expect_err("no room past u16::MAX");
        assert!(matches!(err, OrchestratorError::NoPortsAvailable));
    }
}
