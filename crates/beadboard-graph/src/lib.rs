//! Levels a bead dependency graph into executable phases.
//!
//! Phase 0 holds every bead with no unresolved in-set dependency; phase n
//! holds beads whose in-set dependencies all sit in phases < n. Beads on a
//! dependency cycle (or downstream of one) never get a normal phase number
//! and are reported as [`PhaseSlot::Unresolved`] instead.

use beadboard_proto::{Bead, BeadId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Phase computed for a single bead.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PhaseSlot {
    /// 0-based phase number.
    Assigned(u32),
    /// Member of a dependency cycle, or blocked behind one.
    Unresolved,
}

/// Mapping bead id -> phase, as produced by [`compute_phases`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseAssignment {
    slots: HashMap<BeadId, PhaseSlot>,
}

impl PhaseAssignment {
    pub fn phase_of(&self, bead_id: &str) -> Option<PhaseSlot> {
        self.slots.get(bead_id).copied()
    }

    pub fn assigned(&self, bead_id: &str) -> Option<u32> {
        match self.slots.get(bead_id) {
            Some(PhaseSlot::Assigned(phase)) => Some(*phase),
            _ => None,
        }
    }

    pub fn is_unresolved(&self, bead_id: &str) -> bool {
        matches!(self.slots.get(bead_id), Some(PhaseSlot::Unresolved))
    }

    /// Beads the display layer may offer to start right now: phase 0.
    pub fn startable(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, slot)| **slot == PhaseSlot::Assigned(0))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Compute the phase of every bead in `ids`.
///
/// Dependency edges are restricted to `ids`: a dependency referencing a
/// bead outside the set is treated as already satisfied and never blocks
/// assignment. A bead missing from `beads` is treated as having no
/// dependencies. Pure and deterministic; running it twice on the same
/// input yields the same assignment.
pub fn compute_phases(
    ids: &HashSet<BeadId>,
    beads: &HashMap<BeadId, Bead>,
) -> PhaseAssignment {
    // In-set dependency lists, fixed up front.
    let deps_in_set: HashMap<&str, Vec<&str>> = ids
        .iter()
        .map(|id| {
            let deps = beads
                .get(id)
                .map(|bead| {
                    bead.deps
                        .iter()
                        .filter(|dep| ids.contains(*dep))
                        .map(String::as_str)
                        .collect()
                })
                .unwrap_or_default();
            (id.as_str(), deps)
        })
        .collect();

    let mut phases: HashMap<&str, u32> = HashMap::new();

    // Each pass assigns every bead whose in-set deps are all already
    // assigned. A pass that assigns nothing means the remainder is cyclic
    // (or blocked behind a cycle), so the loop always terminates.
    loop {
        let mut assigned_this_pass = false;
        for (id, deps) in &deps_in_set {
            if phases.contains_key(id) {
                continue;
            }
            let mut max_dep_phase: Option<u32> = None;
            let mut blocked = false;
            for dep in deps {
                match phases.get(dep) {
                    Some(phase) => {
                        max_dep_phase = Some(max_dep_phase.map_or(*phase, |m| m.max(*phase)));
                    }
                    None => {
                        blocked = true;
                        break;
                    }
                }
            }
            if !blocked {
                phases.insert(*id, max_dep_phase.map_or(0, |m| m + 1));
                assigned_this_pass = true;
            }
        }
        if !assigned_this_pass {
            break;
        }
    }

    let slots = deps_in_set
        .keys()
        .map(|id| {
            let slot = phases
                .get(id)
                .map_or(PhaseSlot::Unresolved, |phase| PhaseSlot::Assigned(*phase));
            (id.to_string(), slot)
        })
        .collect();

    PhaseAssignment { slots }
}
