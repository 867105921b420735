//! Live switch positions.

use loco_core::{SwitchId, SwitchPosition};

use crate::conflict::SwitchGrant;
use crate::topology::Topology;

/// Current position of every switch, indexed by [`SwitchId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchStates {
    positions: Vec<SwitchPosition>,
}

impl SwitchStates {
    /// All switches at their configured initial position.
    pub fn new(topology: &Topology) -> Self {
        let positions = topology
            .switches()
            .map(|sw| topology.initial_position(sw).unwrap_or_default())
            .collect();
        Self { positions }
    }

    /// Current position, `None` for unknown switches.
    pub fn get(&self, switch: SwitchId) -> Option<SwitchPosition> {
        self.positions.get(switch.0 as usize).copied()
    }

    /// Set a position directly, returning the previous one.
    ///
    /// Bypasses the conflict resolver; the engine only calls this with a
    /// [`SwitchGrant`] via [`apply`](Self::apply) or during ceremony staging.
    pub fn set(&mut self, switch: SwitchId, position: SwitchPosition) -> Option<SwitchPosition> {
        self.positions
            .get_mut(switch.0 as usize)
            .map(|slot| std::mem::replace(slot, position))
    }

    /// Commit a granted switch change.
    pub fn apply(&mut self, grant: &SwitchGrant) {
        if grant.changed {
            self.set(grant.switch, grant.position);
        }
    }

    /// Iterate `(switch, position)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (SwitchId, SwitchPosition)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .map(|(i, p)| (SwitchId(i as u32), *p))
    }

    /// Number of switches.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the layout has no switches.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
