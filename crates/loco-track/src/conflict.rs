//! Conflict resolver: decides whether a switch change or a power claim is safe.
//!
//! Only claims marked `powered` (trains `PoweredOn` or `Stopping`) block
//! other trains. When two requests compete within a tick the first one
//! applied wins; the second sees the first train's claim.

use loco_core::{ConflictReason, SegmentId, SegmentList, SwitchId, SwitchPosition, TrainId};

use crate::switch::SwitchStates;
use crate::topology::Topology;

/// Segments a train currently occupies.
#[derive(Clone, Debug, PartialEq)]
pub struct Claim {
    /// The train.
    pub train: TrainId,
    /// Occupied segments.
    pub segments: SegmentList,
    /// Whether the train holds track power (`PoweredOn` or `Stopping`).
    pub powered: bool,
}

/// A request to move a switch on behalf of a train.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchRequest {
    /// The requesting train.
    pub train: TrainId,
    /// The switch to move.
    pub switch: SwitchId,
    /// Requested position.
    pub position: SwitchPosition,
}

/// A validated switch change, ready to be committed with
/// [`SwitchStates::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchGrant {
    /// The switch.
    pub switch: SwitchId,
    /// Granted position.
    pub position: SwitchPosition,
    /// Position before the change.
    pub previous: SwitchPosition,
    /// `false` when the switch already was in the requested position.
    pub changed: bool,
}

/// Two powered trains holding conflicting segments.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    /// The later of the two trains in claim order.
    pub train: TrainId,
    /// The conflict, naming the earlier train as holder.
    pub reason: ConflictReason,
}

/// Borrowed view of everything needed to judge a request.
#[derive(Clone, Copy, Debug)]
pub struct ConflictResolver<'a> {
    topology: &'a Topology,
    states: &'a SwitchStates,
    claims: &'a [Claim],
    locked: bool,
}

impl<'a> ConflictResolver<'a> {
    /// Resolver over the given switch states and claims; switches unlocked.
    pub fn new(topology: &'a Topology, states: &'a SwitchStates, claims: &'a [Claim]) -> Self {
        Self {
            topology,
            states,
            claims,
            locked: false,
        }
    }

    /// Set the switch lock flag.
    pub fn locked(mut self, locked: bool) -> Self {
        self.locked = locked;
        self
    }

    /// Validate a switch change.
    ///
    /// 1. Locked switches are refused.
    /// 2. A request for the current position is granted as a no-op.
    /// 3. The change may not strand a train: no other powered train on the
    ///    trunk or the currently selected branch, and the requester not on
    ///    the currently selected branch.
    /// 4. No other powered train on the newly selected branch or on any
    ///    segment sharing a conflict group with it.
    pub fn check_switch(&self, request: &SwitchRequest) -> Result<SwitchGrant, ConflictReason> {
        let switch = request.switch;
        let (Some(trunk), Some(previous)) =
            (self.topology.trunk(switch), self.states.get(switch))
        else {
            return Err(ConflictReason::UnknownSwitch(switch));
        };
        if self.locked {
            return Err(ConflictReason::Locked);
        }
        if previous == request.position {
            return Ok(SwitchGrant {
                switch,
                position: previous,
                previous,
                changed: false,
            });
        }
        let current = self
            .topology
            .branch(switch, previous)
            .ok_or(ConflictReason::UnknownSwitch(switch))?;
        let next = self
            .topology
            .branch(switch, request.position)
            .ok_or(ConflictReason::UnknownSwitch(switch))?;

        for claim in self.claims {
            let is_requester = claim.train == request.train;
            for &held in &claim.segments {
                let strands = if is_requester {
                    held == current
                } else {
                    claim.powered && (held == trunk || held == current)
                };
                if strands {
                    return Err(ConflictReason::StrandsTrain {
                        train: claim.train,
                        segment: held,
                    });
                }
            }
        }

        self.check_segment(request.train, next)?;
        Ok(SwitchGrant {
            switch,
            position: request.position,
            previous,
            changed: true,
        })
    }

    /// `true` if [`check_switch`](Self::check_switch) would refuse the request.
    pub fn is_switch_impossible(&self, request: &SwitchRequest) -> bool {
        self.check_switch(request).is_err()
    }

    /// Whether `to` can be reached from `from` over the current switch
    /// positions.
    pub fn check_route(&self, from: SegmentId, to: SegmentId) -> Result<(), ConflictReason> {
        if self.topology.is_reachable(from, to, self.states) {
            Ok(())
        } else {
            Err(ConflictReason::Unreachable { from, to })
        }
    }

    /// Whether `train` may hold `segments` under power.
    pub fn check_claim(&self, train: TrainId, segments: &[SegmentId]) -> Result<(), ConflictReason> {
        segments
            .iter()
            .try_for_each(|&segment| self.check_segment(train, segment))
    }

    fn check_segment(&self, train: TrainId, segment: SegmentId) -> Result<(), ConflictReason> {
        if !self.topology.contains_segment(segment) {
            return Err(ConflictReason::UnknownSegment(segment));
        }
        for claim in self.claims.iter().filter(|c| c.powered && c.train != train) {
            for &held in &claim.segments {
                if let Some(reason) = pair_conflict(self.topology, segment, held, claim.train) {
                    return Err(reason);
                }
            }
        }
        Ok(())
    }

    /// First pair of powered claims that conflict, if any.
    pub fn find_violation(topology: &Topology, claims: &[Claim]) -> Option<Violation> {
        let powered: Vec<&Claim> = claims.iter().filter(|c| c.powered).collect();
        for (i, first) in powered.iter().enumerate() {
            for second in &powered[i + 1..] {
                if first.train == second.train {
                    continue;
                }
                for &a in &first.segments {
                    for &b in &second.segments {
                        if let Some(reason) = pair_conflict(topology, b, a, first.train) {
                            return Some(Violation {
                                train: second.train,
                                reason,
                            });
                        }
                    }
                }
            }
        }
        None
    }
}

/// Conflict between `wanted` and a segment `held` by `holder`. A shared
/// group is reported in preference to the bare segment.
fn pair_conflict(
    topology: &Topology,
    wanted: SegmentId,
    held: SegmentId,
    holder: TrainId,
) -> Option<ConflictReason> {
    if let Some(group) = topology.shared_group(wanted, held) {
        return Some(ConflictReason::GroupOccupied {
            group,
            group_name: topology.group_name(group).unwrap_or_default().to_string(),
            holder,
        });
    }
    (wanted == held).then_some(ConflictReason::SegmentOccupied {
        segment: wanted,
        holder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SegmentConfig, SwitchConfig, TopologyConfig};
    use proptest::prelude::*;
    use smallvec::smallvec;

    const A: TrainId = TrainId(0);
    const B: TrainId = TrainId(1);

    // Segments: 0 trunk, 1 S1 (G1), 2 S2, 3 S3 (G1), 4 yard
    // W1: trunk → straight S2 / diverging S1
    fn layout() -> Topology {
        Topology::from_config(&TopologyConfig {
            segments: vec![
                SegmentConfig::new("trunk"),
                SegmentConfig::new("S1").in_group("G1"),
                SegmentConfig::new("S2"),
                SegmentConfig::new("S3").in_group("G1"),
                SegmentConfig::new("yard"),
            ],
            links: vec![["S1".into(), "S3".into()], ["trunk".into(), "yard".into()]],
            switches: vec![SwitchConfig {
                name: "W1".into(),
                trunk: "trunk".into(),
                straight: "S2".into(),
                diverging: "S1".into(),
                initial: SwitchPosition::Straight,
            }],
        })
        .unwrap()
    }

    fn claim(train: TrainId, seg: u32, powered: bool) -> Claim {
        Claim {
            train,
            segments: smallvec![SegmentId(seg)],
            powered,
        }
    }

    fn throw(train: TrainId, position: SwitchPosition) -> SwitchRequest {
        SwitchRequest {
            train,
            switch: SwitchId(0),
            position,
        }
    }

    #[test]
    fn group_conflict_blocks_route_onto_occupied_branch() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        // A on S1 (G1) powered, B on the yard wants W1 diverging onto S1.
        let claims = [claim(A, 1, true), claim(B, 4, true)];
        let resolver = ConflictResolver::new(&topo, &states, &claims);
        let err = resolver
            .check_switch(&throw(B, SwitchPosition::Diverging))
            .unwrap_err();
        assert_eq!(err.to_string(), "group G1 occupied");
        assert_eq!(err.holder(), Some(A));
    }

    #[test]
    fn group_conflict_via_other_member() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        let claims = [claim(A, 3, true), claim(B, 4, true)];
        let resolver = ConflictResolver::new(&topo, &states, &claims);
        assert!(matches!(
            resolver.check_switch(&throw(B, SwitchPosition::Diverging)),
            Err(ConflictReason::GroupOccupied { holder: A, .. })
        ));
    }

    #[test]
    fn unpowered_trains_do_not_block() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        let claims = [claim(A, 1, false), claim(B, 4, true)];
        let resolver = ConflictResolver::new(&topo, &states, &claims);
        let grant = resolver
            .check_switch(&throw(B, SwitchPosition::Diverging))
            .unwrap();
        assert!(grant.changed);
        assert_eq!(grant.previous, SwitchPosition::Straight);
    }

    #[test]
    fn same_position_is_a_noop_grant() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        // Even a train on the trunk does not matter for a no-op.
        let claims = [claim(A, 0, true)];
        let resolver = ConflictResolver::new(&topo, &states, &claims);
        let grant = resolver
            .check_switch(&throw(B, SwitchPosition::Straight))
            .unwrap();
        assert!(!grant.changed);
    }

    #[test]
    fn locked_switches_refuse_everything() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        let resolver = ConflictResolver::new(&topo, &states, &[]).locked(true);
        assert_eq!(
            resolver.check_switch(&throw(A, SwitchPosition::Straight)),
            Err(ConflictReason::Locked)
        );
        assert!(resolver.is_switch_impossible(&throw(A, SwitchPosition::Diverging)));
    }

    #[test]
    fn strand_checks() {
        let topo = layout();
        let states = SwitchStates::new(&topo);

        // Other powered train on the trunk.
        let claims = [claim(A, 0, true)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert_eq!(
            r.check_switch(&throw(B, SwitchPosition::Diverging)),
            Err(ConflictReason::StrandsTrain {
                train: A,
                segment: SegmentId(0)
            })
        );

        // Other powered train on the selected branch.
        let claims = [claim(A, 2, true)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert!(matches!(
            r.check_switch(&throw(B, SwitchPosition::Diverging)),
            Err(ConflictReason::StrandsTrain { train: A, .. })
        ));

        // Requester itself on the selected branch, even unpowered.
        let claims = [claim(B, 2, false)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert!(matches!(
            r.check_switch(&throw(B, SwitchPosition::Diverging)),
            Err(ConflictReason::StrandsTrain { train: B, .. })
        ));

        // Requester on the trunk is fine.
        let claims = [claim(B, 0, true)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert!(r.check_switch(&throw(B, SwitchPosition::Diverging)).is_ok());
    }

    #[test]
    fn unknown_switch() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        let r = ConflictResolver::new(&topo, &states, &[]);
        let req = SwitchRequest {
            train: A,
            switch: SwitchId(7),
            position: SwitchPosition::Straight,
        };
        assert_eq!(
            r.check_switch(&req),
            Err(ConflictReason::UnknownSwitch(SwitchId(7)))
        );
    }

    #[test]
    fn check_claim_prefers_group_reason() {
        let topo = layout();
        let states = SwitchStates::new(&topo);
        let claims = [claim(A, 1, true)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert!(matches!(
            r.check_claim(B, &[SegmentId(1)]),
            Err(ConflictReason::GroupOccupied { .. })
        ));
        let claims = [claim(A, 4, true)];
        let r = ConflictResolver::new(&topo, &states, &claims);
        assert_eq!(
            r.check_claim(B, &[SegmentId(4)]),
            Err(ConflictReason::SegmentOccupied {
                segment: SegmentId(4),
                holder: A
            })
        );
        assert!(r.check_claim(A, &[SegmentId(4)]).is_ok());
        assert_eq!(
            r.check_claim(B, &[SegmentId(40)]),
            Err(ConflictReason::UnknownSegment(SegmentId(40)))
        );
    }

    #[test]
    fn route_follows_switch_position() {
        let topo = layout();
        let mut states = SwitchStates::new(&topo);
        let resolver = ConflictResolver::new(&topo, &states, &[]);
        // W1 straight: trunk reaches S2 and the yard, not S1.
        assert!(resolver.check_route(SegmentId(0), SegmentId(2)).is_ok());
        assert_eq!(
            resolver.check_route(SegmentId(4), SegmentId(1)),
            Err(ConflictReason::Unreachable {
                from: SegmentId(4),
                to: SegmentId(1)
            })
        );
        states.set(SwitchId(0), SwitchPosition::Diverging);
        let resolver = ConflictResolver::new(&topo, &states, &[]);
        assert!(resolver.check_route(SegmentId(4), SegmentId(3)).is_ok());
    }

    #[test]
    fn violation_names_later_train() {
        let topo = layout();
        let claims = [claim(A, 1, true), claim(B, 3, true)];
        let v = ConflictResolver::find_violation(&topo, &claims).unwrap();
        assert_eq!(v.train, B);
        assert_eq!(v.reason.holder(), Some(A));

        let claims = [claim(A, 1, true), claim(B, 3, false)];
        assert!(ConflictResolver::find_violation(&topo, &claims).is_none());
    }

    proptest! {
        /// A changed route granted to B leaves no violation once B moves
        /// onto the newly selected branch.
        #[test]
        fn grants_never_create_violations(
            a_seg in 0u32..5,
            b_seg in 0u32..5,
            a_powered: bool,
            diverging: bool,
        ) {
            let topo = layout();
            let states = SwitchStates::new(&topo);
            let position = if diverging { SwitchPosition::Diverging } else { SwitchPosition::Straight };
            let claims = [claim(A, a_seg, a_powered), claim(B, b_seg, true)];
            prop_assume!(ConflictResolver::find_violation(&topo, &claims).is_none());

            let resolver = ConflictResolver::new(&topo, &states, &claims);
            if let Ok(grant) = resolver.check_switch(&throw(B, position)) {
                prop_assume!(grant.changed);
                let branch = topo.branch(grant.switch, grant.position).unwrap();
                let moved = [claim(A, a_seg, a_powered), claim(B, branch.0, true)];
                prop_assert!(ConflictResolver::find_violation(&topo, &moved).is_none());
            }
        }
    }
}
