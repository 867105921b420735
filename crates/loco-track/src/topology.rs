//! Static track graph: segments, switches, links, and conflict groups.

use std::collections::VecDeque;

use indexmap::IndexMap;
use loco_core::{GroupId, SegmentId, SwitchId, SwitchPosition};
use smallvec::SmallVec;

use crate::config::TopologyConfig;
use crate::error::TopologyError;
use crate::switch::SwitchStates;

#[derive(Clone, Debug)]
struct Segment {
    groups: SmallVec<[GroupId; 2]>,
    switches: SmallVec<[SwitchId; 2]>,
    links: SmallVec<[SegmentId; 4]>,
}

#[derive(Clone, Debug)]
struct Switch {
    /// trunk, straight, diverging
    legs: [SegmentId; 3],
    initial: SwitchPosition,
}

/// Immutable track graph built once at startup.
///
/// Segments, switches, and groups are numbered in configuration order;
/// `SegmentId(n)` is the n-th `[[topology.segments]]` entry. Conflict
/// groups are numbered in order of first mention.
#[derive(Clone, Debug)]
pub struct Topology {
    segment_names: IndexMap<String, Segment>,
    switch_names: IndexMap<String, Switch>,
    group_names: IndexMap<String, SmallVec<[SegmentId; 4]>>,
}

impl Topology {
    /// Build and validate a topology.
    pub fn from_config(config: &TopologyConfig) -> Result<Self, TopologyError> {
        if config.segments.is_empty() {
            return Err(TopologyError::Empty);
        }
        check_count("segment", config.segments.len())?;
        check_count("switch", config.switches.len())?;

        let mut segment_names: IndexMap<String, Segment> = IndexMap::new();
        let mut group_names: IndexMap<String, SmallVec<[SegmentId; 4]>> = IndexMap::new();

        for (i, seg) in config.segments.iter().enumerate() {
            let id = SegmentId(i as u32);
            let mut groups = SmallVec::new();
            for group in &seg.groups {
                let entry = group_names.entry(group.clone());
                let gid = GroupId(entry.index() as u32);
                let members = entry.or_default();
                if !members.contains(&id) {
                    members.push(id);
                    groups.push(gid);
                }
            }
            let segment = Segment {
                groups,
                switches: SmallVec::new(),
                links: SmallVec::new(),
            };
            if segment_names.insert(seg.name.clone(), segment).is_some() {
                return Err(TopologyError::DuplicateName {
                    kind: "segment",
                    name: seg.name.clone(),
                });
            }
        }
        check_count("group", group_names.len())?;

        let lookup = |names: &IndexMap<String, Segment>, context: &str, name: &str| {
            names
                .get_index_of(name)
                .map(|i| SegmentId(i as u32))
                .ok_or_else(|| TopologyError::UndefinedSegment {
                    context: context.to_string(),
                    name: name.to_string(),
                })
        };

        for [a, b] in &config.links {
            let context = format!("link '{a}'-'{b}'");
            let ia = lookup(&segment_names, &context, a)?;
            let ib = lookup(&segment_names, &context, b)?;
            if ia == ib {
                return Err(TopologyError::SelfLink { name: a.clone() });
            }
            add_link(&mut segment_names, ia, ib);
            add_link(&mut segment_names, ib, ia);
        }

        let mut switch_names: IndexMap<String, Switch> = IndexMap::new();
        for (i, sw) in config.switches.iter().enumerate() {
            let id = SwitchId(i as u32);
            let context = format!("switch '{}'", sw.name);
            let legs = [
                lookup(&segment_names, &context, &sw.trunk)?,
                lookup(&segment_names, &context, &sw.straight)?,
                lookup(&segment_names, &context, &sw.diverging)?,
            ];
            for (j, leg) in legs.iter().enumerate() {
                if legs[j + 1..].contains(leg) {
                    let segment = segment_names
                        .get_index(leg.0 as usize)
                        .map(|(n, _)| n.clone())
                        .unwrap_or_default();
                    return Err(TopologyError::DegenerateSwitch {
                        name: sw.name.clone(),
                        segment,
                    });
                }
            }
            for leg in legs {
                if let Some((_, seg)) = segment_names.get_index_mut(leg.0 as usize) {
                    seg.switches.push(id);
                }
            }
            let switch = Switch {
                legs,
                initial: sw.initial,
            };
            if switch_names.insert(sw.name.clone(), switch).is_some() {
                return Err(TopologyError::DuplicateName {
                    kind: "switch",
                    name: sw.name.clone(),
                });
            }
        }

        Ok(Self {
            segment_names,
            switch_names,
            group_names,
        })
    }

    // ── Counts ──────────────────────────────────────────────────────

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segment_names.len()
    }

    /// Number of switches.
    pub fn switch_count(&self) -> usize {
        self.switch_names.len()
    }

    /// Number of conflict groups.
    pub fn group_count(&self) -> usize {
        self.group_names.len()
    }

    /// All switch ids in order.
    pub fn switches(&self) -> impl Iterator<Item = SwitchId> + '_ {
        (0..self.switch_names.len()).map(|i| SwitchId(i as u32))
    }

    /// Whether the segment id is defined.
    pub fn contains_segment(&self, segment: SegmentId) -> bool {
        (segment.0 as usize) < self.segment_names.len()
    }

    // ── Structure ───────────────────────────────────────────────────

    /// Legs of a switch: trunk, straight, diverging. Empty for unknown ids.
    pub fn segments_for(&self, switch: SwitchId) -> &[SegmentId] {
        self.switch(switch).map_or(&[], |s| &s.legs[..])
    }

    /// Conflict groups the segment belongs to.
    pub fn conflict_group(&self, segment: SegmentId) -> &[GroupId] {
        self.segment(segment).map_or(&[], |s| &s.groups[..])
    }

    /// Switches the segment is a leg of.
    pub fn switches_for(&self, segment: SegmentId) -> &[SwitchId] {
        self.segment(segment).map_or(&[], |s| &s.switches[..])
    }

    /// Segments belonging to a conflict group.
    pub fn group_members(&self, group: GroupId) -> &[SegmentId] {
        self.group_names
            .get_index(group.0 as usize)
            .map_or(&[], |(_, m)| &m[..])
    }

    /// Trunk segment of a switch.
    pub fn trunk(&self, switch: SwitchId) -> Option<SegmentId> {
        self.switch(switch).map(|s| s.legs[0])
    }

    /// Branch selected by `position`.
    pub fn branch(&self, switch: SwitchId, position: SwitchPosition) -> Option<SegmentId> {
        self.switch(switch).map(|s| match position {
            SwitchPosition::Straight => s.legs[1],
            SwitchPosition::Diverging => s.legs[2],
        })
    }

    /// Configured startup position of a switch.
    pub fn initial_position(&self, switch: SwitchId) -> Option<SwitchPosition> {
        self.switch(switch).map(|s| s.initial)
    }

    /// Whether `a` and `b` share a conflict group.
    pub fn shared_group(&self, a: SegmentId, b: SegmentId) -> Option<GroupId> {
        let gb = self.conflict_group(b);
        self.conflict_group(a)
            .iter()
            .copied()
            .find(|g| gb.contains(g))
    }

    /// Breadth-first search over static links plus, for every switch, the
    /// edge between its trunk and the currently selected branch.
    pub fn is_reachable(&self, from: SegmentId, to: SegmentId, states: &SwitchStates) -> bool {
        if !self.contains_segment(from) || !self.contains_segment(to) {
            return false;
        }
        let mut seen = vec![false; self.segment_count()];
        let mut queue = VecDeque::new();
        seen[from.0 as usize] = true;
        queue.push_back(from);

        while let Some(seg) = queue.pop_front() {
            if seg == to {
                return true;
            }
            for next in self.neighbours(seg, states) {
                let slot = &mut seen[next.0 as usize];
                if !*slot {
                    *slot = true;
                    queue.push_back(next);
                }
            }
        }
        false
    }

    /// Segments directly reachable from `segment` under the given switch states.
    pub fn neighbours(&self, segment: SegmentId, states: &SwitchStates) -> SmallVec<[SegmentId; 4]> {
        let Some(seg) = self.segment(segment) else {
            return SmallVec::new();
        };
        let mut out = seg.links.clone();
        for &sw in &seg.switches {
            let (Some(trunk), Some(position)) = (self.trunk(sw), states.get(sw)) else {
                continue;
            };
            let Some(selected) = self.branch(sw, position) else {
                continue;
            };
            let other = if segment == trunk {
                selected
            } else if segment == selected {
                trunk
            } else {
                continue;
            };
            if !out.contains(&other) {
                out.push(other);
            }
        }
        out
    }

    // ── Names ───────────────────────────────────────────────────────

    /// Look up a segment by name.
    pub fn segment_id(&self, name: &str) -> Option<SegmentId> {
        self.segment_names
            .get_index_of(name)
            .map(|i| SegmentId(i as u32))
    }

    /// Look up a switch by name.
    pub fn switch_id(&self, name: &str) -> Option<SwitchId> {
        self.switch_names
            .get_index_of(name)
            .map(|i| SwitchId(i as u32))
    }

    /// Look up a conflict group by name.
    pub fn group_id(&self, name: &str) -> Option<GroupId> {
        self.group_names
            .get_index_of(name)
            .map(|i| GroupId(i as u32))
    }

    /// Name of a segment.
    pub fn segment_name(&self, segment: SegmentId) -> Option<&str> {
        self.segment_names
            .get_index(segment.0 as usize)
            .map(|(n, _)| n.as_str())
    }

    /// Name of a switch.
    pub fn switch_name(&self, switch: SwitchId) -> Option<&str> {
        self.switch_names
            .get_index(switch.0 as usize)
            .map(|(n, _)| n.as_str())
    }

    /// Name of a conflict group.
    pub fn group_name(&self, group: GroupId) -> Option<&str> {
        self.group_names
            .get_index(group.0 as usize)
            .map(|(n, _)| n.as_str())
    }

    fn segment(&self, segment: SegmentId) -> Option<&Segment> {
        self.segment_names
            .get_index(segment.0 as usize)
            .map(|(_, s)| s)
    }

    fn switch(&self, switch: SwitchId) -> Option<&Switch> {
        self.switch_names
            .get_index(switch.0 as usize)
            .map(|(_, s)| s)
    }
}

fn check_count(kind: &'static str, count: usize) -> Result<(), TopologyError> {
    if count > u32::MAX as usize {
        return Err(TopologyError::TooMany { kind, count });
    }
    Ok(())
}

fn add_link(names: &mut IndexMap<String, Segment>, from: SegmentId, to: SegmentId) {
    if let Some((_, seg)) = names.get_index_mut(from.0 as usize) {
        if !seg.links.contains(&to) {
            seg.links.push(to);
        }
    }
}
