//! Serde model of the `[topology]` configuration table.
//!
//! ```toml
//! [topology]
//! links = [["ring-north", "approach"]]
//!
//! [[topology.segments]]
//! name = "platform-1"
//! groups = ["station"]
//!
//! [[topology.switches]]
//! name = "W1"
//! trunk = "approach"
//! straight = "platform-1"
//! diverging = "platform-2"
//! ```

use loco_core::SwitchPosition;
use serde::{Deserialize, Serialize};

/// Complete static description of the layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyConfig {
    /// Track segments in id order.
    #[serde(default)]
    pub segments: Vec<SegmentConfig>,
    /// Unconditional connections between two segments.
    #[serde(default)]
    pub links: Vec<[String; 2]>,
    /// Switches in id order.
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
}

/// One track segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentConfig {
    /// Unique segment name.
    pub name: String,
    /// Names of the conflict groups this segment belongs to. Groups are
    /// created on first mention.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// One switch (turnout).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    /// Unique switch name.
    pub name: String,
    /// Segment on the single-track side.
    pub trunk: String,
    /// Segment reached in the straight position.
    pub straight: String,
    /// Segment reached in the diverging position.
    pub diverging: String,
    /// Position at startup.
    #[serde(default)]
    pub initial: SwitchPosition,
}

impl SegmentConfig {
    /// Segment with no conflict groups.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Add the segment to a conflict group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}
