//! Topology construction errors.

use thiserror::Error;

/// Errors detected by [`Topology::from_config`](crate::Topology::from_config).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// The configuration defines no segments.
    #[error("topology has no segments")]
    Empty,
    /// Two segments, switches, or groups share a name.
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName {
        /// `"segment"` or `"switch"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A link or switch references a segment that is not defined.
    #[error("{context} references undefined segment '{name}'")]
    UndefinedSegment {
        /// Where the reference was found, e.g. `switch 'W1'`.
        context: String,
        /// The undefined segment name.
        name: String,
    },
    /// A switch uses the same segment for more than one of its legs.
    #[error("switch '{name}' uses segment '{segment}' twice")]
    DegenerateSwitch {
        /// The switch name.
        name: String,
        /// The repeated segment.
        segment: String,
    },
    /// A link connects a segment to itself.
    #[error("segment '{name}' is linked to itself")]
    SelfLink {
        /// The segment name.
        name: String,
    },
    /// More elements than fit in a 32-bit id.
    #[error("{kind} count {count} exceeds u32::MAX")]
    TooMany {
        /// Element kind.
        kind: &'static str,
        /// The offending count.
        count: usize,
    },
}
