//! Hardware egress: track power levels and switch routes.
//!
//! The engine computes the desired power level of every segment and the
//! position of every switch once per tick and hands only the changes to a
//! [`SignalSink`]. Nothing is sent in `virtual` or `show` mode, nor while
//! the opening ceremony is being staged.

use loco_core::{SegmentId, SwitchId, SwitchPosition};
use tracing::{debug, info};

/// Receiver of hardware commands.
pub trait SignalSink: Send + 'static {
    /// Switch track power on `segment`. `None` cuts the power;
    /// `Some(code)` energises the segment at decoder speed code `code`,
    /// where `Some(0)` is powered at standstill.
    fn power(&mut self, segment: SegmentId, level: Option<u8>);

    /// Set `switch` to `position`.
    fn route(&mut self, switch: SwitchId, position: SwitchPosition);
}

/// A single hardware command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalCommand {
    /// Power level of a segment.
    Power {
        /// The segment.
        segment: SegmentId,
        /// Decoder speed code, `None` = no power.
        level: Option<u8>,
    },
    /// Position of a switch.
    Route {
        /// The switch.
        switch: SwitchId,
        /// Commanded position.
        position: SwitchPosition,
    },
}

impl SignalCommand {
    /// Deliver this command to `sink`.
    pub fn send(self, sink: &mut dyn SignalSink) {
        match self {
            Self::Power { segment, level } => sink.power(segment, level),
            Self::Route { switch, position } => sink.route(switch, position),
        }
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl SignalSink for NullSink {
    fn power(&mut self, _segment: SegmentId, _level: Option<u8>) {}

    fn route(&mut self, _switch: SwitchId, _position: SwitchPosition) {}
}

/// Writes every command to the log. Used by the runner until a hardware
/// bridge is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingSink;

impl SignalSink for LoggingSink {
    fn power(&mut self, segment: SegmentId, level: Option<u8>) {
        match level {
            Some(code) => debug!(%segment, code, "track power"),
            None => debug!(%segment, "track power off"),
        }
    }

    fn route(&mut self, switch: SwitchId, position: SwitchPosition) {
        info!(%switch, %position, "switch route");
    }
}

/// Last values handed to the sink; used to send only changes.
#[derive(Clone, Debug)]
pub(crate) struct SignalState {
    power: Vec<Option<Option<u8>>>,
    routes: Vec<Option<SwitchPosition>>,
}

impl SignalState {
    pub(crate) fn new(segments: usize, switches: usize) -> Self {
        Self {
            power: vec![None; segments],
            routes: vec![None; switches],
        }
    }

    /// Commands needed to move the hardware from the last sent state to
    /// `power` and `routes`, recording them as sent.
    pub(crate) fn diff(
        &mut self,
        power: &[Option<u8>],
        routes: &[SwitchPosition],
    ) -> Vec<SignalCommand> {
        let mut out = Vec::new();
        for (i, &level) in power.iter().enumerate() {
            let Some(last) = self.power.get_mut(i) else {
                break;
            };
            if *last != Some(level) {
                *last = Some(level);
                out.push(SignalCommand::Power {
                    segment: SegmentId(i as u32),
                    level,
                });
            }
        }
        for (i, &position) in routes.iter().enumerate() {
            let Some(last) = self.routes.get_mut(i) else {
                break;
            };
            if *last != Some(position) {
                *last = Some(position);
                out.push(SignalCommand::Route {
                    switch: SwitchId(i as u32),
                    position,
                });
            }
        }
        out
    }
}
