//! Control configuration, process flags, validation, and error types.
//!
//! [`ControlConfig`] is deserialized from TOML and describes everything
//! that is fixed for the lifetime of a controller: engine timing, safety
//! windows, the track topology, the trains, and the rounds.
//! [`validate()`](ControlConfig::validate) checks structural invariants
//! and cross references at startup. [`ModeFlags`] carries the per-process
//! switches (`debug`, `virtual`, `show`, ...) and is kept separate so the
//! same layout file serves every mode.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use loco_core::{RoundKind, SwitchPosition};
use loco_track::{Topology, TopologyConfig, TopologyError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of entries in a decoder speed table.
pub const SPEED_STEPS: usize = 15;

fn default_tick_rate_hz() -> f64 {
    10.0
}

fn default_max_ingress_queue() -> usize {
    256
}

fn default_ring_buffer_size() -> usize {
    8
}

fn default_stop_timeout_s() -> f64 {
    30.0
}

fn default_power_on_cooldown_s() -> f64 {
    5.0
}

fn default_debug_stop_factor() -> f64 {
    0.2
}

fn default_time_dilation() -> f64 {
    10.0
}

fn default_seed() -> u64 {
    0xF9_3E
}

fn default_repeat() -> u32 {
    1
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while loading or validating a [`ControlConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration is not valid TOML or does not match the schema.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// The topology section is inconsistent.
    #[error("topology: {0}")]
    Topology(#[from] TopologyError),
    /// tick_rate_hz is NaN, infinite, zero, or negative.
    #[error("tick_rate_hz must be finite and positive, got {value}")]
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// Ingress queue capacity is zero.
    #[error("max_ingress_queue must be at least 1")]
    IngressQueueZero,
    /// Ring buffer size is below the minimum of 2.
    #[error("ring_buffer_size {configured} is below minimum of 2")]
    RingBufferTooSmall {
        /// The configured size that was too small.
        configured: usize,
    },
    /// A duration, rate, or factor is out of range.
    #[error("{field} out of range: {value}")]
    InvalidValue {
        /// Name of the offending setting.
        field: String,
        /// The configured value.
        value: f64,
    },
    /// No trains are configured.
    #[error("no trains configured")]
    NoTrains,
    /// Two trains or two rounds share a name.
    #[error("duplicate {kind} '{name}'")]
    Duplicate {
        /// `"train"`, `"round"`, or `"checklist item"`.
        kind: &'static str,
        /// The repeated name.
        name: String,
    },
    /// A speed table does not have exactly [`SPEED_STEPS`] entries, or is
    /// not non-decreasing from zero.
    #[error("train '{train}': {reason}")]
    InvalidSpeedTable {
        /// The train name.
        train: String,
        /// What is wrong with the table.
        reason: String,
    },
    /// A train's start position is empty or longer than two segments.
    #[error("train '{train}' must start on one or two segments, got {count}")]
    InvalidStart {
        /// The train name.
        train: String,
        /// Number of configured start segments.
        count: usize,
    },
    /// A name does not resolve.
    #[error("{context} references unknown {kind} '{name}'")]
    UnknownReference {
        /// Where the reference was found.
        context: String,
        /// `"train"`, `"segment"`, or `"switch"`.
        kind: &'static str,
        /// The unresolved name.
        name: String,
    },
    /// A leg is assigned to a train that is not a member of its round.
    #[error("round '{round}': leg for non-member train '{train}'")]
    LegForNonMember {
        /// The round.
        round: RoundKind,
        /// The train.
        train: String,
    },
    /// A process flag asks for a round that is not configured.
    #[error("round '{kind}' is not configured")]
    MissingRound {
        /// The requested round.
        kind: RoundKind,
    },
    /// A ceremony position is declared outside the opening round.
    #[error("round '{round}': ceremony positions are only valid for the opening round")]
    UnexpectedCeremony {
        /// The round carrying ceremony positions.
        round: RoundKind,
    },
    /// A background thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of which thread failed.
        reason: String,
    },
}

// ── ModeFlags ──────────────────────────────────────────────────────

/// Per-process operating flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeFlags {
    /// Relax safety timers and ignore off-time windows.
    pub debug: bool,
    /// Run the opening ceremony before the first regular round.
    pub opening: bool,
    /// Sound enabled. Forwarded in the snapshot only.
    pub sound: bool,
    /// No hardware attached: suppress all signals.
    pub virtual_mode: bool,
    /// Read-only exhibition display: no control, no dispatch.
    pub show: bool,
    /// Round to start with instead of the first configured cycle round.
    pub round: Option<RoundKind>,
    /// Log round durations.
    pub measure: bool,
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self {
            debug: false,
            opening: false,
            sound: true,
            virtual_mode: false,
            show: false,
            round: None,
            measure: false,
        }
    }
}

impl ModeFlags {
    /// Flags for a simulation without hardware, with relaxed timers.
    pub fn simulation() -> Self {
        Self {
            debug: true,
            virtual_mode: true,
            ..Self::default()
        }
    }

    /// Whether timers run dilated.
    pub fn dilated(&self) -> bool {
        self.debug && self.virtual_mode
    }

    /// Whether hardware signals are emitted.
    pub fn emits_signals(&self) -> bool {
        !self.virtual_mode && !self.show
    }
}

// ── Sections ───────────────────────────────────────────────────────

/// Timing and capacity of the update loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Update loop frequency. One tick advances time by `1 / tick_rate_hz`.
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,
    /// Maximum number of intents buffered between ticks.
    #[serde(default = "default_max_ingress_queue")]
    pub max_ingress_queue: usize,
    /// Number of published snapshots retained.
    #[serde(default = "default_ring_buffer_size")]
    pub ring_buffer_size: usize,
    /// Longest ramp-down before power is cut regardless of speed.
    #[serde(default = "default_stop_timeout_s")]
    pub stop_timeout_s: f64,
    /// Time after a power cut during which power-on is refused.
    #[serde(default = "default_power_on_cooldown_s")]
    pub power_on_cooldown_s: f64,
    /// Multiplier for stop timeout and cooldown in debug mode.
    #[serde(default = "default_debug_stop_factor")]
    pub debug_stop_factor: f64,
    /// Speed-up of all timers in debug + virtual mode.
    #[serde(default = "default_time_dilation")]
    pub time_dilation: f64,
    /// Seed for pause jitter.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            max_ingress_queue: default_max_ingress_queue(),
            ring_buffer_size: default_ring_buffer_size(),
            stop_timeout_s: default_stop_timeout_s(),
            power_on_cooldown_s: default_power_on_cooldown_s(),
            debug_stop_factor: default_debug_stop_factor(),
            time_dilation: default_time_dilation(),
            seed: default_seed(),
        }
    }
}

/// Time window, `start` inclusive and `end` exclusive. A window with
/// `end <= start` wraps past midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    /// First minute of the window.
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    /// First minute after the window.
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

/// Museum opening hours; outside them every round is in off-time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatingHoursConfig {
    /// Opening time.
    #[serde(with = "hhmm")]
    pub open: NaiveTime,
    /// Closing time.
    #[serde(with = "hhmm")]
    pub close: NaiveTime,
}

/// Rounds may only begin in the first `window_min` minutes of every
/// `every_min` minute slot (e.g. at :00, :15, :30, :45).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundStartConfig {
    /// Slot length in minutes.
    pub every_min: u32,
    /// Minutes at the start of each slot in which a round may begin.
    pub window_min: u32,
}

/// Off-time enforcement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyConfig {
    /// Museum opening hours.
    #[serde(default)]
    pub operating_hours: Option<OperatingHoursConfig>,
    /// Global off-time windows.
    #[serde(default)]
    pub off_time: Vec<WindowConfig>,
    /// Round start slots.
    #[serde(default)]
    pub round_start: Option<RoundStartConfig>,
}

/// One train.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainConfig {
    /// Unique name.
    pub name: String,
    /// Display label; defaults to the name.
    #[serde(default)]
    pub label: Option<String>,
    /// Scale speed in km/h for each of the decoder speed codes.
    pub speeds: Vec<f64>,
    /// Displayed-speed ramp when speeding up, km/h per second.
    pub acceleration: f64,
    /// Ramp when slowing down; defaults to `acceleration`.
    #[serde(default)]
    pub deceleration: Option<f64>,
    /// Configured maximum; defaults to the top of the speed table.
    #[serde(default)]
    pub max_speed: Option<f64>,
    /// Admin checklist items that must be ticked before power-on.
    #[serde(default)]
    pub checklist: Vec<String>,
    /// Segments occupied at startup.
    pub start: Vec<String>,
}

impl TrainConfig {
    /// Effective deceleration.
    pub fn deceleration(&self) -> f64 {
        self.deceleration.unwrap_or(self.acceleration)
    }
}

/// Required position of one switch for a leg.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchSetting {
    /// Switch name.
    pub switch: String,
    /// Required position.
    pub position: SwitchPosition,
}

/// One scheduled drive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegConfig {
    /// The train that drives.
    pub train: String,
    /// Segment the train occupies on arrival.
    pub target: String,
    /// Commanded speed, signed.
    pub speed: f64,
    /// Travel time at commanded speed.
    pub travel_s: f64,
    /// Fixed part of the pause after arrival.
    #[serde(default)]
    pub pause_s: f64,
    /// Upper bound of the random part of the pause.
    #[serde(default)]
    pub pause_jitter_s: f64,
    /// Switches that must be set before departure.
    #[serde(default)]
    pub switches: Vec<SwitchSetting>,
}

/// Where a train stands for the opening ceremony.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CeremonyConfig {
    /// The train.
    pub train: String,
    /// Ceremony marker segments.
    pub segments: Vec<String>,
}

/// One operating round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoundConfig {
    /// Round kind; unique among rounds.
    pub kind: RoundKind,
    /// Member trains.
    pub trains: Vec<String>,
    /// Off-time windows applying while this round is current.
    #[serde(default)]
    pub off_time: Vec<WindowConfig>,
    /// Legs, dispatched in order.
    #[serde(default)]
    pub legs: Vec<LegConfig>,
    /// How many times the legs are run per round.
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// Opening round only: ceremony positions.
    #[serde(default)]
    pub ceremony: Vec<CeremonyConfig>,
}

// ── ControlConfig ──────────────────────────────────────────────────

/// Complete controller configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlConfig {
    /// Update loop settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Off-time settings.
    #[serde(default)]
    pub safety: SafetyConfig,
    /// Track layout.
    pub topology: TopologyConfig,
    /// Trains, in id order.
    pub trains: Vec<TrainConfig>,
    /// Rounds.
    #[serde(default)]
    pub rounds: Vec<RoundConfig>,
}

impl ControlConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check structural invariants and cross references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_engine()?;
        let topology = Topology::from_config(&self.topology)?;
        self.validate_trains(&topology)?;
        self.validate_rounds(&topology)
    }

    /// Check that every round the flags ask for is configured.
    pub fn validate_flags(&self, flags: &ModeFlags) -> Result<(), ConfigError> {
        if flags.opening {
            self.round(RoundKind::Opening)
                .ok_or(ConfigError::MissingRound {
                    kind: RoundKind::Opening,
                })?;
        }
        if let Some(kind) = flags.round {
            self.round(kind).ok_or(ConfigError::MissingRound { kind })?;
        }
        Ok(())
    }

    /// The round of the given kind.
    pub fn round(&self, kind: RoundKind) -> Option<&RoundConfig> {
        self.rounds.iter().find(|r| r.kind == kind)
    }

    /// Index of the named train.
    pub fn train_index(&self, name: &str) -> Option<usize> {
        self.trains.iter().position(|t| t.name == name)
    }

    fn validate_engine(&self) -> Result<(), ConfigError> {
        let e = &self.engine;
        if !e.tick_rate_hz.is_finite() || e.tick_rate_hz <= 0.0 {
            return Err(ConfigError::InvalidTickRate {
                value: e.tick_rate_hz,
            });
        }
        if e.max_ingress_queue == 0 {
            return Err(ConfigError::IngressQueueZero);
        }
        if e.ring_buffer_size < 2 {
            return Err(ConfigError::RingBufferTooSmall {
                configured: e.ring_buffer_size,
            });
        }
        non_negative("engine.stop_timeout_s", e.stop_timeout_s)?;
        non_negative("engine.power_on_cooldown_s", e.power_on_cooldown_s)?;
        if !(e.debug_stop_factor > 0.0 && e.debug_stop_factor <= 1.0) {
            return Err(invalid("engine.debug_stop_factor", e.debug_stop_factor));
        }
        if !e.time_dilation.is_finite() || e.time_dilation < 1.0 {
            return Err(invalid("engine.time_dilation", e.time_dilation));
        }
        if let Some(slot) = self.safety.round_start {
            if slot.every_min == 0 || slot.window_min == 0 || slot.window_min > slot.every_min {
                return Err(invalid(
                    "safety.round_start.window_min",
                    f64::from(slot.window_min),
                ));
            }
        }
        Ok(())
    }

    fn validate_trains(&self, topology: &Topology) -> Result<(), ConfigError> {
        if self.trains.is_empty() {
            return Err(ConfigError::NoTrains);
        }
        let mut names = HashSet::new();
        for train in &self.trains {
            if !names.insert(train.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "train",
                    name: train.name.clone(),
                });
            }
            validate_speed_table(train)?;
            let context = format!("train '{}'", train.name);
            non_negative(&format!("{context} acceleration"), train.acceleration)?;
            if train.acceleration == 0.0 {
                return Err(invalid(&format!("{context} acceleration"), 0.0));
            }
            let decel = train.deceleration();
            if !decel.is_finite() || decel <= 0.0 {
                return Err(invalid(&format!("{context} deceleration"), decel));
            }
            if let Some(max) = train.max_speed {
                non_negative(&format!("{context} max_speed"), max)?;
            }
            let mut items = HashSet::new();
            for item in &train.checklist {
                if !items.insert(item.as_str()) {
                    return Err(ConfigError::Duplicate {
                        kind: "checklist item",
                        name: item.clone(),
                    });
                }
            }
            if train.start.is_empty() || train.start.len() > 2 {
                return Err(ConfigError::InvalidStart {
                    train: train.name.clone(),
                    count: train.start.len(),
                });
            }
            for segment in &train.start {
                resolve_segment(topology, &context, segment)?;
            }
        }
        Ok(())
    }

    fn validate_rounds(&self, topology: &Topology) -> Result<(), ConfigError> {
        let mut kinds = HashSet::new();
        for round in &self.rounds {
            if !kinds.insert(round.kind) {
                return Err(ConfigError::Duplicate {
                    kind: "round",
                    name: round.kind.to_string(),
                });
            }
            let context = format!("round '{}'", round.kind);
            for train in &round.trains {
                self.resolve_train(&context, train)?;
            }
            if round.kind != RoundKind::Opening && !round.ceremony.is_empty() {
                return Err(ConfigError::UnexpectedCeremony { round: round.kind });
            }
            for (i, leg) in round.legs.iter().enumerate() {
                let leg_context = format!("{context} leg {i}");
                self.resolve_train(&leg_context, &leg.train)?;
                if !round.trains.contains(&leg.train) {
                    return Err(ConfigError::LegForNonMember {
                        round: round.kind,
                        train: leg.train.clone(),
                    });
                }
                resolve_segment(topology, &leg_context, &leg.target)?;
                if !leg.speed.is_finite() {
                    return Err(invalid(&format!("{leg_context} speed"), leg.speed));
                }
                non_negative(&format!("{leg_context} travel_s"), leg.travel_s)?;
                non_negative(&format!("{leg_context} pause_s"), leg.pause_s)?;
                non_negative(&format!("{leg_context} pause_jitter_s"), leg.pause_jitter_s)?;
                for setting in &leg.switches {
                    if topology.switch_id(&setting.switch).is_none() {
                        return Err(ConfigError::UnknownReference {
                            context: leg_context.clone(),
                            kind: "switch",
                            name: setting.switch.clone(),
                        });
                    }
                }
            }
            for pos in &round.ceremony {
                let cer_context = format!("{context} ceremony");
                self.resolve_train(&cer_context, &pos.train)?;
                if pos.segments.is_empty() || pos.segments.len() > 2 {
                    return Err(ConfigError::InvalidStart {
                        train: pos.train.clone(),
                        count: pos.segments.len(),
                    });
                }
                for segment in &pos.segments {
                    resolve_segment(topology, &cer_context, segment)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_train(&self, context: &str, name: &str) -> Result<usize, ConfigError> {
        self.train_index(name)
            .ok_or_else(|| ConfigError::UnknownReference {
                context: context.to_string(),
                kind: "train",
                name: name.to_string(),
            })
    }
}

fn validate_speed_table(train: &TrainConfig) -> Result<(), ConfigError> {
    let fail = |reason: String| ConfigError::InvalidSpeedTable {
        train: train.name.clone(),
        reason,
    };
    if train.speeds.len() != SPEED_STEPS {
        return Err(fail(format!(
            "speed table needs {SPEED_STEPS} entries, got {}",
            train.speeds.len()
        )));
    }
    if train.speeds[0] != 0.0 {
        return Err(fail("speed code 0 must be standstill".into()));
    }
    for pair in train.speeds.windows(2) {
        if !pair[1].is_finite() || pair[1] < pair[0] {
            return Err(fail(format!(
                "speed table must be non-decreasing ({} after {})",
                pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

pub(crate) fn resolve_segment(
    topology: &Topology,
    context: &str,
    name: &str,
) -> Result<loco_core::SegmentId, ConfigError> {
    topology
        .segment_id(name)
        .ok_or_else(|| ConfigError::UnknownReference {
            context: context.to_string(),
            kind: "segment",
            name: name.to_string(),
        })
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, value))
    }
}

fn invalid(field: &str, value: f64) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value,
    }
}

/// `"HH:MM"` or `"HH:MM:SS"` time-of-day fields.
mod hhmm {
    use chrono::{NaiveTime, Timelike};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        let fmt = if time.second() == 0 { "%H:%M" } else { "%H:%M:%S" };
        s.serialize_str(&time.format(fmt).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(d)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .map_err(|e| de::Error::custom(format!("invalid time '{s}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [[topology.segments]]
        name = "platform"

        [[topology.segments]]
        name = "ring"

        [[trains]]
        name = "ICE"
        speeds = [0, 22, 44, 66, 88, 110, 132, 155, 177, 199, 221, 243, 265, 287, 310]
        acceleration = 25.0
        start = ["platform"]
    "#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ControlConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.trains[0].deceleration(), 25.0);
        assert!(config.rounds.is_empty());
    }

    #[test]
    fn parses_times_with_and_without_seconds() {
        let text = format!(
            "{MINIMAL}\n[safety]\noff_time = [{{ start = \"12:00\", end = \"13:00:30\" }}]\n"
        );
        let config = ControlConfig::from_toml_str(&text).unwrap();
        let w = config.safety.off_time[0];
        assert_eq!(w.start, NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert_eq!(w.end, NaiveTime::from_hms_opt(13, 0, 30).unwrap());
    }

    #[test]
    fn rejects_bad_time() {
        let text = format!(
            "{MINIMAL}\n[safety]\noff_time = [{{ start = \"25:00\", end = \"13:00\" }}]\n"
        );
        assert!(matches!(
            ControlConfig::from_toml_str(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn rejects_short_speed_table() {
        let mut config: ControlConfig = toml::from_str(MINIMAL).unwrap();
        config.trains[0].speeds.truncate(9);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSpeedTable { .. })
        ));
    }

    #[test]
    fn rejects_zero_tick_rate_and_queue() {
        let mut config: ControlConfig = toml::from_str(MINIMAL).unwrap();
        config.engine.tick_rate_hz = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTickRate { .. })
        ));
        config.engine.tick_rate_hz = 10.0;
        config.engine.max_ingress_queue = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IngressQueueZero)
        ));
        config.engine.max_ingress_queue = 1;
        config.engine.ring_buffer_size = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::RingBufferTooSmall { configured: 1 })
        ));
    }

    #[test]
    fn rejects_unknown_start_segment() {
        let mut config: ControlConfig = toml::from_str(MINIMAL).unwrap();
        config.trains[0].start = vec!["depot".into()];
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "train 'ICE' references unknown segment 'depot'"
        );
    }

    #[test]
    fn rejects_leg_for_non_member() {
        let text = format!(
            r#"{MINIMAL}
            [[rounds]]
            kind = "regular"
            trains = []

            [[rounds.legs]]
            train = "ICE"
            target = "ring"
            speed = 80.0
            travel_s = 10.0
            "#
        );
        assert!(matches!(
            ControlConfig::from_toml_str(&text),
            Err(ConfigError::LegForNonMember { .. })
        ));
    }

    #[test]
    fn flags_need_configured_rounds() {
        let config = ControlConfig::from_toml_str(MINIMAL).unwrap();
        let flags = ModeFlags {
            opening: true,
            ..ModeFlags::default()
        };
        assert!(matches!(
            config.validate_flags(&flags),
            Err(ConfigError::MissingRound {
                kind: RoundKind::Opening
            })
        ));
        assert!(config.validate_flags(&ModeFlags::default()).is_ok());
    }

    #[test]
    fn mode_flag_helpers() {
        assert!(ModeFlags::simulation().dilated());
        assert!(!ModeFlags::simulation().emits_signals());
        assert!(ModeFlags::default().emits_signals());
        let show = ModeFlags {
            show: true,
            ..ModeFlags::default()
        };
        assert!(!show.emits_signals());
    }
}
