//! Safety and power policy: off-time windows, the emergency latch, the
//! master pause, and the debug relaxations of stop timeout and cooldown.

use chrono::{NaiveTime, Timelike};

use crate::config::{
    EngineConfig, ModeFlags, OperatingHoursConfig, RoundStartConfig, SafetyConfig, WindowConfig,
};

/// A daily time window. Wraps past midnight when `end <= start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffTimeWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl OffTimeWindow {
    /// Window from `start` (inclusive) to `end` (exclusive).
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `t` lies inside the window. A window with `start == end`
    /// covers the whole day.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveTime;
    /// use loco_engine::OffTimeWindow;
    ///
    /// let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    /// let night = OffTimeWindow::new(hm(22, 0), hm(6, 0));
    /// assert!(night.contains(hm(23, 30)));
    /// assert!(night.contains(hm(5, 59)));
    /// assert!(!night.contains(hm(6, 0)));
    /// ```
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

impl From<WindowConfig> for OffTimeWindow {
    fn from(w: WindowConfig) -> Self {
        Self::new(w.start, w.end)
    }
}

impl From<OperatingHoursConfig> for OffTimeWindow {
    /// The closed period: from closing time to the next opening.
    fn from(h: OperatingHoursConfig) -> Self {
        Self::new(h.close, h.open)
    }
}

/// Minute slots in which a round may begin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundStartSlot {
    every_min: u32,
    window_min: u32,
}

impl RoundStartSlot {
    /// Rounds may begin in the first `window_min` minutes of every
    /// `every_min` minute slot, counted from midnight.
    pub fn new(every_min: u32, window_min: u32) -> Self {
        Self {
            every_min: every_min.max(1),
            window_min,
        }
    }

    /// Whether a round may begin at `t`.
    pub fn permits(&self, t: NaiveTime) -> bool {
        let minute = t.hour() * 60 + t.minute();
        minute % self.every_min < self.window_min
    }
}

impl From<RoundStartConfig> for RoundStartSlot {
    fn from(c: RoundStartConfig) -> Self {
        Self::new(c.every_min, c.window_min)
    }
}

/// Latches, windows, and timing policy shared by every operation.
#[derive(Clone, Debug)]
pub struct SafetyManager {
    windows: Vec<OffTimeWindow>,
    slot: Option<RoundStartSlot>,
    debug: bool,
    dilation: f64,
    stop_timeout_s: f64,
    cooldown_s: f64,
    halted: bool,
    paused: bool,
}

impl SafetyManager {
    /// Build the policy from configuration and process flags.
    pub fn new(safety: &SafetyConfig, engine: &EngineConfig, flags: &ModeFlags) -> Self {
        let mut windows: Vec<OffTimeWindow> =
            safety.off_time.iter().copied().map(Into::into).collect();
        if let Some(hours) = safety.operating_hours {
            windows.push(hours.into());
        }
        let factor = if flags.debug {
            engine.debug_stop_factor
        } else {
            1.0
        };
        Self {
            windows,
            slot: safety.round_start.map(Into::into),
            debug: flags.debug,
            dilation: if flags.dilated() {
                engine.time_dilation
            } else {
                1.0
            },
            stop_timeout_s: engine.stop_timeout_s * factor,
            cooldown_s: engine.power_on_cooldown_s * factor,
            halted: false,
            paused: false,
        }
    }

    // ── Off-time ────────────────────────────────────────────────────

    /// Whether `t` lies in a global window or in one of `round_windows`,
    /// regardless of debug mode.
    pub fn in_off_time(&self, t: NaiveTime, round_windows: &[OffTimeWindow]) -> bool {
        self.windows
            .iter()
            .chain(round_windows)
            .any(|w| w.contains(t))
    }

    /// Whether off-time is enforced at `t`. Never in debug mode.
    pub fn off_time_active(&self, t: NaiveTime, round_windows: &[OffTimeWindow]) -> bool {
        !self.debug && self.in_off_time(t, round_windows)
    }

    /// Whether a round may begin at `t`. Always in debug mode.
    pub fn round_start_permitted(&self, t: NaiveTime) -> bool {
        self.debug || self.slot.is_none_or(|slot| slot.permits(t))
    }

    // ── Timers ──────────────────────────────────────────────────────

    /// Longest ramp-down before power is cut, after debug scaling.
    pub fn stop_timeout_s(&self) -> f64 {
        self.stop_timeout_s
    }

    /// Power-on cooldown after a cut, after debug scaling.
    pub fn cooldown_s(&self) -> f64 {
        self.cooldown_s
    }

    /// Seconds of cooldown left given the time since the last cut.
    pub fn cooldown_remaining(&self, since_cut: Option<f64>) -> Option<f64> {
        let since = since_cut?;
        let remaining = self.cooldown_s - since;
        (remaining > 1e-9).then_some(remaining)
    }

    /// Simulated seconds that pass during `dt` wall seconds.
    pub fn sim_dt(&self, dt: f64) -> f64 {
        dt * self.dilation
    }

    /// Whether debug relaxations are in effect.
    pub fn debug(&self) -> bool {
        self.debug
    }

    // ── Latches ─────────────────────────────────────────────────────

    /// Whether the emergency latch is set.
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Set or release the emergency latch.
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Whether the master pause is active.
    pub fn paused(&self) -> bool {
        self.paused
    }

    /// Set or release the master pause.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }
}
