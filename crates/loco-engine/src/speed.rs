//! Bounded-rate interpolation of displayed speed.
//!
//! The commanded (target) speed changes instantly; the displayed speed
//! follows it at most `acceleration` km/h per second while its magnitude
//! grows and at most `deceleration` km/h per second otherwise. Crossing
//! zero always decelerates to zero first.

use serde::{Deserialize, Serialize};

/// Rate limits for one train.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedController {
    /// km/h per second while speeding up.
    pub acceleration: f64,
    /// km/h per second while slowing down.
    pub deceleration: f64,
}

impl SpeedController {
    /// New controller. Rates are taken as magnitudes.
    pub fn new(acceleration: f64, deceleration: f64) -> Self {
        Self {
            acceleration: acceleration.abs(),
            deceleration: deceleration.abs(),
        }
    }

    /// Move `current` toward `target` over `dt` seconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use loco_engine::SpeedController;
    ///
    /// let ctl = SpeedController::new(20.0, 40.0);
    /// assert_eq!(ctl.step(0.0, 100.0, 1.0), 20.0);
    /// assert_eq!(ctl.step(100.0, 0.0, 1.0), 60.0);
    /// // 0.25 s braking from 10 km/h, then 0.75 s accelerating backwards.
    /// assert_eq!(ctl.step(10.0, -50.0, 1.0), -15.0);
    /// ```
    pub fn step(&self, current: f64, target: f64, dt: f64) -> f64 {
        self.project(current, target, dt)
    }

    /// Displayed speed after `elapsed` seconds of continuous ramping.
    pub fn project(&self, current: f64, target: f64, elapsed: f64) -> f64 {
        let mut speed = current;
        let mut left = elapsed.max(0.0);
        // Two phases at most: brake to zero, then accelerate.
        for _ in 0..2 {
            if left <= 0.0 || speed == target {
                break;
            }
            let via_zero = speed != 0.0 && target != 0.0 && speed.signum() != target.signum();
            let goal = if via_zero { 0.0 } else { target };
            let rate = if via_zero || goal.abs() <= speed.abs() {
                self.deceleration
            } else {
                self.acceleration
            };
            if rate <= 0.0 {
                break;
            }
            let needed = (goal - speed).abs() / rate;
            if needed > left {
                return toward(speed, goal, rate * left);
            }
            speed = goal;
            left -= needed;
        }
        speed
    }

    /// Seconds until the displayed speed reaches `target`.
    pub fn time_to_reach(&self, current: f64, target: f64) -> f64 {
        let via_zero = current != 0.0 && target != 0.0 && current.signum() != target.signum();
        if via_zero {
            current.abs() / self.deceleration + target.abs() / self.acceleration
        } else if target.abs() > current.abs() {
            (target - current).abs() / self.acceleration
        } else {
            (target - current).abs() / self.deceleration
        }
    }
}

fn toward(current: f64, target: f64, max_delta: f64) -> f64 {
    let delta = target - current;
    if delta.abs() <= max_delta {
        target
    } else {
        current + max_delta.copysign(delta)
    }
}
