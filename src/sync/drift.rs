// ABOUTME: PI filter turning timestamp deltas into resampler rate corrections
// ABOUTME: Explicit time-scale input so non-uniform update intervals integrate correctly

/// Proportional-integral filter for closed-loop drift compensation.
///
/// Feed it the in-band timestamp delta observed at each retrieval and
/// apply the output as a correction to an external resampler's rate.
/// The controller holds no references and does no I/O; call it under
/// whatever lock the retrieval already holds.
#[derive(Debug, Clone, Copy)]
pub struct DriftController {
    ki: f64,
    kp: f64,
    integral: f64,
}

impl DriftController {
    /// Create a controller with the given integral and proportional
    /// gains.
    pub fn new(ki: f64, kp: f64) -> Self {
        Self {
            ki,
            kp,
            integral: 0.0,
        }
    }

    /// Zero the accumulated integral. Gains are kept; use this after a
    /// hard resynchronization so stale accumulated error does not keep
    /// steering the rate.
    pub fn reset(&mut self) {
        self.integral = 0.0;
    }

    /// Advance the filter with one error observation.
    ///
    /// `time_scale` is the elapsed real time since the previous call,
    /// in seconds, computed by the caller from its own clock. Passing
    /// `0.0` leaves the integral untouched and returns the pure
    /// proportional response — the safe form for the very first call,
    /// when no previous timestamp exists.
    pub fn update(&mut self, input: f64, time_scale: f64) -> f64 {
        self.integral += input * time_scale;
        self.integral * self.ki + input * self.kp
    }

    /// Current integral term, mostly useful for diagnostics.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}
