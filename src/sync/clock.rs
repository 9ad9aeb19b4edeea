// ABOUTME: Monotonic software clock recovered from periodic driver observations
// ABOUTME: Piecewise-linear rational rate with freeze/resume continuity

use log::{trace, warn};

/// Software clock that reconstructs a device's timeline from periodic
/// `(device_time, system_time)` observation pairs, both in
/// microseconds.
///
/// Between observations the clock extrapolates along the latest
/// rational rate segment; each new observation re-anchors the segment
/// and refines the rate from the previous raw pair. The output of
/// [`now`](Self::now) is non-decreasing across any interleaving of
/// calls: an observation revealing that extrapolation ran fast pins
/// the output at its high-water mark until real time catches up,
/// rather than ever stepping backwards.
///
/// The clock starts frozen. While frozen it reports the last emitted
/// timestamp unconditionally; the first observation after
/// [`freeze`](Self::freeze) (or after construction) resumes the
/// timeline exactly where it stopped, with no discontinuity.
///
/// All times are explicit arguments — the clock never reads a system
/// clock itself, so it can sit under the caller's lock and be driven
/// deterministically in tests.
#[derive(Debug, Clone)]
pub struct RecoveredClock {
    /// Latest piecewise rate as device-microseconds per
    /// system-microsecond, kept rational to avoid compounding float
    /// rounding across many updates.
    rate_num: u64,
    rate_den: u64,
    /// Anchor of the current linear segment.
    device_offset: i64,
    system_offset: i64,
    /// Correction folded into `device_offset` when resuming from a
    /// freeze so the first extrapolation continues from
    /// `last_timestamp`.
    resume_correction: i64,
    /// Whether extrapolation is allowed (at least one observation
    /// since the last freeze).
    tracking: bool,
    /// Monotonic high-water mark of emitted timestamps.
    last_timestamp: i64,
    /// Previous raw observation, used only for the rate; cleared on
    /// freeze so a stale pre-freeze pair never poisons the next rate.
    prev_device: Option<i64>,
    prev_system: Option<i64>,
}

impl RecoveredClock {
    pub fn new() -> Self {
        Self {
            rate_num: 1,
            rate_den: 1,
            device_offset: 0,
            system_offset: 0,
            resume_correction: 0,
            tracking: false,
            last_timestamp: 0,
            prev_device: None,
            prev_system: None,
        }
    }

    /// Whether the clock currently extrapolates rather than holding
    /// its last timestamp.
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Current rate segment as `(numerator, denominator)`.
    pub fn rate(&self) -> (u64, u64) {
        (self.rate_num, self.rate_den)
    }

    /// Feed one `(device_time, system_time)` pair.
    ///
    /// `device_time` of `None` (the driver had no timestamp) and
    /// observations repeating the previous `system_time` (degenerate
    /// rate division) are ignored. A system time behind the previous
    /// observation is dropped with a warning — the rate would be
    /// negative.
    pub fn observe(&mut self, device_time: Option<i64>, system_time: i64) {
        let Some(device_time) = device_time else {
            trace!("observation without device time ignored");
            return;
        };
        if self.prev_system == Some(system_time) {
            trace!("observation repeats system time {system_time}; ignored");
            return;
        }

        if !self.tracking {
            // Resume exactly from the held timestamp: all drift that
            // accumulated before or during the freeze is folded into
            // the anchor, not exposed as a jump.
            self.resume_correction = self.last_timestamp - device_time;
            self.tracking = true;
        }

        if let (Some(prev_device), Some(prev_system)) = (self.prev_device, self.prev_system) {
            let num = device_time - prev_device;
            let den = system_time - prev_system;
            if den <= 0 {
                warn!(
                    "system time went backwards ({prev_system} -> {system_time}); observation dropped"
                );
                return;
            }
            if num > 0 {
                self.rate_num = num as u64;
                self.rate_den = den as u64;
            } else {
                // Device time stalled or regressed; keep the previous
                // rate and let the anchor update absorb it.
                trace!(
                    "device time did not advance; rate kept at {}/{}",
                    self.rate_num,
                    self.rate_den
                );
            }
        }

        self.device_offset = device_time + self.resume_correction;
        self.system_offset = system_time;
        self.prev_device = Some(device_time);
        self.prev_system = Some(system_time);
    }

    /// Stop extrapolating. [`now`](Self::now) returns the held
    /// timestamp until the next observation resumes the timeline. The
    /// rate survives a freeze; the raw previous observation does not.
    pub fn freeze(&mut self) {
        self.tracking = false;
        self.prev_device = None;
        self.prev_system = None;
    }

    /// Current device-domain time for the given system time.
    /// Non-decreasing across all calls.
    pub fn now(&mut self, system_time: i64) -> i64 {
        if !self.tracking {
            return self.last_timestamp;
        }
        let elapsed = system_time - self.system_offset;
        let extrapolated = scale_round(elapsed, self.rate_num, self.rate_den) + self.device_offset;
        if extrapolated < self.last_timestamp {
            // A correcting observation showed we had been running
            // fast. Hold the high-water mark; time never goes back.
            trace!(
                "extrapolation {extrapolated} behind high-water mark {}; holding",
                self.last_timestamp
            );
            return self.last_timestamp;
        }
        self.last_timestamp = extrapolated;
        extrapolated
    }
}

impl Default for RecoveredClock {
    fn default() -> Self {
        Self::new()
    }
}

/// `value * num / den`, rounded to nearest, without intermediate
/// overflow.
fn scale_round(value: i64, num: u64, den: u64) -> i64 {
    let product = value as i128 * num as i128;
    let den = den as i128;
    let half = den / 2;
    let rounded = if product >= 0 {
        (product + half) / den
    } else {
        (product - half) / den
    };
    rounded as i64
}
