// ABOUTME: Clock recovery and drift compensation
// ABOUTME: Piecewise-linear recovered clock and the PI rate-correction filter

/// Monotonic clock recovered from driver observations
pub mod clock;
/// PI filter for closed-loop rate correction
pub mod drift;

pub use clock::RecoveredClock;
pub use drift::DriftController;
