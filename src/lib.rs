// ABOUTME: Time-aware audio buffering and clock recovery for synchronized playback
// ABOUTME: Crate root: module wiring and public re-exports

//! Single-stream producer/consumer timing engine for delivering audio
//! into a callback-driven output with bounded latency.
//!
//! Three pieces cooperate, all driven by the embedding orchestrator:
//!
//! - [`buffer`]: timestamped storage ([`TimedBuffer`], [`SampleQueue`])
//!   that serves exact-size retrieval windows — gaps become silence,
//!   expired data is discarded, future data stays put — plus
//!   [`SharedQueue`], the one-lock producer/consumer harness.
//! - [`sync::clock`]: [`RecoveredClock`], a monotonic software clock
//!   rebuilt from periodic `(device_time, system_time)` observations.
//! - [`sync::drift`]: [`DriftController`], a PI filter turning the
//!   in-band deltas a retrieval reports into resampler rate
//!   corrections.
//!
//! A typical cycle: the producer pushes timestamped data; each output
//! quantum, the callback asks the clock for the current time,
//! retrieves exactly one quantum of frames for that time, and feeds
//! any reported delta through the drift controller into its
//! resampler. All timestamps are signed 64-bit microseconds.

/// Timestamped sample storage and retrieval
pub mod buffer;
/// Crate error type
pub mod error;
/// Stream format descriptors and conversions
pub mod format;
/// Clock recovery and drift compensation
pub mod sync;

pub use buffer::{
    Fetch, FetchStatus, QueueConfig, QueueFetch, SampleQueue, SharedQueue, TimedBuffer,
};
pub use error::Error;
pub use format::{DsdFormat, PacketFormat, PcmFormat, SampleType, StreamFormat};
pub use sync::{DriftController, RecoveredClock};
