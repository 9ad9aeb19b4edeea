// ABOUTME: Time-aware audio storage
// ABOUTME: Ring cursor math, timed frame store, sample queue, and the shared-lock harness

pub(crate) mod align;
/// Format-dispatched queue over contiguous and packetized storage
pub mod queue;
/// Circular index arithmetic
pub mod ring;
/// Producer/consumer harness around one shared lock
pub mod shared;
/// Fixed-capacity synchronized frame store
pub mod timed;

pub use queue::{QueueConfig, QueueFetch, SampleQueue, DEFAULT_SKEW_MAX_US};
pub use ring::{RingCursor, Span};
pub use shared::SharedQueue;
pub use timed::{Fetch, FetchStatus, TimedBuffer};
