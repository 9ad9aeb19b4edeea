// ABOUTME: Crate error type
// ABOUTME: Configuration failures and flush cancellation; everything else is a result code

use thiserror::Error;

/// Errors surfaced by the buffering and clock-recovery engine.
///
/// Capacity pressure and empty/expired retrievals are *not* errors —
/// they are reported through short counts and
/// [`FetchStatus`](crate::buffer::FetchStatus) so the caller keeps the
/// policy.
/// Precondition violations (unconfigured format, zero-length retrieval)
/// panic instead of returning a variant; they indicate a caller bug.
#[derive(Debug, Error)]
pub enum Error {
    /// The stream format is unusable (zero rate, zero stride, ...).
    #[error("invalid stream format: {0}")]
    Format(String),

    /// A blocking producer call was cancelled by a flush.
    #[error("queue is flushing")]
    Flushing,
}
