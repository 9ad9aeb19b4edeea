// ABOUTME: Fixed-capacity time-aware frame store with synchronized retrieval
// ABOUTME: Gap-filling, expiry flushing, and median-filtered skew handling

use log::{debug, trace, warn};

use crate::buffer::align::{plan_overlap, DeltaHistory, Overlap, PtsTracker};
use crate::buffer::ring::{RingCursor, Span};
use crate::error::Error;
use crate::format::StreamFormat;

/// Outcome class of a synchronized retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The destination holds exactly the requested frames (real data
    /// plus whatever silence the alignment required).
    Filled,
    /// Nothing buffered; destination filled with silence.
    Empty,
    /// Every requested frame lies before the buffered data;
    /// destination filled with silence, buffer untouched.
    InFuture,
    /// Every buffered frame lies before the requested window; the
    /// buffer was flushed to empty and the destination silenced.
    Expired,
    /// Alignment left zero real frames for this window; destination
    /// silenced, remaining (future) data kept buffered.
    Clipped,
}

/// Per-retrieval report. `drift_us` is only ever set on [`FetchStatus::Filled`]
/// calls that applied no hard correction, so a caller can feed it to a
/// rate controller without double-counting corrected skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetch {
    pub status: FetchStatus,
    /// Filtered buffered-vs-requested delta, when within the skew
    /// threshold.
    pub drift_us: Option<i64>,
    /// Silence frames prepended by a skew correction.
    pub silence_frames: u64,
    /// Real frames copied to the destination.
    pub read_frames: u64,
    /// Frames discarded as expired before reading.
    pub flushed_frames: u64,
}

impl Fetch {
    fn status(status: FetchStatus) -> Self {
        Self {
            status,
            drift_us: None,
            silence_frames: 0,
            read_frames: 0,
            flushed_frames: 0,
        }
    }
}

/// Fixed-capacity circular frame store that knows the presentation
/// time of its oldest frame.
///
/// Retrieval asks for "the frames covering `[pts, pts + want)`" and is
/// always satisfied exactly: gaps become silence, expired data is
/// discarded, and data still in the future stays put. Capacity is set
/// from a duration at construction; a stride change requires building
/// a new buffer, not mutating this one.
///
/// Not internally synchronized. The producing and retrieving sides
/// must share one external lock; retrieval itself is bounded-time
/// (two slice copies at most) and never blocks or allocates.
#[derive(Debug)]
pub struct TimedBuffer {
    format: StreamFormat,
    data: Vec<u8>,
    cursor: RingCursor,
    oldest: PtsTracker,
    history: DeltaHistory,
}

impl TimedBuffer {
    /// Create a buffer holding `capacity_us` worth of frames of
    /// `format`. Packetized formats cannot live in a frame ring and
    /// are rejected; use a queue for those.
    pub fn new(format: StreamFormat, capacity_us: i64) -> Result<Self, Error> {
        format.validate()?;
        if !format.is_time_divisible() {
            return Err(Error::Format(
                "frame ring requires a time-divisible format".into(),
            ));
        }
        let capacity_frames = format.us_to_frames(capacity_us).max(1) as usize;
        let stride = format.stride() as usize;
        Ok(Self {
            format,
            data: vec![format.silence_byte(); capacity_frames * stride],
            cursor: RingCursor::new(capacity_frames),
            oldest: PtsTracker::default(),
            history: DeltaHistory::default(),
        })
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn capacity_frames(&self) -> u64 {
        self.cursor.capacity() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }

    /// Frames currently buffered.
    pub fn fill_frames(&self) -> u64 {
        self.cursor.buffered() as u64
    }

    /// Buffered duration, derived from the frame count — the two can
    /// never disagree.
    pub fn fill_level_us(&self) -> i64 {
        self.format.frames_to_us(self.fill_frames())
    }

    /// Presentation time of the oldest buffered frame; `None` while
    /// empty or until a push carries a timestamp.
    pub fn oldest_pts(&self) -> Option<i64> {
        self.oldest.get()
    }

    /// Append frames, optionally preceded by `silence_hint_frames` of
    /// silence covering an upstream discontinuity. The hint is dropped
    /// when the buffer is empty — there is nothing to keep continuous.
    ///
    /// Returns the number of *real* frames written. A short count
    /// means the ring is full; that is backpressure, not an error, and
    /// the caller decides whether to retry or drop.
    pub fn push(&mut self, frames: &[u8], silence_hint_frames: u64, pts: Option<i64>) -> usize {
        let stride = self.format.stride() as usize;
        debug_assert!(
            frames.len() % stride == 0,
            "pushed data must be whole frames"
        );
        let count = frames.len() / stride;

        let hint = if self.cursor.is_empty() {
            0
        } else {
            silence_hint_frames as usize
        };
        if hint > 0 {
            let (n, spans) = self.cursor.write(hint);
            self.fill_spans_silence(spans);
            trace!("prepended {n} silence frames for upstream gap");
        }

        let (written, spans) = self.cursor.write(count);
        self.copy_in(spans, frames);
        if written < count {
            debug!("ring full: wrote {written} of {count} frames");
        }

        if let (Some(pts), false, true) = (pts, self.oldest.is_set(), written > 0) {
            let end = pts + self.format.frames_to_us(written as u64);
            // The oldest frame sits one fill-level before the end of
            // what was just written. Clamp at zero: a first buffer
            // whose pts is smaller than its own duration would
            // otherwise place the origin before the timeline start.
            self.oldest
                .seed((end - self.fill_level_us()).max(0));
        }
        written
    }

    /// Fill `dst` with the frames covering `[retrieval_pts,
    /// retrieval_pts + duration(dst))`, treating the buffered data as
    /// starting at `oldest_pts + pts_shift`.
    ///
    /// `dst` must be a non-empty whole number of frames; anything else
    /// is a caller bug. Deltas within `skew_max_us` are reported via
    /// [`Fetch::drift_us`]; larger deltas are corrected in place by
    /// prepending silence or flushing expired frames.
    pub fn retrieve(
        &mut self,
        dst: &mut [u8],
        retrieval_pts: i64,
        pts_shift: i64,
        skew_max_us: i64,
    ) -> Fetch {
        let stride = self.format.stride() as usize;
        assert!(!dst.is_empty(), "zero-length retrieval");
        assert!(
            dst.len() % stride == 0,
            "retrieval destination must be whole frames"
        );
        let want = dst.len() / stride;
        let silence = self.format.silence_byte();

        if self.cursor.is_empty() {
            dst.fill(silence);
            return Fetch::status(FetchStatus::Empty);
        }

        // Data that never carried a timestamp has no window to check;
        // serve it as if perfectly aligned.
        let buffered_start = match self.oldest.get() {
            Some(oldest) => oldest + pts_shift,
            None => retrieval_pts,
        };
        let want_us = self.format.frames_to_us(want as u64);
        let fill_us = self.fill_level_us();
        let overlap = plan_overlap(
            &mut self.history,
            retrieval_pts,
            want_us,
            buffered_start,
            fill_us,
            skew_max_us,
        );

        let plan = match overlap {
            Overlap::Future => {
                dst.fill(silence);
                return Fetch::status(FetchStatus::InFuture);
            }
            Overlap::Expired => {
                dst.fill(silence);
                let flushed = self.cursor.flush(self.cursor.buffered());
                debug!("all {flushed} buffered frames expired; flushing");
                self.reset_tracking();
                return Fetch {
                    flushed_frames: flushed as u64,
                    ..Fetch::status(FetchStatus::Expired)
                };
            }
            Overlap::Partial(plan) => plan,
        };

        let silence_frames = self.format.us_to_frames(plan.silence_us).min(want as u64) as usize;
        let mut flushed = 0usize;
        if plan.flush_us > 0 {
            let requested = self.format.us_to_frames(plan.flush_us) as usize;
            flushed = self.cursor.flush(requested);
            // Advance by what actually left the ring; advancing by the
            // request would drift the timeline when fewer remained.
            self.oldest
                .advance_frames(flushed as u64, self.format.sample_rate());
            warn!("skew: flushed {flushed} expired frames");
        } else if silence_frames > 0 {
            warn!("skew: prepending {silence_frames} silence frames");
        }

        let to_read = (want - silence_frames).min(self.cursor.buffered());
        if to_read == 0 {
            dst.fill(silence);
            self.sync_tracking_validity();
            return Fetch {
                silence_frames: silence_frames as u64,
                flushed_frames: flushed as u64,
                ..Fetch::status(FetchStatus::Clipped)
            };
        }

        let silence_bytes = silence_frames * stride;
        dst[..silence_bytes].fill(silence);
        let (read, spans) = self.cursor.read(to_read);
        debug_assert_eq!(read, to_read);
        self.copy_out(spans, &mut dst[silence_bytes..]);
        dst[silence_bytes + read * stride..].fill(silence);
        self.oldest
            .advance_frames(read as u64, self.format.sample_rate());
        self.sync_tracking_validity();

        Fetch {
            status: FetchStatus::Filled,
            drift_us: plan.drift_us,
            silence_frames: silence_frames as u64,
            read_frames: read as u64,
            flushed_frames: flushed as u64,
        }
    }

    /// Drop everything: frames, timestamp tracking, and skew history.
    pub fn flush(&mut self) {
        self.cursor.reset();
        self.reset_tracking();
    }

    fn reset_tracking(&mut self) {
        self.oldest.clear();
        self.history.clear();
    }

    /// The oldest timestamp is only meaningful while frames remain.
    fn sync_tracking_validity(&mut self) {
        if self.cursor.is_empty() {
            self.oldest.clear();
        }
    }

    fn fill_spans_silence(&mut self, spans: [Span; 2]) {
        let stride = self.format.stride() as usize;
        let silence = self.format.silence_byte();
        for span in spans.iter().filter(|s| s.len > 0) {
            let start = span.offset * stride;
            self.data[start..start + span.len * stride].fill(silence);
        }
    }

    fn copy_in(&mut self, spans: [Span; 2], src: &[u8]) {
        let stride = self.format.stride() as usize;
        let mut taken = 0;
        for span in spans.iter().filter(|s| s.len > 0) {
            let bytes = span.len * stride;
            let start = span.offset * stride;
            self.data[start..start + bytes].copy_from_slice(&src[taken..taken + bytes]);
            taken += bytes;
        }
    }

    fn copy_out(&self, spans: [Span; 2], dst: &mut [u8]) {
        let stride = self.format.stride() as usize;
        let mut placed = 0;
        for span in spans.iter().filter(|s| s.len > 0) {
            let bytes = span.len * stride;
            let start = span.offset * stride;
            dst[placed..placed + bytes].copy_from_slice(&self.data[start..start + bytes]);
            placed += bytes;
        }
    }
}
