// ABOUTME: Format-dispatched sample queue: contiguous accumulator or packet FIFO
// ABOUTME: One retrieval API over both modes, with asymmetric min/ideal targets

use std::collections::VecDeque;

use log::{debug, warn};
use typed_builder::TypedBuilder;

use crate::buffer::align::{plan_overlap, DeltaHistory, Overlap, PtsTracker};
use crate::buffer::timed::FetchStatus;
use crate::error::Error;
use crate::format::StreamFormat;

/// Default skew tolerance: deltas under 20ms are reported for soft
/// rate correction, larger ones are corrected in the data.
pub const DEFAULT_SKEW_MAX_US: i64 = 20_000;

/// Construction parameters for [`SampleQueue`].
///
/// `QueueConfig::builder().format(...).build()` yields the queue
/// directly. An invalid format here is a programming error and
/// panics; use [`SampleQueue::new`] for the fallible path.
#[derive(TypedBuilder)]
#[builder(build_method(into = SampleQueue))]
pub struct QueueConfig {
    format: StreamFormat,
    #[builder(default = DEFAULT_SKEW_MAX_US)]
    skew_max_us: i64,
}

impl From<QueueConfig> for SampleQueue {
    fn from(cfg: QueueConfig) -> Self {
        let mut queue = SampleQueue::new(cfg.format).expect("stream format must be valid");
        queue.skew_max_us = cfg.skew_max_us;
        queue
    }
}

/// One indivisible compressed unit.
#[derive(Debug, Clone)]
struct Packet {
    bytes: Vec<u8>,
    duration_us: i64,
}

#[derive(Debug)]
enum Store {
    /// Growable byte accumulator for sample-addressable formats.
    Contiguous { bytes: Vec<u8> },
    /// FIFO of opaque duration-tagged packets.
    Packets { fifo: VecDeque<Packet>, fill_us: i64 },
}

impl Store {
    fn for_format(format: &StreamFormat) -> Self {
        if format.is_time_divisible() {
            Store::Contiguous { bytes: Vec::new() }
        } else {
            Store::Packets {
                fifo: VecDeque::new(),
                fill_us: 0,
            }
        }
    }
}

/// Result of a queue retrieval, carrying the produced payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFetch {
    pub status: FetchStatus,
    /// The produced bytes: one whole packet, or `min..=ideal` frames
    /// of sample data (silence-padded). Empty only when nothing could
    /// be produced in packetized mode.
    pub data: Vec<u8>,
    /// Filtered in-band delta for a drift controller (contiguous mode
    /// only, mutually exclusive with any correction).
    pub drift_us: Option<i64>,
    /// Silence frames prepended by a skew correction.
    pub silence_frames: u64,
    /// Real frames included in `data` (zero for packets).
    pub read_frames: u64,
    /// Duration of `data`.
    pub duration_us: i64,
}

impl QueueFetch {
    fn silent(status: FetchStatus, data: Vec<u8>, duration_us: i64) -> Self {
        Self {
            status,
            data,
            drift_us: None,
            silence_frames: 0,
            read_frames: 0,
            duration_us,
        }
    }
}

/// Timestamped sample queue that hides whether the stream is
/// sample-addressable or packetized.
///
/// The storage mode is latched from the format at construction (or
/// [`set_format`](Self::set_format), which flushes) and never changes
/// underneath buffered data. Like [`super::TimedBuffer`], the queue is
/// not internally synchronized: producer and consumer share one
/// external lock (see [`super::SharedQueue`]).
#[derive(Debug)]
pub struct SampleQueue {
    format: StreamFormat,
    skew_max_us: i64,
    store: Store,
    oldest: PtsTracker,
    history: DeltaHistory,
}

impl SampleQueue {
    pub fn new(format: StreamFormat) -> Result<Self, Error> {
        format.validate()?;
        Ok(Self {
            store: Store::for_format(&format),
            format,
            skew_max_us: DEFAULT_SKEW_MAX_US,
            oldest: PtsTracker::default(),
            history: DeltaHistory::default(),
        })
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    pub fn is_packetized(&self) -> bool {
        matches!(self.store, Store::Packets { .. })
    }

    /// Replace the stream format. Implicitly flushes: buffered data of
    /// the old stride/mode cannot be reinterpreted.
    pub fn set_format(&mut self, format: StreamFormat) -> Result<(), Error> {
        format.validate()?;
        self.flush();
        debug!(
            "queue format change, packetized: {}",
            !format.is_time_divisible()
        );
        self.store = Store::for_format(&format);
        self.format = format;
        Ok(())
    }

    /// Buffered duration: frame count over rate in contiguous mode,
    /// the sum of packet durations otherwise.
    pub fn fill_level_us(&self) -> i64 {
        match &self.store {
            Store::Contiguous { bytes } => {
                let frames = (bytes.len() / self.format.stride() as usize) as u64;
                self.format.frames_to_us(frames)
            }
            Store::Packets { fill_us, .. } => *fill_us,
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.store {
            Store::Contiguous { bytes } => bytes.is_empty(),
            Store::Packets { fifo, .. } => fifo.is_empty(),
        }
    }

    /// Presentation time of the oldest buffered unit, when known.
    pub fn oldest_pts(&self) -> Option<i64> {
        self.oldest.get()
    }

    /// Append sample data (contiguous mode only). Adopts `pts` as the
    /// oldest timestamp if none is tracked.
    pub fn push(&mut self, data: &[u8], pts: Option<i64>) {
        let stride = self.format.stride() as usize;
        debug_assert!(data.len() % stride == 0, "pushed data must be whole frames");
        let Store::Contiguous { bytes } = &mut self.store else {
            panic!("sample push on a packetized queue");
        };
        bytes.extend_from_slice(&data[..data.len() - data.len() % stride]);
        if let (Some(pts), false) = (pts, self.oldest.is_set()) {
            self.oldest.seed(pts);
        }
    }

    /// Append one indivisible packet (packetized mode only). The
    /// packet carries its own playback duration.
    pub fn push_packet(&mut self, bytes: Vec<u8>, duration_us: i64, pts: Option<i64>) {
        assert!(duration_us >= 0, "packet duration must be non-negative");
        let Store::Packets { fifo, fill_us } = &mut self.store else {
            panic!("packet push on a contiguous queue");
        };
        *fill_us += duration_us;
        fifo.push_back(Packet { bytes, duration_us });
        if let (Some(pts), false) = (pts, self.oldest.is_set()) {
            self.oldest.seed(pts);
        }
    }

    /// Produce data for `[retrieval_pts, retrieval_pts +
    /// duration(ideal_frames))`.
    ///
    /// Packetized mode ignores the timing arguments entirely and pops
    /// one whole packet — packets cannot be split, silenced, or
    /// partially expired. Contiguous mode aligns like
    /// [`super::TimedBuffer::retrieve`], pulling up to `ideal_frames`
    /// and padding with trailing silence up to `min_frames` when
    /// clipping leaves less than that.
    pub fn retrieve(
        &mut self,
        min_frames: usize,
        ideal_frames: usize,
        retrieval_pts: i64,
        pts_shift: i64,
    ) -> QueueFetch {
        assert!(min_frames > 0, "zero-length retrieval");
        assert!(
            ideal_frames >= min_frames,
            "ideal target below the minimum"
        );
        if let Store::Packets { fifo, fill_us } = &mut self.store {
            let Some(packet) = fifo.pop_front() else {
                return QueueFetch::silent(FetchStatus::Empty, Vec::new(), 0);
            };
            *fill_us -= packet.duration_us;
            self.oldest.advance_us(packet.duration_us);
            if fifo.is_empty() {
                self.oldest.clear();
            }
            return QueueFetch::silent(FetchStatus::Filled, packet.bytes, packet.duration_us);
        }
        self.retrieve_contiguous(min_frames, ideal_frames, retrieval_pts, pts_shift)
    }

    fn retrieve_contiguous(
        &mut self,
        min_frames: usize,
        ideal_frames: usize,
        retrieval_pts: i64,
        pts_shift: i64,
    ) -> QueueFetch {
        let stride = self.format.stride() as usize;
        let silence = self.format.silence_byte();
        let fill_us = self.fill_level_us();
        let silent_frames =
            |status: FetchStatus, n: usize, format: &StreamFormat| -> QueueFetch {
                QueueFetch::silent(
                    status,
                    vec![silence; n * stride],
                    format.frames_to_us(n as u64),
                )
            };

        if self.is_empty() {
            return silent_frames(FetchStatus::Empty, min_frames, &self.format);
        }

        let buffered_start = match self.oldest.get() {
            Some(oldest) => oldest + pts_shift,
            None => retrieval_pts,
        };
        let overlap = plan_overlap(
            &mut self.history,
            retrieval_pts,
            self.format.frames_to_us(ideal_frames as u64),
            buffered_start,
            fill_us,
            self.skew_max_us,
        );

        let plan = match overlap {
            Overlap::Future => {
                return silent_frames(FetchStatus::InFuture, min_frames, &self.format)
            }
            Overlap::Expired => {
                debug!("all queued samples expired; flushing");
                let format = self.format;
                self.flush();
                return silent_frames(FetchStatus::Expired, min_frames, &format);
            }
            Overlap::Partial(plan) => plan,
        };

        let Store::Contiguous { bytes } = &mut self.store else {
            unreachable!("mode latched above");
        };
        let silence_frames = self
            .format
            .us_to_frames(plan.silence_us)
            .min(ideal_frames as u64) as usize;
        if plan.flush_us > 0 {
            let requested = self.format.us_to_frames(plan.flush_us) as usize;
            let flushed = requested.min(bytes.len() / stride);
            bytes.drain(..flushed * stride);
            self.oldest
                .advance_frames(flushed as u64, self.format.sample_rate());
            warn!("skew: flushed {flushed} expired frames from queue");
        } else if silence_frames > 0 {
            warn!("skew: prepending {silence_frames} silence frames to queue output");
        }

        let avail = bytes.len() / stride;
        let to_read = (ideal_frames - silence_frames).min(avail);
        if to_read == 0 {
            if bytes.is_empty() {
                self.oldest.clear();
            }
            return silent_frames(
                FetchStatus::Clipped,
                (silence_frames + to_read).max(min_frames),
                &self.format,
            );
        }

        let total = (silence_frames + to_read).max(min_frames);
        let mut data = vec![silence; total * stride];
        let start = silence_frames * stride;
        let taken = to_read * stride;
        data[start..start + taken].copy_from_slice(&bytes[..taken]);
        bytes.drain(..taken);
        self.oldest
            .advance_frames(to_read as u64, self.format.sample_rate());
        if bytes.is_empty() {
            self.oldest.clear();
        }

        QueueFetch {
            status: FetchStatus::Filled,
            data,
            drift_us: plan.drift_us,
            silence_frames: silence_frames as u64,
            read_frames: to_read as u64,
            duration_us: self.format.frames_to_us(total as u64),
        }
    }

    /// Drop everything buffered and forget timestamp tracking. The
    /// format and mode stay latched.
    pub fn flush(&mut self) {
        match &mut self.store {
            Store::Contiguous { bytes } => bytes.clear(),
            Store::Packets { fifo, fill_us } => {
                fifo.clear();
                *fill_us = 0;
            }
        }
        self.oldest.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{PacketFormat, PcmFormat, SampleType, StreamFormat};

    // Mono 16-bit at 10kHz: stride 2, one frame per 100us.
    fn pcm() -> StreamFormat {
        StreamFormat::Pcm(PcmFormat {
            sample_rate: 10_000,
            channels: 1,
            sample_type: SampleType::S16,
        })
    }

    fn packetized() -> StreamFormat {
        StreamFormat::Packetized(PacketFormat { sample_rate: 48_000 })
    }

    fn frames(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_builder_applies_defaults() {
        let queue: SampleQueue = QueueConfig::builder().format(pcm()).build();
        assert_eq!(queue.skew_max_us, DEFAULT_SKEW_MAX_US);
        assert!(!queue.is_packetized());
        let queue: SampleQueue = QueueConfig::builder()
            .format(packetized())
            .skew_max_us(5_000)
            .build();
        assert_eq!(queue.skew_max_us, 5_000);
        assert!(queue.is_packetized());
    }

    #[test]
    fn test_packet_mode_ignores_timing_and_pops_whole_packets() {
        let mut queue = SampleQueue::new(packetized()).unwrap();
        queue.push_packet(vec![1, 2, 3], 2_500, Some(10_000));
        queue.push_packet(vec![4, 5], 2_500, Some(12_500));
        assert_eq!(queue.fill_level_us(), 5_000);
        assert_eq!(queue.oldest_pts(), Some(10_000));

        // Timing arguments are irrelevant for packets.
        let fetch = queue.retrieve(1, 1, -999_999, 42);
        assert_eq!(fetch.status, FetchStatus::Filled);
        assert_eq!(fetch.data, vec![1, 2, 3]);
        assert_eq!(fetch.duration_us, 2_500);
        assert_eq!(queue.fill_level_us(), 2_500);
        assert_eq!(queue.oldest_pts(), Some(12_500));

        let fetch = queue.retrieve(1, 1, 0, 0);
        assert_eq!(fetch.data, vec![4, 5]);
        assert_eq!(queue.fill_level_us(), 0);
        assert_eq!(queue.oldest_pts(), None, "tracking ends with the data");

        let fetch = queue.retrieve(1, 1, 0, 0);
        assert_eq!(fetch.status, FetchStatus::Empty);
        assert!(fetch.data.is_empty());
    }

    #[test]
    fn test_contiguous_pull_up_to_ideal() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push(&frames(&[1, 2, 3, 4, 5, 6, 7, 8]), Some(0));
        let fetch = queue.retrieve(2, 6, 0, 0);
        assert_eq!(fetch.status, FetchStatus::Filled);
        assert_eq!(fetch.read_frames, 6);
        assert_eq!(fetch.data, frames(&[1, 2, 3, 4, 5, 6]));
        assert_eq!(queue.fill_level_us(), 200, "two frames remain");
    }

    #[test]
    fn test_contiguous_pads_to_min_when_short() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push(&frames(&[7, 8]), Some(0));
        let fetch = queue.retrieve(5, 10, 0, 0);
        assert_eq!(fetch.status, FetchStatus::Filled);
        assert_eq!(fetch.read_frames, 2);
        assert_eq!(fetch.data.len(), 5 * 2, "padded to the minimum");
        assert_eq!(&fetch.data[..4], &frames(&[7, 8])[..]);
        assert!(fetch.data[4..].iter().all(|&b| b == 0));
        assert_eq!(fetch.duration_us, 500);
        assert!(queue.is_empty());
        assert_eq!(queue.oldest_pts(), None);
    }

    #[test]
    fn test_contiguous_empty_and_future_produce_min_silence() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        let fetch = queue.retrieve(4, 8, 0, 0);
        assert_eq!(fetch.status, FetchStatus::Empty);
        assert_eq!(fetch.data, vec![0u8; 4 * 2]);

        queue.push(&frames(&[9; 4]), Some(100_000));
        let fetch = queue.retrieve(4, 8, 0, 0);
        assert_eq!(fetch.status, FetchStatus::InFuture);
        assert_eq!(fetch.data, vec![0u8; 4 * 2]);
        assert_eq!(queue.fill_level_us(), 400, "future data untouched");
    }

    #[test]
    fn test_contiguous_expired_flushes_everything() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push(&frames(&[9; 4]), Some(0));
        let fetch = queue.retrieve(4, 8, 50_000, 0);
        assert_eq!(fetch.status, FetchStatus::Expired);
        assert!(queue.is_empty());
        assert_eq!(queue.oldest_pts(), None);
        assert_eq!(queue.fill_level_us(), 0);
    }

    #[test]
    fn test_contiguous_skew_prepends_silence() {
        let mut queue: SampleQueue = QueueConfig::builder()
            .format(pcm())
            .skew_max_us(50)
            .build();
        queue.push(&frames(&[5; 9]), Some(1_000));
        // Data starts 200us after the retrieval point.
        let fetch = queue.retrieve(4, 10, 800, 0);
        assert_eq!(fetch.status, FetchStatus::Filled);
        assert_eq!(fetch.silence_frames, 2);
        assert_eq!(fetch.read_frames, 8);
        assert_eq!(fetch.drift_us, None, "correction suppresses reporting");
        assert!(fetch.data[..4].iter().all(|&b| b == 0));
        assert_eq!(&fetch.data[4..], &frames(&[5; 8])[..]);
    }

    #[test]
    fn test_contiguous_adopts_push_pts_only_when_untracked() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push(&frames(&[1; 2]), Some(5_000));
        queue.push(&frames(&[2; 2]), Some(9_999));
        assert_eq!(queue.oldest_pts(), Some(5_000), "second pts not adopted");
    }

    #[test]
    fn test_set_format_flushes_and_relatches_mode() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push(&frames(&[1; 4]), Some(0));
        queue.set_format(packetized()).unwrap();
        assert!(queue.is_packetized());
        assert_eq!(queue.fill_level_us(), 0);
        assert_eq!(queue.oldest_pts(), None);
        queue.push_packet(vec![1], 1_000, Some(0));
        assert_eq!(queue.fill_level_us(), 1_000);
    }

    #[test]
    #[should_panic(expected = "packet push on a contiguous queue")]
    fn test_packet_push_on_contiguous_queue_is_a_bug() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        queue.push_packet(vec![1], 1_000, None);
    }

    #[test]
    #[should_panic(expected = "sample push on a packetized queue")]
    fn test_sample_push_on_packetized_queue_is_a_bug() {
        let mut queue = SampleQueue::new(packetized()).unwrap();
        queue.push(&[1, 2], None);
    }

    #[test]
    fn test_fill_level_invariant_across_mixed_calls() {
        let mut queue = SampleQueue::new(pcm()).unwrap();
        let check = |q: &SampleQueue, frames_expected: u64| {
            assert_eq!(q.fill_level_us(), q.format().frames_to_us(frames_expected));
        };
        check(&queue, 0);
        queue.push(&frames(&[1; 7]), Some(0));
        check(&queue, 7);
        let fetch = queue.retrieve(2, 3, 0, 0);
        assert_eq!(fetch.read_frames, 3);
        check(&queue, 4);
        queue.flush();
        check(&queue, 0);
    }
}
