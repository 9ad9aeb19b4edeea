// ABOUTME: Stream format descriptors for time-divisible and packetized audio
// ABOUTME: Stride, silence pattern, and frames<->microseconds conversions per variant

use crate::error::Error;

/// Microseconds per second; all timestamps in this crate are signed
/// 64-bit microsecond counts.
pub const MICROS_PER_SEC: i64 = 1_000_000;

/// PCM sample representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit.
    S16,
    /// Signed 24-bit, packed in 3 bytes.
    S24,
    /// Signed 32-bit.
    S32,
    /// 32-bit float.
    F32,
}

impl SampleType {
    /// Bytes per sample.
    pub fn bytes(self) -> u32 {
        match self {
            SampleType::U8 => 1,
            SampleType::S16 => 2,
            SampleType::S24 => 3,
            SampleType::S32 | SampleType::F32 => 4,
        }
    }

    /// Byte value representing silence. Midpoint for unsigned, zero
    /// for everything else.
    pub fn silence_byte(self) -> u8 {
        match self {
            SampleType::U8 => 0x80,
            _ => 0x00,
        }
    }
}

/// Linear PCM stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u32,
    /// Per-sample representation.
    pub sample_type: SampleType,
}

/// DSD stream parameters. A frame is one byte per channel (8 one-bit
/// samples), so `sample_rate` counts byte-frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DsdFormat {
    /// Byte-frames per second.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u32,
}

/// Compressed stream parameters. Units are opaque packets carrying
/// their own duration; the nominal rate is informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFormat {
    /// Nominal decoded frames per second.
    pub sample_rate: u32,
}

/// Stream format descriptor.
///
/// The variant decides which storage mode a queue uses: `Pcm` and `Dsd`
/// data can be split, silenced, and re-partitioned at frame boundaries;
/// `Packetized` data is a sequence of indivisible packets. The choice
/// is latched per stream instance — changing it requires a flush and
/// reconfiguration, never in-place mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Linear PCM.
    Pcm(PcmFormat),
    /// Direct Stream Digital.
    Dsd(DsdFormat),
    /// Opaque compressed packets.
    Packetized(PacketFormat),
}

impl StreamFormat {
    /// Frames (or nominal frames) per second.
    pub fn sample_rate(&self) -> u32 {
        match self {
            StreamFormat::Pcm(f) => f.sample_rate,
            StreamFormat::Dsd(f) => f.sample_rate,
            StreamFormat::Packetized(f) => f.sample_rate,
        }
    }

    /// Bytes per frame. Packets are opaque, so the packetized stride
    /// is nominal (one byte) and never used for partitioning.
    pub fn stride(&self) -> u32 {
        match self {
            StreamFormat::Pcm(f) => f.channels * f.sample_type.bytes(),
            StreamFormat::Dsd(f) => f.channels,
            StreamFormat::Packetized(_) => 1,
        }
    }

    /// Whether frames can be individually inserted, removed, or
    /// replaced with silence.
    pub fn is_time_divisible(&self) -> bool {
        !matches!(self, StreamFormat::Packetized(_))
    }

    /// Byte pattern for silence. DSD idle is the 0x69 bit pattern, not
    /// zero.
    pub fn silence_byte(&self) -> u8 {
        match self {
            StreamFormat::Pcm(f) => f.sample_type.silence_byte(),
            StreamFormat::Dsd(_) => 0x69,
            StreamFormat::Packetized(_) => 0x00,
        }
    }

    /// Duration of `frames` frames, in microseconds (floor).
    pub fn frames_to_us(&self, frames: u64) -> i64 {
        let rate = self.sample_rate() as i128;
        (frames as i128 * MICROS_PER_SEC as i128 / rate) as i64
    }

    /// Frame count spanning `us` microseconds (floor; negative
    /// durations count as zero).
    pub fn us_to_frames(&self, us: i64) -> u64 {
        let rate = self.sample_rate() as i128;
        (us.max(0) as i128 * rate as i128 / MICROS_PER_SEC as i128) as u64
    }

    /// Check that the descriptor can actually partition data.
    pub fn validate(&self) -> Result<(), Error> {
        if self.sample_rate() == 0 {
            return Err(Error::Format("sample rate must be non-zero".into()));
        }
        match self {
            StreamFormat::Pcm(f) if f.channels == 0 => {
                Err(Error::Format("channel count must be non-zero".into()))
            }
            StreamFormat::Dsd(f) if f.channels == 0 => {
                Err(Error::Format("channel count must be non-zero".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16(rate: u32) -> StreamFormat {
        StreamFormat::Pcm(PcmFormat {
            sample_rate: rate,
            channels: 2,
            sample_type: SampleType::S16,
        })
    }

    #[test]
    fn test_pcm_stride() {
        assert_eq!(stereo_s16(48_000).stride(), 4);
        let f = StreamFormat::Pcm(PcmFormat {
            sample_rate: 44_100,
            channels: 6,
            sample_type: SampleType::S24,
        });
        assert_eq!(f.stride(), 18);
    }

    #[test]
    fn test_silence_patterns() {
        assert_eq!(stereo_s16(48_000).silence_byte(), 0x00);
        let u8_fmt = StreamFormat::Pcm(PcmFormat {
            sample_rate: 8_000,
            channels: 1,
            sample_type: SampleType::U8,
        });
        assert_eq!(u8_fmt.silence_byte(), 0x80);
        let dsd = StreamFormat::Dsd(DsdFormat {
            sample_rate: 352_800,
            channels: 2,
        });
        assert_eq!(dsd.silence_byte(), 0x69);
    }

    #[test]
    fn test_duration_conversions() {
        let f = stereo_s16(10_000); // 100us per frame
        assert_eq!(f.frames_to_us(1), 100);
        assert_eq!(f.frames_to_us(10), 1_000);
        assert_eq!(f.us_to_frames(1_000), 10);
        assert_eq!(f.us_to_frames(150), 1, "partial frames floor");
        assert_eq!(f.us_to_frames(-500), 0, "negative duration is empty");
    }

    #[test]
    fn test_conversion_does_not_overflow_large_counts() {
        let f = stereo_s16(192_000);
        // A day of audio at 192kHz.
        let frames = 192_000u64 * 86_400;
        assert_eq!(f.frames_to_us(frames), 86_400 * MICROS_PER_SEC);
    }

    #[test]
    fn test_divisibility_per_variant() {
        assert!(stereo_s16(48_000).is_time_divisible());
        assert!(StreamFormat::Dsd(DsdFormat {
            sample_rate: 352_800,
            channels: 2
        })
        .is_time_divisible());
        assert!(!StreamFormat::Packetized(PacketFormat {
            sample_rate: 48_000
        })
        .is_time_divisible());
    }

    #[test]
    fn test_validate_rejects_degenerate_formats() {
        assert!(stereo_s16(0).validate().is_err());
        let no_channels = StreamFormat::Pcm(PcmFormat {
            sample_rate: 48_000,
            channels: 0,
            sample_type: SampleType::S16,
        });
        assert!(no_channels.validate().is_err());
        assert!(stereo_s16(48_000).validate().is_ok());
    }
}
