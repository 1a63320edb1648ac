use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample layout produced by a decoder for one frame of audio.
///
/// Interleaved variants store `[ch0, ch1, ..., chN, ch0, ...]`; the planar
/// variant stores every frame of one channel before the next channel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// Unsigned 8-bit, interleaved.
    U8,
    /// Signed 16-bit, interleaved.
    S16,
    /// Signed 32-bit, interleaved.
    S32,
    /// 32-bit float, interleaved.
    F32,
    /// 32-bit float, planar.
    F32Planar,
}

impl SampleFormat {
    /// Size of one stored sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::U8 => 1,
            SampleFormat::S16 => 2,
            SampleFormat::S32 | SampleFormat::F32 | SampleFormat::F32Planar => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F32Planar)
    }

    /// Short lowercase label (`s16`, `fltp`, ...).
    pub fn label(self) -> &'static str {
        match self {
            SampleFormat::U8 => "u8",
            SampleFormat::S16 => "s16",
            SampleFormat::S32 => "s32",
            SampleFormat::F32 => "flt",
            SampleFormat::F32Planar => "fltp",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Channel count, sample rate and sample format of a stream.
///
/// Two properties are equal only when all three fields match; decoders use this
/// to detect unsupported midstream configuration changes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AudioProperties {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
}

impl AudioProperties {
    pub fn new(channels: u16, sample_rate: u32, sample_format: SampleFormat) -> Self {
        Self {
            channels,
            sample_rate,
            sample_format,
        }
    }
}

impl fmt::Display for AudioProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channels={} sample_rate={} sample_format={}",
            self.channels, self.sample_rate, self.sample_format
        )
    }
}

/// Probe result for an opened decode session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    /// Codec label (for example `AAC`, `FLAC`), when recognised.
    pub codec: Option<String>,
    /// Properties captured when the stream was opened.
    pub source: AudioProperties,
    /// Properties of the buffers the session emits, when they differ from `source`.
    pub target: Option<AudioProperties>,
    /// Source bit depth, if the container reports one.
    pub bit_depth: Option<u16>,
    /// Estimated duration in microseconds (corrected for encoder priming).
    pub duration_us: Option<i64>,
    /// Estimated number of sample-frames.
    pub estimated_frames: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_compare_all_fields() {
        let a = AudioProperties::new(2, 44_100, SampleFormat::S16);
        assert_eq!(a, AudioProperties::new(2, 44_100, SampleFormat::S16));
        assert_ne!(a, AudioProperties::new(2, 48_000, SampleFormat::S16));
        assert_ne!(a, AudioProperties::new(1, 44_100, SampleFormat::S16));
        assert_ne!(a, AudioProperties::new(2, 44_100, SampleFormat::F32Planar));
    }

    #[test]
    fn sample_format_serializes_snake_case() {
        let json = serde_json::to_string(&SampleFormat::F32Planar).unwrap();
        assert_eq!(json, "\"f32_planar\"");
    }

    #[test]
    fn bytes_per_sample_matches_width() {
        assert_eq!(SampleFormat::U8.bytes_per_sample(), 1);
        assert_eq!(SampleFormat::S16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::S32.bytes_per_sample(), 4);
    }
}
