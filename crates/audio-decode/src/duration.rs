//! Duration and frame-count estimates.
//!
//! Container durations are estimates. Some encoders inject priming samples at the
//! start and pad the final packet, so the reported length undercounts what the
//! decoder actually emits. Those codecs get an entry in [`DurationCorrections`];
//! everything else gets a 1 µs rounding guard.

use symphonia::core::codecs::{CODEC_TYPE_AAC, CodecParameters, CodecType};

/// Encoder priming frames inserted by common AAC encoders.
pub const AAC_PRIMING_FRAMES: u32 = 2112;

/// Trailing frames of padding in the last AAC packet.
pub const AAC_REMAINDER_FRAMES: u32 = 519;

const ROUNDING_GUARD_US: i64 = 1;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Per-codec duration fix-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DurationCorrection {
    pub priming_frames: u32,
    pub remainder_frames: u32,
    /// Shrink decoded frames that run past their packet's duration.
    pub trim_to_packet_duration: bool,
}

impl DurationCorrection {
    pub const AAC: DurationCorrection = DurationCorrection {
        priming_frames: AAC_PRIMING_FRAMES,
        remainder_frames: AAC_REMAINDER_FRAMES,
        trim_to_packet_duration: true,
    };

    /// Microseconds added to the raw estimate at `sample_rate`.
    pub fn offset_us(&self, sample_rate: u32) -> i64 {
        let frames = (self.priming_frames + self.remainder_frames) as f64;
        (MICROS_PER_SECOND * frames / sample_rate as f64).ceil() as i64
    }
}

/// Table of corrections keyed by codec. The default table covers AAC.
#[derive(Clone, Debug, PartialEq)]
pub struct DurationCorrections {
    entries: Vec<(CodecType, DurationCorrection)>,
}

impl Default for DurationCorrections {
    fn default() -> Self {
        Self {
            entries: vec![(CODEC_TYPE_AAC, DurationCorrection::AAC)],
        }
    }
}

impl DurationCorrections {
    /// Table with no corrections; every codec gets the rounding guard.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add or replace the correction for `codec`, returning the previous one.
    pub fn insert(
        &mut self,
        codec: CodecType,
        correction: DurationCorrection,
    ) -> Option<DurationCorrection> {
        if let Some(entry) = self.entries.iter_mut().find(|(c, _)| *c == codec) {
            return Some(std::mem::replace(&mut entry.1, correction));
        }
        self.entries.push((codec, correction));
        None
    }

    pub fn get(&self, codec: CodecType) -> Option<&DurationCorrection> {
        self.entries
            .iter()
            .find(|(c, _)| *c == codec)
            .map(|(_, correction)| correction)
    }

    /// Raw container estimate plus the codec's correction (or the rounding guard).
    pub fn corrected_duration_us(&self, codec: CodecType, raw_us: i64, sample_rate: u32) -> i64 {
        let offset = match self.get(codec) {
            Some(correction) => correction.offset_us(sample_rate),
            None => ROUNDING_GUARD_US,
        };
        raw_us.saturating_add(offset)
    }
}

/// Raw duration in microseconds from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
pub fn raw_duration_us(params: &CodecParameters) -> Option<i64> {
    let frames = params.n_frames?;
    let rate = params.sample_rate? as u128;
    if rate == 0 {
        return None;
    }
    i64::try_from(frames as u128 * 1_000_000 / rate).ok()
}

/// Frames covered by `duration_us` at `sample_rate`, rounded up.
pub fn estimate_frames(duration_us: i64, sample_rate: u32) -> u64 {
    ((duration_us as f64 / MICROS_PER_SECOND) * sample_rate as f64).ceil() as u64
}

/// Frame count after trimming a decoded frame to its packet's duration.
///
/// Only shrinks; an unknown or zero packet duration leaves `frames` alone.
pub fn trimmed_frame_count(frames: usize, packet_frames: Option<u64>) -> usize {
    match packet_frames {
        Some(packet) if packet > 0 && packet < frames as u64 => packet as usize,
        _ => frames,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::codecs::{CODEC_TYPE_FLAC, CODEC_TYPE_MP3};

    #[test]
    fn raw_duration_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(raw_duration_us(&params).is_none());
    }

    #[test]
    fn raw_duration_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(raw_duration_us(&params), Some(2_000_000));
    }

    #[test]
    fn raw_duration_unknown_without_frames() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        assert!(raw_duration_us(&params).is_none());
    }

    #[test]
    fn aac_gets_priming_and_remainder_offset() {
        let table = DurationCorrections::default();
        // ceil(1e6 * 2631 / 44100) = 59660
        assert_eq!(
            table.corrected_duration_us(CODEC_TYPE_AAC, 1_000_000, 44_100),
            1_059_660
        );
    }

    #[test]
    fn other_codecs_get_rounding_guard() {
        let table = DurationCorrections::default();
        assert_eq!(table.corrected_duration_us(CODEC_TYPE_FLAC, 500, 44_100), 501);
        assert_eq!(
            DurationCorrections::empty().corrected_duration_us(CODEC_TYPE_AAC, 500, 44_100),
            501
        );
    }

    #[test]
    fn table_is_pluggable() {
        let mut table = DurationCorrections::default();
        let mp3 = DurationCorrection {
            priming_frames: 1105,
            remainder_frames: 0,
            trim_to_packet_duration: false,
        };
        assert!(table.insert(CODEC_TYPE_MP3, mp3).is_none());
        assert_eq!(table.get(CODEC_TYPE_MP3), Some(&mp3));
        assert_eq!(table.insert(CODEC_TYPE_MP3, DurationCorrection::AAC), Some(mp3));
        assert_eq!(table.get(CODEC_TYPE_AAC), Some(&DurationCorrection::AAC));
    }

    #[test]
    fn frame_estimate_rounds_up() {
        // One second plus the guard pushes past an exact frame count.
        assert_eq!(estimate_frames(1_000_001, 44_100), 44_101);
        assert_eq!(estimate_frames(1_000_000, 44_100), 44_100);
        assert_eq!(estimate_frames(0, 44_100), 0);
    }

    #[test]
    fn trimming_only_shrinks() {
        assert_eq!(trimmed_frame_count(1024, Some(100)), 100);
        assert_eq!(trimmed_frame_count(1024, Some(2048)), 1024);
        assert_eq!(trimmed_frame_count(1024, Some(0)), 1024);
        assert_eq!(trimmed_frame_count(1024, None), 1024);
    }
}
