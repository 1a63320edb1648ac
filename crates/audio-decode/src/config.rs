use audio_decode_types::SampleFormat;

use crate::duration::DurationCorrections;

/// Decode session tuning.
#[derive(Clone, Debug)]
pub struct DecodeConfig {
    /// Packets demuxed per `read()` when the caller passes no limit. `None` reads to end of stream.
    pub max_packets: Option<usize>,
    /// Log and skip packets the codec rejects instead of aborting the read.
    pub tolerate_decode_errors: bool,
    /// Resampler input chunk size in frames.
    pub resample_chunk_frames: usize,
    /// Per-codec duration corrections.
    pub duration_corrections: DurationCorrections,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_packets: None,
            tolerate_decode_errors: false,
            resample_chunk_frames: 1024,
            duration_corrections: DurationCorrections::default(),
        }
    }
}

/// Tempo pump parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PumpConfig {
    /// Playback-rate multiplier; `2.0` halves the length, `0.5` doubles it.
    pub ratio: f64,
    /// Frames submitted to the filter graph per block.
    pub block_frames: usize,
    /// Extra destination frames on top of `ceil(frames / ratio)`.
    pub headroom_frames: usize,
    /// Sample format the output is normalized through.
    pub output_format: SampleFormat,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            ratio: 1.0,
            block_frames: 1024,
            headroom_frames: 4096,
            output_format: SampleFormat::F32,
        }
    }
}
