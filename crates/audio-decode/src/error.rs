//! Error types for the decode pipeline.
//!
//! One enum per failure class; [`Error`] aggregates them for callers that do not
//! care which stage failed. Protocol violations by a decoder implementation are
//! not errors: they panic.

use audio_decode_types::{AudioProperties, SampleFormat};
use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

/// Failures while opening a decode session. Nothing is retained after one of these.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("failed to parse source: {0}")]
    Probe(#[source] SymphoniaError),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("codec parameters incomplete: missing {0}")]
    IncompleteParameters(&'static str),

    #[error("unsupported channel count {0}")]
    UnsupportedChannels(usize),

    #[error("failed to create decoder: {0}")]
    Decoder(#[source] CodecError),

    #[error("session is already open")]
    AlreadyOpen,
}

/// Errors reported by a [`crate::codec::FrameDecoder`].
#[derive(Error, Debug)]
pub enum CodecError {
    #[error(transparent)]
    Symphonia(#[from] SymphoniaError),

    #[error("{0}")]
    Other(String),
}

/// Data errors that abort a read. Frames emitted before the failure are kept.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("session is not open")]
    NotOpen,

    #[error("demux failed: {0}")]
    Demux(#[source] SymphoniaError),

    #[error("decode failed: {0}")]
    Codec(#[from] CodecError),

    #[error("unsupported midstream change: expected {expected}, got {actual}")]
    ConfigChange {
        expected: AudioProperties,
        actual: AudioProperties,
    },

    #[error("resample failed: {0}")]
    Resample(String),

    #[error("seek failed: {0}")]
    Seek(#[source] SymphoniaError),
}

/// Rejected configuration, reported before any allocation or processing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tempo ratio {0} outside [0.5, 100.0]")]
    TempoRatio(f64),

    #[error("block size must be at least one frame")]
    BlockFrames,

    #[error("invalid sample rate {0}")]
    SampleRate(u32),

    #[error("invalid channel count {0}")]
    Channels(u16),

    #[error("unsupported target sample format {0}")]
    TargetFormat(SampleFormat),

    #[error("resampler setup failed: {0}")]
    Resampler(String),
}

/// Filter-graph construction or link failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("stage `{stage}` rejected its options: {reason}")]
    InvalidStage { stage: &'static str, reason: String },

    #[error("cannot link `{from}` to `{to}`: {reason}")]
    Link {
        from: &'static str,
        to: &'static str,
        reason: String,
    },

    #[error("input has {got} channels, graph expects {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("input submitted after end of stream")]
    Flushed,
}

/// Tempo pump failures. The caller's buffer is left untouched on any of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PumpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("destination capacity exceeded: {needed} frames needed, {capacity} available")]
    Capacity { needed: usize, capacity: usize },

    #[error("tempo change produced no output frames")]
    EmptyOutput,
}

/// Any failure surfaced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Pump(#[from] PumpError),
}

/// Convenience result using the crate [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
