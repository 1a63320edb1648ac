//! Decode compressed audio into normalized planar `f32` buffers.
//!
//! [`DecodeSession`] demuxes and decodes through Symphonia, optionally converting
//! to a target rate and channel layout. [`TempoPump`] re-times a decoded buffer
//! through a block-based [`FilterGraph`].

pub mod buffer;
pub mod codec;
pub mod config;
pub mod duration;
pub mod error;
pub mod pump;
pub mod resample;
pub mod sample;
pub mod session;
pub mod source;
pub mod tempo;

pub use audio_decode_types::{AudioProperties, SampleFormat, StreamInfo};
pub use buffer::AudioBuffer;
pub use config::{DecodeConfig, PumpConfig};
pub use error::{ConfigError, DecodeError, Error, GraphError, OpenError, PumpError, Result};
pub use pump::{PumpReport, TempoPump};
pub use session::{DecodeSession, ReadStatus, ReadSummary};
pub use source::{ByteSource, FileSource, MemorySource};
pub use tempo::{FilterGraph, StageOptions, TempoGraph};
