//! Raw PCM writer.

use std::io::{self, Write};

use audio_decode::AudioBuffer;
use audio_decode::sample::{Float32, SignedInt16};

use crate::cli::OutputFormat;

/// Write `buffer` interleaved, little-endian, in `format`. Returns bytes written.
pub fn write_raw<W: Write>(
    writer: &mut W,
    buffer: &AudioBuffer<'_>,
    format: OutputFormat,
) -> io::Result<usize> {
    let samples = buffer.frames() * buffer.channels();
    match format {
        OutputFormat::F32 => {
            let mut interleaved = vec![0.0f32; samples];
            buffer.to_interleaved::<Float32>(buffer.frames(), &mut interleaved);
            for s in &interleaved {
                writer.write_all(&s.to_le_bytes())?;
            }
            Ok(samples * 4)
        }
        OutputFormat::S16 => {
            let mut interleaved = vec![0i16; samples];
            buffer.to_interleaved::<SignedInt16>(buffer.frames(), &mut interleaved);
            for s in &interleaved {
                writer.write_all(&s.to_le_bytes())?;
            }
            Ok(samples * 2)
        }
    }
}
