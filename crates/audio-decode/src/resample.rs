//! Sample-rate and channel-layout conversion for decode sessions with target properties.
//!
//! Uses Rubato's sinc resampler over interleaved `f32`. Input is buffered into
//! fixed chunks; [`StreamResampler::flush`] pushes the trailing partial chunk.

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::buffer::AudioBuffer;
use crate::error::{ConfigError, DecodeError};
use crate::sample::Float32NoClip;

/// Streaming resampler with a fixed input chunk.
pub struct StreamResampler {
    inner: Box<dyn Resampler<f32>>,
    channels: usize,
    chunk_frames: usize,
    pending: Vec<f32>,
    out_interleaved: Vec<f32>,
}

impl StreamResampler {
    pub fn new(
        src_rate: u32,
        dst_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self, ConfigError> {
        if src_rate == 0 {
            return Err(ConfigError::SampleRate(src_rate));
        }
        if dst_rate == 0 {
            return Err(ConfigError::SampleRate(dst_rate));
        }

        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let oversampling_factor = 256;
        let interpolation = SincInterpolationType::Cubic;
        let window = WindowFunction::BlackmanHarris2;
        let f_cutoff = calculate_cutoff(sinc_len, window);

        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        };

        let chunk_frames = chunk_frames.max(1);
        let inner: Box<dyn Resampler<f32>> = Box::new(
            Async::<f32>::new_sinc(
                f_ratio,
                1.1,
                &params,
                chunk_frames,
                channels,
                FixedAsync::Input,
            )
            .map_err(|e| ConfigError::Resampler(e.to_string()))?,
        );

        let out_interleaved = vec![0.0f32; channels * inner.output_frames_max()];
        tracing::debug!(src_rate, dst_rate, channels, chunk_frames, "resampler ready");

        Ok(Self {
            inner,
            channels,
            chunk_frames,
            pending: Vec::new(),
            out_interleaved,
        })
    }

    /// Queue `buffer` and return every complete chunk's output, interleaved.
    pub fn process(&mut self, buffer: &AudioBuffer<'_>) -> Result<Vec<f32>, DecodeError> {
        let start = self.pending.len();
        self.pending
            .resize(start + buffer.frames() * self.channels, 0.0);
        buffer.to_interleaved::<Float32NoClip>(buffer.frames(), &mut self.pending[start..]);

        let chunk_samples = self.chunk_frames * self.channels;
        let mut produced = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed >= chunk_samples {
            let chunk = self.pending[consumed..consumed + chunk_samples].to_vec();
            self.run_chunk(&chunk, None, &mut produced)?;
            consumed += chunk_samples;
        }
        self.pending.drain(..consumed);
        Ok(produced)
    }

    /// Push any buffered partial chunk through the resampler.
    pub fn flush(&mut self) -> Result<Vec<f32>, DecodeError> {
        let mut produced = Vec::new();
        let tail_frames = self.pending.len() / self.channels;
        if tail_frames > 0 {
            let mut tail = std::mem::take(&mut self.pending);
            tail.resize(self.chunk_frames * self.channels, 0.0);
            self.run_chunk(&tail, Some(tail_frames), &mut produced)?;
        }
        Ok(produced)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.inner.reset();
    }

    fn run_chunk(
        &mut self,
        interleaved: &[f32],
        partial_len: Option<usize>,
        produced: &mut Vec<f32>,
    ) -> Result<(), DecodeError> {
        let input_adapter = InterleavedSlice::new(interleaved, self.channels, self.chunk_frames)
            .map_err(|e| DecodeError::Resample(format!("interleaved slice (input): {e}")))?;

        let out_capacity_frames = self.out_interleaved.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.out_interleaved, self.channels, out_capacity_frames)
                .map_err(|e| DecodeError::Resample(format!("interleaved slice (output): {e}")))?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len,
        };

        let (_nbr_in, nbr_out) = self
            .inner
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| DecodeError::Resample(e.to_string()))?;

        produced.extend_from_slice(&self.out_interleaved[..nbr_out * self.channels]);
        Ok(())
    }
}

/// Remap one buffer to `dst_channels`.
///
/// Mapping rules:
/// - stereo → mono: average L/R
/// - same count: pass-through
/// - other layouts: each output channel reads the nearest available input channel
///   (mono → stereo duplicates channel 0)
pub fn map_channels(src: &AudioBuffer<'_>, dst_channels: usize) -> AudioBuffer<'static> {
    let mut dst = AudioBuffer::create(dst_channels, src.frames());
    match (src.channels(), dst_channels) {
        (2, 1) => {
            let (left, right) = (src.channel(0), src.channel(1));
            for (out, (l, r)) in dst.channel_mut(0).iter_mut().zip(left.iter().zip(right)) {
                *out = 0.5 * (l + r);
            }
        }
        (src_channels, _) => {
            for ch in 0..dst_channels {
                dst.channel_mut(ch)
                    .copy_from_slice(src.channel(ch.min(src_channels - 1)));
            }
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sine(channels: usize, frames: usize, rate: u32) -> AudioBuffer<'static> {
        let mut buffer = AudioBuffer::create(channels, frames);
        for ch in 0..channels {
            for (i, s) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5;
            }
        }
        buffer
    }

    #[test]
    fn rejects_zero_rates() {
        assert!(matches!(
            StreamResampler::new(0, 48_000, 2, 256),
            Err(ConfigError::SampleRate(0))
        ));
        assert!(matches!(
            StreamResampler::new(44_100, 0, 2, 256),
            Err(ConfigError::SampleRate(0))
        ));
    }

    #[test]
    fn upsampling_scales_frame_count() {
        let mut resampler = StreamResampler::new(24_000, 48_000, 2, 256).unwrap();
        let input = sine(2, 24_000, 24_000);

        let mut out = resampler.process(&input).unwrap();
        out.extend(resampler.flush().unwrap());

        let out_frames = out.len() / 2;
        // Roughly double, minus the resampler's filter delay.
        assert!(out_frames > 47_000 && out_frames <= 48_400, "{out_frames}");
    }

    #[test]
    fn buffers_until_a_full_chunk() {
        let mut resampler = StreamResampler::new(44_100, 48_000, 1, 512).unwrap();
        let short = sine(1, 100, 44_100);
        assert!(resampler.process(&short).unwrap().is_empty());
        assert!(!resampler.flush().unwrap().is_empty());
        assert!(resampler.flush().unwrap().is_empty());
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut src = AudioBuffer::create(2, 3);
        src.channel_mut(0).copy_from_slice(&[1.0, 0.5, -1.0]);
        src.channel_mut(1).copy_from_slice(&[0.0, 0.5, 1.0]);
        let mono = map_channels(&src, 1);
        assert_eq!(mono.channels(), 1);
        assert_abs_diff_eq!(mono.channel(0)[0], 0.5);
        assert_abs_diff_eq!(mono.channel(0)[1], 0.5);
        assert_abs_diff_eq!(mono.channel(0)[2], 0.0);
    }

    #[test]
    fn mono_to_stereo_duplicates() {
        let mut src = AudioBuffer::create(1, 2);
        src.channel_mut(0).copy_from_slice(&[0.25, -0.75]);
        let stereo = map_channels(&src, 2);
        assert_eq!(stereo.channel(0), &[0.25, -0.75]);
        assert_eq!(stereo.channel(1), &[0.25, -0.75]);
    }

    #[test]
    fn wider_layouts_clamp_to_last_channel() {
        let mut src = AudioBuffer::create(2, 1);
        src.channel_mut(0)[0] = 0.1;
        src.channel_mut(1)[0] = 0.2;
        let six = map_channels(&src, 6);
        assert_eq!(six.channel(0), &[0.1]);
        assert_eq!(six.channel(1), &[0.2]);
        assert_eq!(six.channel(5), &[0.2]);
    }
}
