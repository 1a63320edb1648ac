//! Tempo filter graph.
//!
//! A linear graph `ingest -> tempo -> format -> sink` built from declarative
//! [`StageOptions`]. The tempo stage is an overlap-add time stretch: Hann-windowed
//! grains are read from the input at an analysis hop of `ratio * hop` and written
//! at a fixed synthesis hop, changing duration without changing pitch.
//!
//! Output length is exact: after end of stream the graph emits
//! `round(input_frames / ratio)` frames in total.

use std::f32::consts::PI;

use audio_decode_types::SampleFormat;

use crate::buffer::{AudioBuffer, MAX_CHANNELS};
use crate::error::GraphError;
use crate::sample::SampleKind;

/// Accepted tempo ratio range, inclusive.
pub const MIN_RATIO: f64 = 0.5;
pub const MAX_RATIO: f64 = 100.0;

/// Upper bound on frames returned by one [`FilterGraph::pull`].
pub const MAX_PULL_FRAMES: usize = 4096;

const GRAIN_SECONDS: f64 = 0.025;
const MIN_GRAIN_FRAMES: usize = 64;

/// Block-based transform boundary used by the tempo pump.
pub trait FilterGraph {
    /// Submit one block of input, or `None` to signal end of stream.
    fn submit(&mut self, block: Option<&AudioBuffer<'_>>) -> Result<(), GraphError>;

    /// Next block of output, or `None` when nothing is ready yet.
    fn pull(&mut self) -> Result<Option<AudioBuffer<'static>>, GraphError>;
}

/// Per-stage options, in graph order.
#[derive(Clone, Debug, PartialEq)]
pub enum StageOptions {
    /// Describes the blocks that will be submitted.
    Ingest {
        channels: u16,
        sample_format: SampleFormat,
        sample_rate: u32,
    },
    Tempo {
        ratio: f64,
    },
    /// Output normalization: samples are quantized through `sample_format`.
    Format {
        sample_format: SampleFormat,
        sample_rate: u32,
        channels: u16,
    },
    Sink,
}

impl StageOptions {
    pub fn name(&self) -> &'static str {
        match self {
            StageOptions::Ingest { .. } => "ingest",
            StageOptions::Tempo { .. } => "tempo",
            StageOptions::Format { .. } => "format",
            StageOptions::Sink => "sink",
        }
    }

    /// The standard four-stage chain for re-timing float audio.
    pub fn tempo_chain(
        channels: u16,
        sample_rate: u32,
        ratio: f64,
        output_format: SampleFormat,
    ) -> Vec<StageOptions> {
        vec![
            StageOptions::Ingest {
                channels,
                sample_format: SampleFormat::F32Planar,
                sample_rate,
            },
            StageOptions::Tempo { ratio },
            StageOptions::Format {
                sample_format: output_format,
                sample_rate,
                channels,
            },
            StageOptions::Sink,
        ]
    }
}

/// Grain length used at `sample_rate`; always even.
pub fn grain_frames(sample_rate: u32) -> usize {
    let frames = ((sample_rate as f64 * GRAIN_SECONDS) as usize).max(MIN_GRAIN_FRAMES);
    frames + frames % 2
}

/// Overlap-add time stretch over planar channels.
///
/// Positions are absolute frame indices in a padded input that starts with `hop`
/// zeros, so the first real frame is covered by two grains like every other one;
/// the first `hop` output frames belong to the padding and are dropped.
pub struct TimeStretch {
    ratio: f64,
    grain: usize,
    hop: usize,
    window: Vec<f32>,

    input: Vec<Vec<f32>>,
    /// Absolute index of `input[ch][0]`.
    input_base: usize,
    /// Real frames received.
    input_total: usize,
    /// Absolute start of the next analysis grain.
    next_grain: f64,

    overlap: Vec<Vec<f32>>,
    pending: Vec<Vec<f32>>,
    skip_output: usize,
    released: usize,
    /// Total output length, known once the input has ended.
    target_total: Option<usize>,
}

impl TimeStretch {
    pub fn new(channels: usize, sample_rate: u32, ratio: f64) -> Self {
        let grain = grain_frames(sample_rate);
        let hop = grain / 2;

        // Periodic Hann: two copies offset by `hop` sum to exactly one.
        let window: Vec<f32> = (0..grain)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / grain as f32).cos()))
            .collect();

        Self {
            ratio,
            grain,
            hop,
            window,
            input: vec![vec![0.0; hop]; channels],
            input_base: 0,
            input_total: 0,
            next_grain: 0.0,
            overlap: vec![vec![0.0; grain]; channels],
            pending: vec![Vec::new(); channels],
            skip_output: hop,
            released: 0,
            target_total: None,
        }
    }

    pub fn channels(&self) -> usize {
        self.input.len()
    }

    pub fn is_finished(&self) -> bool {
        self.target_total.is_some()
    }

    fn input_len(&self) -> usize {
        self.input[0].len()
    }

    fn pending_len(&self) -> usize {
        self.pending[0].len()
    }

    /// Append a block of input and synthesize every grain it completes.
    pub fn push(&mut self, block: &AudioBuffer<'_>) {
        debug_assert!(!self.is_finished());
        let write_pos = self.hop + self.input_total;
        // Frames that fall entirely between two grains are never read.
        let skip = self
            .input_base
            .saturating_sub(write_pos)
            .min(block.frames());
        for (ch, input) in self.input.iter_mut().enumerate() {
            input.extend_from_slice(&block.channel(ch)[skip..]);
        }
        self.input_total += block.frames();
        self.run_grains();
    }

    /// Mark end of input: synthesize zero-padded grains until the output reaches
    /// `round(input / ratio)` frames, then trim to exactly that.
    pub fn finish(&mut self) {
        if self.is_finished() {
            return;
        }
        let target = (self.input_total as f64 / self.ratio).round() as usize;

        while self.released + self.pending_len() < target {
            let start = self.next_grain.floor() as usize;
            let end = self.input_base + self.input_len();
            let missing = (start + self.grain).saturating_sub(end);
            for input in &mut self.input {
                input.resize(input.len() + missing, 0.0);
            }
            self.run_grains();
        }

        let keep = target - self.released;
        for pending in &mut self.pending {
            pending.truncate(keep);
        }
        self.target_total = Some(target);
    }

    /// Frames that may be popped now.
    pub fn available(&self) -> usize {
        let limit = match self.target_total {
            Some(target) => target,
            None => (self.input_total as f64 / self.ratio).floor() as usize,
        };
        limit.saturating_sub(self.released).min(self.pending_len())
    }

    /// Pop up to `max_frames` released frames, one vector per channel.
    pub fn pop(&mut self, max_frames: usize) -> Option<Vec<Vec<f32>>> {
        let n = self.available().min(max_frames);
        if n == 0 {
            return None;
        }
        self.released += n;
        Some(
            self.pending
                .iter_mut()
                .map(|pending| pending.drain(..n).collect())
                .collect(),
        )
    }

    fn run_grains(&mut self) {
        loop {
            let start = self.next_grain.floor() as usize;
            if start + self.grain > self.input_base + self.input_len() {
                break;
            }
            self.synthesize(start - self.input_base);

            self.next_grain += self.ratio * self.hop as f64;
            let keep_from = self.next_grain.floor() as usize;
            let drop = (keep_from - self.input_base).min(self.input_len());
            for input in &mut self.input {
                input.drain(..drop);
            }
            self.input_base = keep_from;
        }
    }

    fn synthesize(&mut self, offset: usize) {
        let hop = self.hop;
        let skip = self.skip_output.min(hop);
        self.skip_output -= skip;

        for ((input, overlap), pending) in self
            .input
            .iter()
            .zip(self.overlap.iter_mut())
            .zip(self.pending.iter_mut())
        {
            let grain = &input[offset..offset + self.grain];
            for ((acc, &sample), &w) in overlap.iter_mut().zip(grain).zip(&self.window) {
                *acc += sample * w;
            }

            // Frames before the next grain's start are final.
            pending.extend_from_slice(&overlap[skip..hop]);
            overlap.copy_within(hop.., 0);
            overlap[self.grain - hop..].fill(0.0);
        }
    }
}

/// Filter graph built from a validated `ingest -> tempo -> format -> sink` chain.
pub struct TempoGraph {
    stretch: TimeStretch,
    output: SampleKind,
    flushed: bool,
}

impl TempoGraph {
    /// Validate `stages` and link them.
    pub fn build(stages: &[StageOptions]) -> Result<Self, GraphError> {
        let [ingest, tempo, format, sink] = stages else {
            return Err(GraphError::Link {
                from: "input",
                to: "sink",
                reason: format!("expected 4 stages, got {}", stages.len()),
            });
        };

        let &StageOptions::Ingest {
            channels,
            sample_format,
            sample_rate,
        } = ingest
        else {
            return Err(unexpected_stage("input", ingest, "ingest"));
        };
        if channels == 0 || channels as usize > MAX_CHANNELS {
            return Err(invalid_stage("ingest", format!("channel count {channels}")));
        }
        if sample_rate == 0 {
            return Err(invalid_stage("ingest", "sample rate 0".to_string()));
        }
        if !sample_format.is_float() {
            return Err(invalid_stage(
                "ingest",
                format!("sample format {sample_format} is not float"),
            ));
        }

        let &StageOptions::Tempo { ratio } = tempo else {
            return Err(unexpected_stage("ingest", tempo, "tempo"));
        };
        if !(MIN_RATIO..=MAX_RATIO).contains(&ratio) {
            return Err(invalid_stage("tempo", format!("ratio {ratio}")));
        }

        let &StageOptions::Format {
            sample_format: output_format,
            sample_rate: output_rate,
            channels: output_channels,
        } = format
        else {
            return Err(unexpected_stage("tempo", format, "format"));
        };
        if output_channels != channels {
            return Err(GraphError::Link {
                from: "tempo",
                to: "format",
                reason: format!("channel count {channels} -> {output_channels} not supported"),
            });
        }
        if output_rate != sample_rate {
            return Err(GraphError::Link {
                from: "tempo",
                to: "format",
                reason: format!("sample rate {sample_rate} -> {output_rate} not supported"),
            });
        }

        if *sink != StageOptions::Sink {
            return Err(unexpected_stage("format", sink, "sink"));
        }

        tracing::debug!(channels, sample_rate, ratio, %output_format, "tempo graph linked");
        Ok(Self {
            stretch: TimeStretch::new(channels as usize, sample_rate, ratio),
            output: SampleKind::for_format(output_format),
            flushed: false,
        })
    }

    pub fn channels(&self) -> usize {
        self.stretch.channels()
    }
}

fn invalid_stage(stage: &'static str, reason: String) -> GraphError {
    GraphError::InvalidStage { stage, reason }
}

fn unexpected_stage(from: &'static str, got: &StageOptions, expected: &str) -> GraphError {
    GraphError::Link {
        from,
        to: got.name(),
        reason: format!("expected {expected} stage"),
    }
}

impl FilterGraph for TempoGraph {
    fn submit(&mut self, block: Option<&AudioBuffer<'_>>) -> Result<(), GraphError> {
        if self.flushed {
            return Err(GraphError::Flushed);
        }
        match block {
            Some(block) => {
                if block.channels() != self.channels() {
                    return Err(GraphError::ChannelMismatch {
                        expected: self.channels(),
                        got: block.channels(),
                    });
                }
                self.stretch.push(block);
            }
            None => {
                self.stretch.finish();
                self.flushed = true;
            }
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Option<AudioBuffer<'static>>, GraphError> {
        let Some(planes) = self.stretch.pop(MAX_PULL_FRAMES) else {
            return Ok(None);
        };

        let frames = planes[0].len();
        let mut buffer = AudioBuffer::create(planes.len(), frames);
        for (ch, plane) in planes.iter().enumerate() {
            for (out, &sample) in buffer.channel_mut(ch).iter_mut().zip(plane) {
                *out = self.output.quantize(sample);
            }
        }
        Ok(Some(buffer))
    }
}
