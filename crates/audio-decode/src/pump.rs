//! Tempo pump: re-times a whole decoded buffer through a [`FilterGraph`].
//!
//! The source is submitted in fixed blocks (the last may be short), output is
//! drained after every submission and once more after end of stream. The
//! destination is sized up front to `ceil(frames / ratio)` plus headroom, and
//! every write is checked against that capacity.

use crate::buffer::AudioBuffer;
use crate::config::PumpConfig;
use crate::error::{ConfigError, GraphError, PumpError};
use crate::tempo::{FilterGraph, MAX_RATIO, MIN_RATIO, StageOptions, TempoGraph};

/// Outcome of one [`TempoPump::process`] run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PumpReport {
    pub source_frames: usize,
    pub output_frames: usize,
    pub capacity: usize,
    pub blocks: usize,
}

pub struct TempoPump {
    config: PumpConfig,
}

/// Read and write positions of one run.
struct Cursors {
    source: usize,
    dest: usize,
    capacity: usize,
}

impl TempoPump {
    /// Validate `config`. Nothing is allocated for a rejected configuration.
    pub fn new(config: PumpConfig) -> Result<Self, ConfigError> {
        if !(MIN_RATIO..=MAX_RATIO).contains(&config.ratio) {
            return Err(ConfigError::TempoRatio(config.ratio));
        }
        if config.block_frames == 0 {
            return Err(ConfigError::BlockFrames);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Destination frames reserved for a source of `frames`.
    pub fn capacity_for(&self, frames: usize) -> usize {
        (frames as f64 / self.config.ratio).ceil() as usize + self.config.headroom_frames
    }

    /// Re-time `buffer` in place through the standard tempo graph.
    ///
    /// On success `buffer` is replaced by the output; on failure it is untouched.
    pub fn process(
        &self,
        buffer: &mut AudioBuffer<'static>,
        sample_rate: u32,
    ) -> Result<PumpReport, PumpError> {
        let stages = StageOptions::tempo_chain(
            buffer.channels() as u16,
            sample_rate,
            self.config.ratio,
            self.config.output_format,
        );
        let mut graph = TempoGraph::build(&stages)?;
        self.run_with(&mut graph, buffer)
    }

    /// Pump `buffer` through an already-built `graph`.
    pub fn run_with(
        &self,
        graph: &mut dyn FilterGraph,
        buffer: &mut AudioBuffer<'static>,
    ) -> Result<PumpReport, PumpError> {
        let channels = buffer.channels();
        let frames = buffer.frames();
        let block_frames = self.config.block_frames;

        let mut cursors = Cursors {
            source: 0,
            dest: 0,
            capacity: self.capacity_for(frames),
        };
        let mut dest = AudioBuffer::create(channels, cursors.capacity);
        let mut block = AudioBuffer::create(channels, block_frames.min(frames));
        let mut blocks = 0;

        tracing::debug!(
            frames,
            channels,
            ratio = self.config.ratio,
            capacity = cursors.capacity,
            "tempo pump start"
        );

        while cursors.source < frames {
            let n = block_frames.min(frames - cursors.source);
            if n != block.frames() {
                block = AudioBuffer::create(channels, n);
            }
            buffer.copy_partial_frames_to(cursors.source, n, 0, &mut block);
            graph.submit(Some(&block))?;
            cursors.source += n;
            blocks += 1;
            drain(graph, &mut dest, &mut cursors)?;
        }

        graph.submit(None)?;
        drain(graph, &mut dest, &mut cursors)?;

        if cursors.dest == 0 {
            return Err(PumpError::EmptyOutput);
        }

        let mut output = AudioBuffer::create(channels, cursors.dest);
        dest.copy_partial_frames_to(0, cursors.dest, 0, &mut output);
        *buffer = output;

        tracing::info!(
            source_frames = frames,
            output_frames = cursors.dest,
            blocks,
            "tempo pump complete"
        );
        Ok(PumpReport {
            source_frames: frames,
            output_frames: cursors.dest,
            capacity: cursors.capacity,
            blocks,
        })
    }
}

fn drain(
    graph: &mut dyn FilterGraph,
    dest: &mut AudioBuffer<'static>,
    cursors: &mut Cursors,
) -> Result<(), PumpError> {
    while let Some(out) = graph.pull()? {
        if out.channels() != dest.channels() {
            return Err(GraphError::ChannelMismatch {
                expected: dest.channels(),
                got: out.channels(),
            }
            .into());
        }
        let needed = cursors.dest + out.frames();
        if needed > cursors.capacity {
            tracing::warn!(needed, capacity = cursors.capacity, "tempo output overflow");
            return Err(PumpError::Capacity {
                needed,
                capacity: cursors.capacity,
            });
        }
        out.copy_partial_frames_to(0, out.frames(), cursors.dest, dest);
        cursors.dest = needed;
    }
    Ok(())
}
