use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "pcm-decode", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Resampler input chunk size in frames
    #[arg(long, default_value_t = 1024, global = true)]
    pub chunk_frames: usize,

    /// Skip packets the codec rejects instead of stopping at the first one
    #[arg(long, global = true)]
    pub tolerate_errors: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print stream properties as JSON
    Probe {
        /// Path to audio file
        path: PathBuf,
    },

    /// Decode to raw little-endian interleaved PCM
    Decode {
        /// Path to audio file
        path: PathBuf,

        /// Output file for the raw samples
        #[arg(long, short)]
        out: PathBuf,

        /// Output sample format
        #[arg(long, value_enum, default_value_t = OutputFormat::F32)]
        format: OutputFormat,

        /// Output sample rate (defaults to the source rate)
        #[arg(long)]
        rate: Option<u32>,

        /// Output channel count (defaults to the source layout)
        #[arg(long)]
        channels: Option<u16>,

        /// Tempo ratio applied after decoding; 2.0 plays twice as fast
        #[arg(long)]
        tempo: Option<f64>,

        /// Frames per block submitted to the tempo graph
        #[arg(long, default_value_t = 1024)]
        block_frames: usize,

        /// Stop after this many packets
        #[arg(long)]
        max_packets: Option<usize>,

        /// Start position in seconds
        #[arg(long)]
        start: Option<f64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    F32,
    S16,
}
