//! `pcm-decode`: decode an audio file into raw interleaved PCM.
//!
//! ## Pipeline
//! 1. **Decode**: a [`DecodeSession`] demuxes and decodes the file via Symphonia.
//! 2. **Convert**: optional target rate and channel count (Rubato resampler).
//! 3. **Tempo**: optional re-timing through the tempo pump.
//! 4. **Write**: little-endian interleaved `f32` or `s16`.

mod cli;
mod output;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use audio_decode::{
    AudioBuffer, AudioProperties, DecodeConfig, DecodeSession, FileSource, PumpConfig,
    SampleFormat, TempoPump,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::OutputFormat;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_decode=info,audio_decode=info")
        }))
        .with_writer(std::io::stderr)
        .init();

    let config = DecodeConfig {
        tolerate_decode_errors: args.tolerate_errors,
        resample_chunk_frames: args.chunk_frames,
        ..DecodeConfig::default()
    };

    match &args.cmd {
        cli::Command::Probe { path } => {
            let session = open_session(path, config)?;
            let info = session
                .stream_info()
                .context("session closed before probing")?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        cli::Command::Decode {
            path,
            out,
            format,
            rate,
            channels,
            tempo,
            block_frames,
            max_packets,
            start,
        } => {
            let config = DecodeConfig {
                max_packets: *max_packets,
                ..config
            };
            let mut session = open_session(path, config)?;
            let source = session
                .source_properties()
                .context("session closed after open")?;
            tracing::info!(%source, "source");

            if rate.is_some() || channels.is_some() {
                let target = AudioProperties::new(
                    channels.unwrap_or(source.channels),
                    rate.unwrap_or(source.sample_rate),
                    SampleFormat::F32Planar,
                );
                session
                    .set_target_properties(target)
                    .with_context(|| format!("set target {target}"))?;
            }
            if let Some(seconds) = start {
                session
                    .seek((seconds * 1_000_000.0) as i64)
                    .with_context(|| format!("seek to {seconds}s"))?;
            }

            let mut parts = Vec::new();
            let summary = session.read(&mut parts, None)?;
            if let audio_decode::ReadStatus::Aborted(e) = &summary.status {
                tracing::warn!(
                    error = %e,
                    frames = summary.frames,
                    "decode stopped early; writing partial output"
                );
            }
            let Some(mut buffer) = AudioBuffer::concat(&parts) else {
                bail!("no audio decoded from {path:?}");
            };

            let output_rate = rate.unwrap_or(source.sample_rate);
            if let Some(ratio) = tempo {
                let pump = TempoPump::new(PumpConfig {
                    ratio: *ratio,
                    block_frames: *block_frames,
                    output_format: match format {
                        OutputFormat::F32 => SampleFormat::F32,
                        OutputFormat::S16 => SampleFormat::S16,
                    },
                    ..PumpConfig::default()
                })?;
                let report = pump
                    .process(&mut buffer, output_rate)
                    .with_context(|| format!("apply tempo {ratio}"))?;
                tracing::info!(
                    source_frames = report.source_frames,
                    output_frames = report.output_frames,
                    "tempo applied"
                );
            }

            write_output(out, &buffer, *format)?;
            tracing::info!(
                path = ?out,
                frames = buffer.frames(),
                channels = buffer.channels(),
                rate = output_rate,
                "wrote raw pcm"
            );
        }
    }

    Ok(())
}

fn open_session(path: &Path, config: DecodeConfig) -> Result<DecodeSession> {
    let source = FileSource::open(path).with_context(|| format!("open {path:?}"))?;
    let extension = path.extension().and_then(|e| e.to_str());

    let mut session = DecodeSession::new(config);
    session
        .open(source, extension)
        .with_context(|| format!("decode {path:?}"))?;
    Ok(session)
}

fn write_output(path: &Path, buffer: &AudioBuffer<'_>, format: OutputFormat) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {path:?}"))?;
    let mut writer = BufWriter::new(file);
    output::write_raw(&mut writer, buffer, format).with_context(|| format!("write {path:?}"))?;
    writer.flush().with_context(|| format!("flush {path:?}"))?;
    Ok(())
}
