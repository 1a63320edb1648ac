//! Demux/decode session.
//!
//! A [`DecodeSession`] turns a [`ByteSource`] into a sequence of owned
//! [`AudioBuffer`]s:
//! - probe the container and select the first decodable track
//! - prime the decoder with the first packet to learn its real output layout
//! - on each `read()`, drive every packet through the send/receive cycle and
//!   emit one buffer per decoded frame
//!
//! Channel count, sample rate and sample format are fixed at open. A frame that
//! disagrees aborts the read, keeps what was already emitted and closes the session.

use std::collections::VecDeque;
use std::io;

use audio_decode_types::{AudioProperties, StreamInfo};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::buffer::{AudioBuffer, MAX_CHANNELS};
use crate::codec::{
    CycleState, DecodedFrame, FrameDecoder, SymphoniaDecoder, codec_name_from_params,
    expected_sample_format, run_packet_cycle,
};
use crate::config::DecodeConfig;
use crate::duration::{estimate_frames, raw_duration_us, trimmed_frame_count};
use crate::error::{CodecError, ConfigError, DecodeError, Error, OpenError};
use crate::resample::{StreamResampler, map_channels};
use crate::sample::Float32NoClip;
use crate::source::{ByteSource, SourceStream};

/// Packets decoded at open while looking for the first frame.
const PRIME_PACKET_LIMIT: usize = 8;

/// How a `read()` ended.
#[derive(Debug)]
pub enum ReadStatus {
    /// The packet limit was reached; more data may follow.
    Completed,
    /// The source is exhausted.
    EndOfStream,
    /// A data error stopped the read. Buffers emitted before it are kept and the
    /// session is closed.
    Aborted(DecodeError),
}

/// Outcome of one `read()`.
#[derive(Debug)]
pub struct ReadSummary {
    /// Sample-frames appended to the output, summed over every emitted buffer.
    pub frames: usize,
    /// Packets demuxed by this call. The first read after open or seek also
    /// counts the packets decoded while priming.
    pub packets: usize,
    pub status: ReadStatus,
}

impl ReadSummary {
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, ReadStatus::Aborted(_))
    }
}

/// Resample / remap stage applied to emitted buffers.
struct Target {
    properties: AudioProperties,
    resampler: Option<StreamResampler>,
}

impl Target {
    fn convert(
        &mut self,
        buffer: AudioBuffer<'static>,
    ) -> Result<Option<AudioBuffer<'static>>, DecodeError> {
        let buffer = match self.resampler.as_mut() {
            Some(resampler) => {
                let channels = buffer.channels();
                match buffer_from_interleaved(&resampler.process(&buffer)?, channels) {
                    Some(resampled) => resampled,
                    None => return Ok(None),
                }
            }
            None => buffer,
        };
        Ok(Some(self.remap(buffer)))
    }

    fn finish(&mut self, channels: usize) -> Result<Option<AudioBuffer<'static>>, DecodeError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };
        Ok(buffer_from_interleaved(&resampler.flush()?, channels).map(|b| self.remap(b)))
    }

    fn remap(&self, buffer: AudioBuffer<'static>) -> AudioBuffer<'static> {
        let channels = self.properties.channels as usize;
        if buffer.channels() == channels {
            buffer
        } else {
            map_channels(&buffer, channels)
        }
    }
}

fn buffer_from_interleaved(samples: &[f32], channels: usize) -> Option<AudioBuffer<'static>> {
    let frames = samples.len() / channels;
    if frames == 0 {
        return None;
    }
    let mut buffer = AudioBuffer::create(channels, frames);
    buffer.copy_from_interleaved::<Float32NoClip>(samples, frames);
    Some(buffer)
}

/// Next packet of `track_id`, or `None` at end of data.
fn next_track_packet(
    format: &mut dyn FormatReader,
    track_id: u32,
) -> Result<Option<Packet>, DecodeError> {
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() != track_id => {
                tracing::trace!(track_id = packet.track_id(), "skipping packet from other track");
            }
            Ok(packet) => return Ok(Some(packet)),
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None);
            }
            Err(e) => return Err(DecodeError::Demux(e)),
        }
    }
}

/// State held while a session is open. Dropping it releases the reader,
/// decoder and resampler.
struct OpenSession {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn FrameDecoder>,
    track_id: u32,
    codec_params: CodecParameters,
    source: AudioProperties,
    primed: Primed,
    target: Option<Target>,
    exhausted: bool,
}

impl OpenSession {
    fn open<S, F>(
        source: S,
        extension: Option<&str>,
        make_decoder: F,
        tolerate_decode_errors: bool,
    ) -> Result<Self, OpenError>
    where
        S: ByteSource + Send + Sync + 'static,
        F: FnOnce(&CodecParameters) -> Result<Box<dyn FrameDecoder>, CodecError>,
    {
        let mss = MediaSourceStream::new(Box::new(SourceStream::new(source)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(OpenError::Probe)?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(OpenError::NoAudioTrack)?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let channels = codec_params
            .channels
            .ok_or(OpenError::IncompleteParameters("channels"))?
            .count();
        check_channel_count(channels)?;
        let sample_rate = codec_params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or(OpenError::IncompleteParameters("sample rate"))?;

        let mut decoder = make_decoder(&codec_params).map_err(OpenError::Decoder)?;

        let mut primed = prime(
            format.as_mut(),
            decoder.as_mut(),
            track_id,
            tolerate_decode_errors,
        );
        let exhausted = std::mem::take(&mut primed.exhausted);
        let source = match primed.frames.front() {
            Some(first) => {
                check_channel_count(first.channels as usize)?;
                first.properties()
            }
            None => AudioProperties::new(
                channels as u16,
                sample_rate,
                expected_sample_format(&codec_params),
            ),
        };

        Ok(Self {
            format,
            decoder,
            track_id,
            codec_params,
            source,
            primed,
            target: None,
            exhausted,
        })
    }

    fn read_into(
        &mut self,
        out: &mut Vec<AudioBuffer<'static>>,
        max_packets: Option<usize>,
        config: &DecodeConfig,
        summary: &mut ReadSummary,
    ) -> Result<ReadStatus, DecodeError> {
        let trim = config
            .duration_corrections
            .get(self.codec_params.codec)
            .is_some_and(|c| c.trim_to_packet_duration);
        let source = self.source;

        if !self.primed.is_empty() {
            if max_packets.is_some_and(|limit| summary.packets >= limit) {
                return Ok(ReadStatus::Completed);
            }
            summary.packets += std::mem::take(&mut self.primed.packets);
            while let Some(frame) = self.primed.frames.pop_front() {
                emit(frame, source, trim, self.target.as_mut(), out, &mut summary.frames)?;
            }
            if let Some(e) = self.primed.error.take() {
                return Err(e);
            }
        }

        while !self.exhausted {
            if max_packets.is_some_and(|limit| summary.packets >= limit) {
                return Ok(ReadStatus::Completed);
            }

            let Some(packet) = next_track_packet(self.format.as_mut(), self.track_id)? else {
                self.exhausted = true;
                break;
            };
            summary.packets += 1;

            let target = &mut self.target;
            let frames = &mut summary.frames;
            let cycle = run_packet_cycle(self.decoder.as_mut(), &packet, |frame| {
                emit(frame, source, trim, target.as_mut(), out, frames)
            });

            match cycle {
                Ok(CycleState::Eof) => self.exhausted = true,
                Ok(_) => {}
                Err(DecodeError::Codec(e)) if config.tolerate_decode_errors => {
                    tracing::warn!(ts = packet.ts(), error = %e, "skipping undecodable packet");
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(target) = self.target.as_mut() {
            if let Some(tail) = target.finish(source.channels as usize)? {
                summary.frames += tail.frames();
                out.push(tail);
            }
        }
        Ok(ReadStatus::EndOfStream)
    }
}

fn check_channel_count(channels: usize) -> Result<(), OpenError> {
    if channels == 0 || channels > MAX_CHANNELS {
        return Err(OpenError::UnsupportedChannels(channels));
    }
    Ok(())
}

/// Work done at open that the first `read()` still has to report.
#[derive(Default)]
struct Primed {
    frames: VecDeque<DecodedFrame>,
    packets: usize,
    exhausted: bool,
    /// Data error that stopped priming; surfaced as the first read's abort.
    error: Option<DecodeError>,
}

impl Primed {
    fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.packets == 0 && self.error.is_none()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Decode up to [`PRIME_PACKET_LIMIT`] packets until the first frame appears.
///
/// Data errors never fail the open. Undecodable packets are skipped when
/// tolerated; any other error ends priming and is kept for the first read.
fn prime(
    format: &mut dyn FormatReader,
    decoder: &mut dyn FrameDecoder,
    track_id: u32,
    tolerate_decode_errors: bool,
) -> Primed {
    let mut primed = Primed::default();
    for _ in 0..PRIME_PACKET_LIMIT {
        let packet = match next_track_packet(format, track_id) {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                primed.exhausted = true;
                break;
            }
            Err(e) => {
                primed.error = Some(e);
                break;
            }
        };
        primed.packets += 1;

        let frames = &mut primed.frames;
        let cycle = run_packet_cycle(decoder, &packet, |frame| {
            frames.push_back(frame);
            Ok(())
        });
        match cycle {
            Ok(CycleState::Eof) => {
                primed.exhausted = true;
                break;
            }
            Ok(_) => {}
            Err(DecodeError::Codec(e)) if tolerate_decode_errors => {
                tracing::warn!(ts = packet.ts(), error = %e, "skipping undecodable packet at open");
            }
            Err(e) => {
                tracing::debug!(error = %e, "priming stopped by data error");
                primed.error = Some(e);
                break;
            }
        }
        if !primed.frames.is_empty() {
            break;
        }
    }
    primed
}

/// Validate one frame and append it (converted) to `out`.
fn emit(
    mut frame: DecodedFrame,
    source: AudioProperties,
    trim: bool,
    target: Option<&mut Target>,
    out: &mut Vec<AudioBuffer<'static>>,
    total_frames: &mut usize,
) -> Result<(), DecodeError> {
    let actual = frame.properties();
    if actual != source {
        return Err(DecodeError::ConfigChange {
            expected: source,
            actual,
        });
    }

    if trim {
        let frames = trimmed_frame_count(frame.frames, frame.packet_duration);
        if frames < frame.frames {
            tracing::debug!(from = frame.frames, to = frames, "shrinking frame to packet duration");
            frame.truncate(frames);
        }
    }
    if frame.frames == 0 {
        return Ok(());
    }

    let buffer = frame.to_buffer();
    let buffer = match target {
        Some(target) => match target.convert(buffer)? {
            Some(converted) => converted,
            None => return Ok(()),
        },
        None => buffer,
    };

    *total_frames += buffer.frames();
    out.push(buffer);
    Ok(())
}

/// Decode session over one byte source.
///
/// Created closed; [`DecodeSession::open`] makes it usable. Any data error during
/// [`DecodeSession::read`] closes it again.
pub struct DecodeSession {
    config: DecodeConfig,
    state: Option<OpenSession>,
}

impl Default for DecodeSession {
    fn default() -> Self {
        Self::new(DecodeConfig::default())
    }
}

impl DecodeSession {
    pub fn new(config: DecodeConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Probe `source` and open a Symphonia decoder for its first audio track.
    ///
    /// `extension` is a container hint such as `"wav"`. On failure nothing is retained.
    pub fn open<S>(&mut self, source: S, extension: Option<&str>) -> Result<(), OpenError>
    where
        S: ByteSource + Send + Sync + 'static,
    {
        self.open_with(source, extension, |params| {
            let decoder = SymphoniaDecoder::new(params, &DecoderOptions::default())?;
            Ok(Box::new(decoder) as Box<dyn FrameDecoder>)
        })
    }

    /// Like [`DecodeSession::open`] with a caller-supplied decoder.
    pub fn open_with<S, F>(
        &mut self,
        source: S,
        extension: Option<&str>,
        make_decoder: F,
    ) -> Result<(), OpenError>
    where
        S: ByteSource + Send + Sync + 'static,
        F: FnOnce(&CodecParameters) -> Result<Box<dyn FrameDecoder>, CodecError>,
    {
        if self.state.is_some() {
            return Err(OpenError::AlreadyOpen);
        }

        let tolerate = self.config.tolerate_decode_errors;
        let state = match OpenSession::open(source, extension, make_decoder, tolerate) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open decode session");
                return Err(e);
            }
        };

        let source = state.source;
        self.state = Some(state);
        tracing::info!(
            codec = ?self.stream_info().and_then(|info| info.codec),
            %source,
            duration_us = ?self.duration_us(),
            "decode session opened"
        );
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Release the reader, decoder and resampler. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.state.take().is_some() {
            tracing::debug!("decode session closed");
        }
    }

    /// Properties captured at open.
    pub fn source_properties(&self) -> Option<AudioProperties> {
        self.state.as_ref().map(|s| s.source)
    }

    pub fn target_properties(&self) -> Option<AudioProperties> {
        self.state
            .as_ref()
            .and_then(|s| s.target.as_ref())
            .map(|t| t.properties)
    }

    /// Whether the container reports a duration.
    pub fn has_known_duration(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|s| raw_duration_us(&s.codec_params).is_some())
    }

    /// Estimated duration in microseconds, corrected per codec.
    pub fn duration_us(&self) -> Option<i64> {
        let state = self.state.as_ref()?;
        let raw = raw_duration_us(&state.codec_params)?;
        Some(self.config.duration_corrections.corrected_duration_us(
            state.codec_params.codec,
            raw,
            state.source.sample_rate,
        ))
    }

    /// Estimated frame count. `read()` reports the authoritative one.
    pub fn number_of_frames(&self) -> Option<u64> {
        let rate = self.state.as_ref()?.source.sample_rate;
        Some(estimate_frames(self.duration_us()?, rate))
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        let state = self.state.as_ref()?;
        let params = &state.codec_params;
        Some(StreamInfo {
            codec: codec_name_from_params(params),
            source: state.source,
            target: state.target.as_ref().map(|t| t.properties),
            bit_depth: params
                .bits_per_sample
                .or(params.bits_per_coded_sample)
                .and_then(|v| u16::try_from(v).ok()),
            duration_us: self.duration_us(),
            estimated_frames: self.number_of_frames(),
        })
    }

    /// Request that emitted buffers be converted to `target`.
    ///
    /// The sample rate is converted with a sinc resampler and the channel layout
    /// remapped. Only float targets are accepted since buffers are always `f32`.
    pub fn set_target_properties(&mut self, target: AudioProperties) -> Result<(), Error> {
        let chunk_frames = self.config.resample_chunk_frames;
        let state = self.state.as_mut().ok_or(DecodeError::NotOpen)?;

        if !target.sample_format.is_float() {
            return Err(ConfigError::TargetFormat(target.sample_format).into());
        }
        if target.channels == 0 || target.channels as usize > MAX_CHANNELS {
            return Err(ConfigError::Channels(target.channels).into());
        }
        if target.sample_rate == 0 {
            return Err(ConfigError::SampleRate(target.sample_rate).into());
        }

        let source = state.source;
        let resampler = if target.sample_rate != source.sample_rate {
            Some(StreamResampler::new(
                source.sample_rate,
                target.sample_rate,
                source.channels as usize,
                chunk_frames,
            )?)
        } else {
            None
        };

        tracing::info!(%source, %target, resample = resampler.is_some(), "target properties set");
        state.target = Some(Target {
            properties: target,
            resampler,
        });
        Ok(())
    }

    /// Decode up to `max_packets` packets (or the configured default) into `out`.
    ///
    /// Returns `Err` only when the session is not open. Data errors are reported
    /// through [`ReadStatus::Aborted`] with the frames emitted before them.
    pub fn read(
        &mut self,
        out: &mut Vec<AudioBuffer<'static>>,
        max_packets: Option<usize>,
    ) -> Result<ReadSummary, DecodeError> {
        let limit = max_packets.or(self.config.max_packets);
        let state = self.state.as_mut().ok_or(DecodeError::NotOpen)?;

        let mut summary = ReadSummary {
            frames: 0,
            packets: 0,
            status: ReadStatus::Completed,
        };

        match state.read_into(out, limit, &self.config, &mut summary) {
            Ok(status) => {
                if matches!(status, ReadStatus::EndOfStream) {
                    tracing::info!(
                        frames = summary.frames,
                        packets = summary.packets,
                        "end of stream"
                    );
                } else {
                    tracing::debug!(
                        frames = summary.frames,
                        packets = summary.packets,
                        "read complete"
                    );
                }
                summary.status = status;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    frames = summary.frames,
                    packets = summary.packets,
                    "read aborted; closing session"
                );
                summary.status = ReadStatus::Aborted(e);
                self.close();
            }
        }
        Ok(summary)
    }

    /// Demux the next packet of the selected track without decoding it.
    pub fn read_packet(&mut self) -> Result<Option<Packet>, DecodeError> {
        let state = self.state.as_mut().ok_or(DecodeError::NotOpen)?;
        next_track_packet(state.format.as_mut(), state.track_id)
    }

    /// Seek to `time_us` (clamped at zero). Lands on the containing packet.
    pub fn seek(&mut self, time_us: i64) -> Result<(), DecodeError> {
        let state = self.state.as_mut().ok_or(DecodeError::NotOpen)?;

        let time_us = time_us.max(0) as u64;
        let time = Time::new(time_us / 1_000_000, (time_us % 1_000_000) as f64 / 1_000_000.0);
        let seeked = state
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(state.track_id),
                },
            )
            .map_err(DecodeError::Seek)?;

        state.decoder.reset();
        state.primed.clear();
        state.exhausted = false;
        if let Some(resampler) = state.target.as_mut().and_then(|t| t.resampler.as_mut()) {
            resampler.reset();
        }
        tracing::debug!(time_us, actual_ts = seeked.actual_ts, "seeked");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::tests::{ScriptedDecoder, planar_frame};
    use crate::codec::{FrameSamples, ReceiveOutcome, SendOutcome};
    use crate::duration::DurationCorrection;
    use crate::source::MemorySource;
    use approx::assert_abs_diff_eq;
    use audio_decode_types::SampleFormat;
    use std::io::Cursor;
    use symphonia::core::codecs::CODEC_TYPE_PCM_S16LE;
    use symphonia::core::formats::{Cue, SeekedTo, Track};
    use symphonia::core::meta::{Metadata, MetadataLog};

    pub(crate) const RATE: u32 = 44_100;
    const LEFT: i16 = 16_384;
    const RIGHT: i16 = -16_384;

    pub(crate) fn wav_bytes(channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut bytes = Vec::new();
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for _ in 0..frames {
            for ch in 0..channels {
                writer
                    .write_sample(if ch % 2 == 0 { LEFT } else { RIGHT })
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
        bytes
    }

    fn open_wav(frames: usize, config: DecodeConfig) -> DecodeSession {
        let mut session = DecodeSession::new(config);
        session
            .open(MemorySource::new(wav_bytes(2, frames)), Some("wav"))
            .unwrap();
        session
    }

    fn read_all(session: &mut DecodeSession) -> (Vec<AudioBuffer<'static>>, ReadSummary) {
        let mut out = Vec::new();
        let summary = session.read(&mut out, None).unwrap();
        (out, summary)
    }

    fn scripted_session(decoder: ScriptedDecoder, config: DecodeConfig) -> DecodeSession {
        let mut session = DecodeSession::new(config);
        session
            .open_with(
                MemorySource::new(wav_bytes(2, RATE as usize)),
                Some("wav"),
                move |_| Ok(Box::new(decoder) as Box<dyn FrameDecoder>),
            )
            .unwrap();
        session
    }

    /// Demuxer over a fixed list of `(track_id, ts)` packets.
    struct InterleavedTracks {
        packets: VecDeque<Packet>,
        metadata: MetadataLog,
    }

    impl InterleavedTracks {
        fn new(packets: &[(u32, u64)]) -> Self {
            Self {
                packets: packets
                    .iter()
                    .map(|&(track_id, ts)| Packet::new_from_slice(track_id, ts, 1, &[0u8; 4]))
                    .collect(),
                metadata: MetadataLog::default(),
            }
        }
    }

    impl FormatReader for InterleavedTracks {
        fn try_new(
            _source: MediaSourceStream,
            _options: &FormatOptions,
        ) -> symphonia::core::errors::Result<Self> {
            Ok(Self::new(&[]))
        }

        fn cues(&self) -> &[Cue] {
            &[]
        }

        fn metadata(&mut self) -> Metadata<'_> {
            self.metadata.metadata()
        }

        fn seek(
            &mut self,
            _mode: SeekMode,
            _to: SeekTo,
        ) -> symphonia::core::errors::Result<SeekedTo> {
            Err(SymphoniaError::Unsupported("seek"))
        }

        fn tracks(&self) -> &[Track] {
            &[]
        }

        fn next_packet(&mut self) -> symphonia::core::errors::Result<Packet> {
            self.packets.pop_front().ok_or_else(|| {
                SymphoniaError::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end"))
            })
        }

        fn into_inner(self: Box<Self>) -> MediaSourceStream {
            MediaSourceStream::new(Box::new(Cursor::new(Vec::<u8>::new())), Default::default())
        }
    }

    #[test]
    fn next_track_packet_skips_other_tracks() {
        let mut reader =
            InterleavedTracks::new(&[(2, 0), (1, 0), (2, 1), (3, 0), (1, 1), (2, 2), (1, 2)]);
        let mut seen = Vec::new();
        while let Some(packet) = next_track_packet(&mut reader, 1).unwrap() {
            assert_eq!(packet.track_id(), 1);
            seen.push(packet.ts());
        }
        assert_eq!(seen, vec![0, 1, 2]);
        assert!(reader.packets.is_empty());

        let mut other_only = InterleavedTracks::new(&[(2, 0), (3, 0)]);
        assert!(next_track_packet(&mut other_only, 1).unwrap().is_none());
    }

    #[test]
    fn open_reports_stream_properties() {
        let session = open_wav(4_410, DecodeConfig::default());
        assert!(session.is_open());
        assert_eq!(
            session.source_properties(),
            Some(AudioProperties::new(2, RATE, SampleFormat::S16))
        );
        assert!(session.has_known_duration());
        assert_eq!(session.duration_us(), Some(100_001));
        assert_eq!(session.number_of_frames(), Some(4_411));

        let info = session.stream_info().unwrap();
        assert_eq!(info.codec.as_deref(), Some("PCM_S16"));
        assert_eq!(info.bit_depth, Some(16));
        assert!(info.target.is_none());
    }

    #[test]
    fn read_emits_every_frame() {
        let mut session = open_wav(4_410, DecodeConfig::default());
        let (out, summary) = read_all(&mut session);

        assert!(matches!(summary.status, ReadStatus::EndOfStream));
        assert_eq!(summary.frames, 4_410);
        assert_eq!(out.iter().map(|b| b.frames()).sum::<usize>(), 4_410);
        for buffer in &out {
            assert_eq!(buffer.channels(), 2);
            assert_abs_diff_eq!(buffer.channel(0)[0], 16_384.0 / 32_767.0, epsilon = 1e-6);
            assert_abs_diff_eq!(buffer.channel(1)[0], -0.5, epsilon = 1e-6);
        }
        assert!(session.is_open());
    }

    #[test]
    fn read_respects_packet_limit() {
        let mut session = open_wav(RATE as usize, DecodeConfig::default());
        let mut out = Vec::new();

        let none = session.read(&mut out, Some(0)).unwrap();
        assert!(matches!(none.status, ReadStatus::Completed));
        assert_eq!(none.packets, 0);
        assert_eq!(none.frames, 0);
        assert!(out.is_empty());

        let first = session.read(&mut out, Some(1)).unwrap();
        assert!(matches!(first.status, ReadStatus::Completed));
        assert_eq!(first.packets, 1);
        assert!(first.frames > 0 && first.frames < RATE as usize);
        assert_eq!(out.iter().map(|b| b.frames()).sum::<usize>(), first.frames);

        let rest = session.read(&mut out, None).unwrap();
        assert!(matches!(rest.status, ReadStatus::EndOfStream));
        assert_eq!(first.frames + rest.frames, RATE as usize);
    }

    #[test]
    fn read_after_end_of_stream_is_empty() {
        let mut session = open_wav(1_000, DecodeConfig::default());
        read_all(&mut session);
        let (out, summary) = read_all(&mut session);
        assert!(out.is_empty());
        assert_eq!(summary.frames, 0);
        assert!(matches!(summary.status, ReadStatus::EndOfStream));
    }

    #[test]
    fn open_fails_cleanly_on_empty_or_garbage_source() {
        let mut session = DecodeSession::default();
        for _ in 0..3 {
            assert!(session.open(MemorySource::new(Vec::new()), None).is_err());
            assert!(!session.is_open());
            assert!(
                session
                    .open(MemorySource::new(vec![0x5a; 512]), None)
                    .is_err()
            );
            assert!(!session.is_open());
            session.close();
        }
        assert!(matches!(
            session.read(&mut Vec::new(), None),
            Err(DecodeError::NotOpen)
        ));
    }

    #[test]
    fn open_twice_is_rejected() {
        let mut session = open_wav(100, DecodeConfig::default());
        let again = session.open(MemorySource::new(wav_bytes(2, 100)), Some("wav"));
        assert!(matches!(again, Err(OpenError::AlreadyOpen)));
        session.close();
        session.close();
        assert!(
            session
                .open(MemorySource::new(wav_bytes(2, 100)), Some("wav"))
                .is_ok()
        );
    }

    /// Two matching frames followed by `third`; the read must stop at `third`.
    fn assert_midstream_change_aborts(third: DecodedFrame) {
        let mut decoder = ScriptedDecoder::new();
        for frame in [
            planar_frame(2, RATE, 10, 0.1),
            planar_frame(2, RATE, 10, 0.2),
            third,
        ] {
            decoder.receives.push_back(Ok(ReceiveOutcome::Frame(frame)));
            decoder.receives.push_back(Ok(ReceiveOutcome::NeedsInput));
        }
        let mut session = scripted_session(decoder, DecodeConfig::default());
        assert_eq!(
            session.source_properties(),
            Some(AudioProperties::new(2, RATE, SampleFormat::F32Planar))
        );

        let (out, summary) = read_all(&mut session);
        assert_eq!(out.len(), 2);
        assert_eq!(summary.frames, 20);
        assert!(matches!(
            summary.status,
            ReadStatus::Aborted(DecodeError::ConfigChange { .. })
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn midstream_channel_change_keeps_partial_results_and_closes() {
        assert_midstream_change_aborts(planar_frame(1, RATE, 10, 0.3));
    }

    #[test]
    fn midstream_rate_change_keeps_partial_results_and_closes() {
        assert_midstream_change_aborts(planar_frame(2, 48_000, 10, 0.3));
    }

    #[test]
    fn midstream_format_change_keeps_partial_results_and_closes() {
        assert_midstream_change_aborts(DecodedFrame {
            channels: 2,
            sample_rate: RATE,
            frames: 10,
            packet_duration: None,
            samples: FrameSamples::F32(vec![0.3; 20]),
        });
    }

    #[test]
    fn decode_errors_abort_unless_tolerated() {
        let script = || {
            let mut decoder = ScriptedDecoder::new();
            decoder.sends.push_back(Ok(SendOutcome::Accepted));
            decoder
                .sends
                .push_back(Err(CodecError::Other("bad packet".into())));
            decoder
                .receives
                .push_back(Ok(ReceiveOutcome::Frame(planar_frame(2, RATE, 8, 0.0))));
            decoder.receives.push_back(Ok(ReceiveOutcome::NeedsInput));
            decoder
                .receives
                .push_back(Ok(ReceiveOutcome::Frame(planar_frame(2, RATE, 8, 0.0))));
            decoder.receives.push_back(Ok(ReceiveOutcome::EndOfStream));
            decoder
        };

        let mut strict = scripted_session(script(), DecodeConfig::default());
        let (out, summary) = read_all(&mut strict);
        assert_eq!(out.len(), 1);
        assert!(summary.is_aborted());
        assert!(!strict.is_open());

        let tolerant_config = DecodeConfig {
            tolerate_decode_errors: true,
            ..DecodeConfig::default()
        };
        let mut tolerant = scripted_session(script(), tolerant_config);
        let (out, summary) = read_all(&mut tolerant);
        assert_eq!(out.len(), 2);
        assert_eq!(summary.frames, 16);
        assert!(matches!(summary.status, ReadStatus::EndOfStream));
        assert!(tolerant.is_open());
    }

    #[test]
    fn undecodable_first_packet_is_skipped_when_tolerated() {
        let mut decoder = ScriptedDecoder::new();
        decoder
            .sends
            .push_back(Err(CodecError::Other("corrupt first packet".into())));
        decoder
            .receives
            .push_back(Ok(ReceiveOutcome::Frame(planar_frame(2, RATE, 8, 0.25))));
        let config = DecodeConfig {
            tolerate_decode_errors: true,
            ..DecodeConfig::default()
        };
        let mut session = scripted_session(decoder, config);
        assert_eq!(
            session.source_properties(),
            Some(AudioProperties::new(2, RATE, SampleFormat::F32Planar))
        );

        let mut out = Vec::new();
        let first = session.read(&mut out, Some(1)).unwrap();
        assert_eq!(first.packets, 2);
        assert_eq!(first.frames, 8);
        assert_eq!(out.len(), 1);
        assert_abs_diff_eq!(out[0].channel(1)[7], 0.25);

        let rest = session.read(&mut out, None).unwrap();
        assert!(matches!(rest.status, ReadStatus::EndOfStream));
        assert_eq!(rest.frames, 0);
        assert!(session.is_open());
    }

    #[test]
    fn undecodable_first_packet_aborts_first_read_when_strict() {
        let mut decoder = ScriptedDecoder::new();
        decoder
            .sends
            .push_back(Err(CodecError::Other("corrupt first packet".into())));
        let mut session = scripted_session(decoder, DecodeConfig::default());
        assert!(session.is_open());
        let source = session.source_properties().unwrap();
        assert_eq!((source.channels, source.sample_rate), (2, RATE));

        let mut out = Vec::new();
        assert!(matches!(
            session.read(&mut out, Some(0)).unwrap().status,
            ReadStatus::Completed
        ));
        let summary = session.read(&mut out, None).unwrap();
        assert!(out.is_empty());
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.packets, 1);
        assert!(matches!(
            summary.status,
            ReadStatus::Aborted(DecodeError::Codec(CodecError::Other(_)))
        ));
        assert!(!session.is_open());
    }

    #[test]
    fn streaming_source_decodes_without_known_length() {
        let mut session = DecodeSession::default();
        session
            .open(MemorySource::streaming(wav_bytes(2, 4_410)), Some("wav"))
            .unwrap();
        let (out, summary) = read_all(&mut session);
        assert!(matches!(summary.status, ReadStatus::EndOfStream));
        assert_eq!(summary.frames, 4_410);
        assert!(out.iter().all(|b| b.channels() == 2));
    }

    #[test]
    fn correction_table_trims_frames_to_packet_duration() {
        let mut long = planar_frame(2, RATE, 10, 0.5);
        long.packet_duration = Some(4);
        let mut decoder = ScriptedDecoder::new();
        decoder.receives.push_back(Ok(ReceiveOutcome::Frame(long)));
        decoder.receives.push_back(Ok(ReceiveOutcome::EndOfStream));

        let mut config = DecodeConfig::default();
        config.duration_corrections.insert(
            CODEC_TYPE_PCM_S16LE,
            DurationCorrection {
                priming_frames: 0,
                remainder_frames: 0,
                trim_to_packet_duration: true,
            },
        );
        let mut session = scripted_session(decoder, config);
        let (out, summary) = read_all(&mut session);
        assert_eq!(summary.frames, 4);
        assert_eq!(out[0].frames(), 4);
    }

    #[test]
    fn target_properties_resample_and_downmix() {
        let mut session = open_wav(4_410, DecodeConfig::default());
        let target = AudioProperties::new(1, 48_000, SampleFormat::F32);
        session.set_target_properties(target).unwrap();
        assert_eq!(session.target_properties(), Some(target));
        assert_eq!(session.stream_info().unwrap().target, Some(target));

        let (out, summary) = read_all(&mut session);
        assert!(matches!(summary.status, ReadStatus::EndOfStream));
        assert!(out.iter().all(|b| b.channels() == 1));
        assert!(summary.frames >= 4_700, "{}", summary.frames);
    }

    #[test]
    fn target_properties_reject_integer_format() {
        let mut session = open_wav(100, DecodeConfig::default());
        let err = session
            .set_target_properties(AudioProperties::new(2, RATE, SampleFormat::S16))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::TargetFormat(SampleFormat::S16))
        ));

        let mut closed = DecodeSession::default();
        assert!(matches!(
            closed.set_target_properties(AudioProperties::new(2, RATE, SampleFormat::F32)),
            Err(Error::Decode(DecodeError::NotOpen))
        ));
    }

    #[test]
    fn seek_skips_earlier_audio() {
        let mut session = open_wav(4_410, DecodeConfig::default());
        session.seek(50_000).unwrap();
        let (_, summary) = read_all(&mut session);
        assert!(matches!(summary.status, ReadStatus::EndOfStream));
        assert!(summary.frames > 0 && summary.frames < 4_410, "{}", summary.frames);
    }

    #[test]
    fn read_packet_demuxes_without_decoding() {
        let mut session = open_wav(RATE as usize, DecodeConfig::default());
        let packet = session.read_packet().unwrap().unwrap();
        assert!(!packet.data.is_empty());

        let mut closed = DecodeSession::default();
        assert!(matches!(closed.read_packet(), Err(DecodeError::NotOpen)));
    }
}
