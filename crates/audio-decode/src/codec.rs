//! Decoder boundary.
//!
//! The session drives decoders through a send/receive protocol: submit a packet,
//! then drain frames until the decoder asks for more input. [`SymphoniaDecoder`]
//! adapts Symphonia's one-call decode to that protocol; tests substitute scripted
//! decoders.

use audio_decode_types::{AudioProperties, SampleFormat};
use symphonia::core::audio::{AudioBufferRef, SampleBuffer, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::conv::ConvertibleSample;
use symphonia::core::formats::Packet;
use symphonia::core::sample::{Sample, SampleFormat as SymphoniaSampleFormat};
use symphonia::core::units::TimeBase;

use crate::buffer::AudioBuffer;
use crate::error::{CodecError, DecodeError};
use crate::sample::{Float32, SignedInt16, SignedInt32, UnsignedInt8};

/// Result of submitting a packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The decoder took the packet.
    Accepted,
    /// The decoder is full; drain frames and submit the same packet again.
    Again,
}

/// Result of asking for a frame.
#[derive(Debug)]
pub enum ReceiveOutcome {
    Frame(DecodedFrame),
    /// Nothing buffered; submit another packet.
    NeedsInput,
    /// The decoder has been fully drained.
    EndOfStream,
}

/// Packet-in / frame-out decoder.
pub trait FrameDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<SendOutcome, CodecError>;

    fn receive_frame(&mut self) -> Result<ReceiveOutcome, CodecError>;

    /// Drop any buffered state, e.g. after a seek.
    fn reset(&mut self);
}

/// Decoded samples in the decoder's native layout.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameSamples {
    U8(Vec<u8>),
    S16(Vec<i16>),
    S32(Vec<i32>),
    /// Interleaved float.
    F32(Vec<f32>),
    /// One vector per channel.
    F32Planar(Vec<Vec<f32>>),
}

impl FrameSamples {
    pub fn format(&self) -> SampleFormat {
        match self {
            FrameSamples::U8(_) => SampleFormat::U8,
            FrameSamples::S16(_) => SampleFormat::S16,
            FrameSamples::S32(_) => SampleFormat::S32,
            FrameSamples::F32(_) => SampleFormat::F32,
            FrameSamples::F32Planar(_) => SampleFormat::F32Planar,
        }
    }
}

/// One decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFrame {
    pub channels: u16,
    pub sample_rate: u32,
    /// Sample-frames held in `samples`.
    pub frames: usize,
    /// Duration of the packet that produced this frame, in sample-frames, if known.
    pub packet_duration: Option<u64>,
    pub samples: FrameSamples,
}

impl DecodedFrame {
    pub fn properties(&self) -> AudioProperties {
        AudioProperties::new(self.channels, self.sample_rate, self.samples.format())
    }

    /// Shrink to at most `frames` sample-frames.
    pub fn truncate(&mut self, frames: usize) {
        if frames >= self.frames {
            return;
        }
        let samples = frames * self.channels as usize;
        match &mut self.samples {
            FrameSamples::U8(v) => v.truncate(samples),
            FrameSamples::S16(v) => v.truncate(samples),
            FrameSamples::S32(v) => v.truncate(samples),
            FrameSamples::F32(v) => v.truncate(samples),
            FrameSamples::F32Planar(planes) => planes.iter_mut().for_each(|p| p.truncate(frames)),
        }
        self.frames = frames;
    }

    /// Convert into an owned buffer. Requires `frames > 0`.
    ///
    /// Planar float is copied channel by channel. Interleaved float goes through
    /// the clipping float conversion; integers through the conversion for their width.
    pub fn to_buffer(&self) -> AudioBuffer<'static> {
        let mut buffer = AudioBuffer::create(self.channels as usize, self.frames);
        match &self.samples {
            FrameSamples::F32Planar(planes) => {
                for (ch, plane) in planes.iter().enumerate() {
                    buffer.channel_mut(ch).copy_from_slice(&plane[..self.frames]);
                }
            }
            FrameSamples::F32(samples) => {
                buffer.copy_from_interleaved::<Float32>(samples, self.frames)
            }
            FrameSamples::U8(samples) => {
                buffer.copy_from_interleaved::<UnsignedInt8>(samples, self.frames)
            }
            FrameSamples::S16(samples) => {
                buffer.copy_from_interleaved::<SignedInt16>(samples, self.frames)
            }
            FrameSamples::S32(samples) => {
                buffer.copy_from_interleaved::<SignedInt32>(samples, self.frames)
            }
        }
        buffer
    }
}

/// Where a packet is within its send/receive cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    PacketSubmitted,
    FrameAvailable,
    NeedsMoreInput,
    Eof,
}

/// Push `packet` through `decoder`, handing each frame to `on_frame`.
///
/// Alternates submit and drain until the packet has been accepted and the
/// decoder asks for more input. Returns [`CycleState::NeedsMoreInput`] normally,
/// or [`CycleState::Eof`] once the decoder reports end of stream.
///
/// # Panics
/// If the decoder asks for more input while the packet is still pending. That
/// is a broken decoder, not bad data.
pub fn run_packet_cycle<D, F>(
    decoder: &mut D,
    packet: &Packet,
    mut on_frame: F,
) -> Result<CycleState, DecodeError>
where
    D: FrameDecoder + ?Sized,
    F: FnMut(DecodedFrame) -> Result<(), DecodeError>,
{
    let mut state = CycleState::Idle;
    let mut accepted = false;

    loop {
        state = match state {
            CycleState::Idle => {
                accepted = decoder.send_packet(packet)? == SendOutcome::Accepted;
                CycleState::PacketSubmitted
            }
            CycleState::PacketSubmitted | CycleState::FrameAvailable => {
                match decoder.receive_frame()? {
                    ReceiveOutcome::Frame(frame) => {
                        on_frame(frame)?;
                        CycleState::FrameAvailable
                    }
                    ReceiveOutcome::NeedsInput => {
                        assert!(
                            accepted,
                            "decoder requested input while a packet was still pending"
                        );
                        CycleState::NeedsMoreInput
                    }
                    ReceiveOutcome::EndOfStream => CycleState::Eof,
                }
            }
            CycleState::NeedsMoreInput | CycleState::Eof => return Ok(state),
        };

        if state == CycleState::FrameAvailable && !accepted {
            // Drained one frame; the decoder may now have room for the pending packet.
            state = CycleState::Idle;
        }
    }
}

/// [`FrameDecoder`] over a Symphonia codec.
///
/// Symphonia decodes a whole packet per call, so the decoded frame is held until
/// it is received; a packet sent while one is held is refused with
/// [`SendOutcome::Again`].
pub struct SymphoniaDecoder {
    inner: Box<dyn Decoder>,
    pending: Option<DecodedFrame>,
    time_base: Option<TimeBase>,
    sample_rate: Option<u32>,
}

impl SymphoniaDecoder {
    pub fn new(params: &CodecParameters, options: &DecoderOptions) -> Result<Self, CodecError> {
        let inner = symphonia::default::get_codecs().make(params, options)?;
        Ok(Self {
            inner,
            pending: None,
            time_base: params.time_base,
            sample_rate: params.sample_rate,
        })
    }

    /// Packet duration converted from the track time base to sample-frames.
    fn packet_frames(&self, dur: u64) -> Option<u64> {
        if dur == 0 {
            return None;
        }
        match (self.time_base, self.sample_rate) {
            (Some(tb), Some(rate)) if tb.denom > 0 => {
                let frames = dur as u128 * tb.numer as u128 * rate as u128 / tb.denom as u128;
                Some(u64::try_from(frames).unwrap_or(u64::MAX))
            }
            _ => Some(dur),
        }
    }
}

impl FrameDecoder for SymphoniaDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<SendOutcome, CodecError> {
        if self.pending.is_some() {
            return Ok(SendOutcome::Again);
        }
        let duration = self.packet_frames(packet.dur);
        let decoded = self.inner.decode(packet)?;
        self.pending = Some(frame_from_symphonia(decoded, duration));
        Ok(SendOutcome::Accepted)
    }

    fn receive_frame(&mut self) -> Result<ReceiveOutcome, CodecError> {
        Ok(match self.pending.take() {
            Some(frame) => ReceiveOutcome::Frame(frame),
            None => ReceiveOutcome::NeedsInput,
        })
    }

    fn reset(&mut self) {
        self.pending = None;
        self.inner.reset();
    }
}

fn interleaved<S>(decoded: AudioBufferRef<'_>) -> Vec<S>
where
    S: Sample + ConvertibleSample,
{
    let mut sample_buf = SampleBuffer::<S>::new(decoded.frames() as u64, *decoded.spec());
    sample_buf.copy_interleaved_ref(decoded);
    sample_buf.samples().to_vec()
}

/// Map a Symphonia buffer onto the closed set of frame layouts.
fn frame_from_symphonia(decoded: AudioBufferRef<'_>, packet_duration: Option<u64>) -> DecodedFrame {
    let spec = *decoded.spec();
    let channels = spec.channels.count();
    let frames = decoded.frames();

    let samples = match decoded {
        AudioBufferRef::F32(buf) => {
            FrameSamples::F32Planar((0..channels).map(|ch| buf.chan(ch).to_vec()).collect())
        }
        other @ AudioBufferRef::F64(_) => FrameSamples::F32(interleaved::<f32>(other)),
        other @ (AudioBufferRef::U8(_) | AudioBufferRef::S8(_)) => {
            FrameSamples::U8(interleaved::<u8>(other))
        }
        other @ (AudioBufferRef::U16(_) | AudioBufferRef::S16(_)) => {
            FrameSamples::S16(interleaved::<i16>(other))
        }
        other @ (AudioBufferRef::U24(_)
        | AudioBufferRef::S24(_)
        | AudioBufferRef::U32(_)
        | AudioBufferRef::S32(_)) => FrameSamples::S32(interleaved::<i32>(other)),
    };

    DecodedFrame {
        channels: channels as u16,
        sample_rate: spec.rate,
        frames,
        packet_duration,
        samples,
    }
}

/// Frame layout a codec will produce, as known before the first packet.
///
/// Uses the container-reported sample format when present, otherwise the layout
/// Symphonia's decoder for that codec emits.
pub fn expected_sample_format(params: &CodecParameters) -> SampleFormat {
    use symphonia::core::codecs::*;

    if let Some(format) = params.sample_format {
        return match format {
            SymphoniaSampleFormat::U8 | SymphoniaSampleFormat::S8 => SampleFormat::U8,
            SymphoniaSampleFormat::U16 | SymphoniaSampleFormat::S16 => SampleFormat::S16,
            SymphoniaSampleFormat::U24
            | SymphoniaSampleFormat::S24
            | SymphoniaSampleFormat::U32
            | SymphoniaSampleFormat::S32 => SampleFormat::S32,
            SymphoniaSampleFormat::F32 => SampleFormat::F32Planar,
            SymphoniaSampleFormat::F64 => SampleFormat::F32,
        };
    }

    match params.codec {
        CODEC_TYPE_FLAC | CODEC_TYPE_ALAC => SampleFormat::S32,
        _ => SampleFormat::F32Planar,
    }
}

/// Best-effort codec label.
pub fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_U8 => "PCM_U8",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
