//! Aligned multi-channel `f32` buffer passed between decode, tempo and output stages.
//!
//! An [`AudioBuffer`] holds `frames()` samples for each of `channels()` channels,
//! one contiguous `f32` slice per channel. Every channel starts on a
//! [`CHANNEL_ALIGNMENT`]-byte boundary:
//! - owned storage pads each channel's stride so the guarantee holds for any frame count
//! - wrapped storage must already satisfy it (checked on construction)
//!
//! Invalid channel/frame counts and out-of-range frame windows are programmer errors
//! and panic, like slice indexing does.

use std::fmt;
use std::mem::size_of;

use crate::sample::{Float32, SampleConversion};

/// Guaranteed alignment of every channel's first sample, in bytes.
pub const CHANNEL_ALIGNMENT: usize = 16;

/// Upper bound on channels accepted by any constructor.
pub const MAX_CHANNELS: usize = 32;

const FLOATS_PER_ALIGNMENT: usize = CHANNEL_ALIGNMENT / size_of::<f32>();

/// Frame count rounded up so that `frames * size_of::<f32>()` is a multiple of
/// [`CHANNEL_ALIGNMENT`].
fn aligned_frames(frames: usize) -> usize {
    frames.div_ceil(FLOATS_PER_ALIGNMENT) * FLOATS_PER_ALIGNMENT
}

/// Size in bytes of a contiguous block able to back `channels x frames` samples
/// through [`AudioBuffer::wrap_memory`].
pub fn calculate_memory_size(channels: usize, frames: usize) -> usize {
    size_of::<f32>() * channels * aligned_frames(frames)
}

/// Whether `ptr` sits on a [`CHANNEL_ALIGNMENT`] boundary.
pub fn is_aligned(ptr: *const f32) -> bool {
    (ptr as usize) % CHANNEL_ALIGNMENT == 0
}

fn validate_config(channels: usize, frames: usize) {
    assert!(frames > 0, "audio buffer needs at least one frame");
    assert!(channels > 0, "audio buffer needs at least one channel");
    assert!(
        channels <= MAX_CHANNELS,
        "audio buffer supports at most {MAX_CHANNELS} channels, got {channels}"
    );
}

fn check_overflow(start_frame: usize, frames: usize, total_frames: usize) {
    let end = start_frame
        .checked_add(frames)
        .expect("frame range overflows usize");
    assert!(
        end <= total_frames,
        "frame range {start_frame}..{end} exceeds buffer of {total_frames} frames"
    );
}

/// Heap block of zeroed `f32` whose visible part starts on a [`CHANNEL_ALIGNMENT`]
/// boundary. The backing `Vec` is never resized, so the start stays aligned.
struct AlignedBlock {
    data: Vec<f32>,
    offset: usize,
    len: usize,
}

impl AlignedBlock {
    fn zeroed(len: usize) -> Self {
        let data = vec![0.0f32; len + FLOATS_PER_ALIGNMENT - 1];
        let misalignment = (data.as_ptr() as usize) % CHANNEL_ALIGNMENT;
        let offset = if misalignment == 0 {
            0
        } else {
            (CHANNEL_ALIGNMENT - misalignment) / size_of::<f32>()
        };
        Self { data, offset, len }
    }

    fn as_slice(&self) -> &[f32] {
        &self.data[self.offset..self.offset + self.len]
    }

    fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data[self.offset..self.offset + self.len]
    }
}

/// Where the channel samples live.
enum Storage<'a> {
    /// Aligned block allocated and freed by the buffer.
    Owned(AlignedBlock),
    /// Caller-owned contiguous block, one padded stride per channel.
    Block(&'a mut [f32]),
    /// Caller-owned, independently allocated channel slices.
    Channels(Vec<&'a mut [f32]>),
}

/// Multi-channel planar `f32` audio.
///
/// Buffers built with [`AudioBuffer::create`] own their memory and are
/// `AudioBuffer<'static>`; wrappers borrow caller memory for `'a`.
pub struct AudioBuffer<'a> {
    storage: Storage<'a>,
    /// Logical channel -> start offset (block storage) or slice index (channel storage).
    /// [`AudioBuffer::swap_channels`] permutes this table without touching samples.
    channel_table: Vec<usize>,
    frames: usize,
}

impl AudioBuffer<'static> {
    /// Allocate an owned, zeroed buffer of `channels x frames`.
    pub fn create(channels: usize, frames: usize) -> Self {
        validate_config(channels, frames);

        let stride = aligned_frames(frames);
        let block = AlignedBlock::zeroed(channels * stride);
        Self {
            storage: Storage::Owned(block),
            channel_table: (0..channels).map(|ch| ch * stride).collect(),
            frames,
        }
    }

    /// Join buffers end to end. `None` if `parts` holds no frames.
    ///
    /// Panics if the parts disagree on channel count.
    pub fn concat(parts: &[AudioBuffer<'_>]) -> Option<Self> {
        let first = parts.first()?;
        let frames: usize = parts.iter().map(AudioBuffer::frames).sum();
        if frames == 0 {
            return None;
        }

        let mut joined = Self::create(first.channels(), frames);
        let mut cursor = 0;
        for part in parts {
            part.copy_partial_frames_to(0, part.frames(), cursor, &mut joined);
            cursor += part.frames();
        }
        Some(joined)
    }
}

impl<'a> AudioBuffer<'a> {
    /// Wrap a caller-owned block of at least [`calculate_memory_size`] bytes.
    ///
    /// The block must start on a [`CHANNEL_ALIGNMENT`] boundary. Nothing is copied and
    /// existing sample values are kept.
    pub fn wrap_memory(channels: usize, frames: usize, block: &'a mut [f32]) -> Self {
        validate_config(channels, frames);
        assert!(
            is_aligned(block.as_ptr()),
            "wrapped memory must be {CHANNEL_ALIGNMENT}-byte aligned"
        );

        let stride = aligned_frames(frames);
        assert!(
            block.len() >= channels * stride,
            "wrapped memory holds {} samples, {} required",
            block.len(),
            channels * stride
        );

        Self {
            storage: Storage::Block(block),
            channel_table: (0..channels).map(|ch| ch * stride).collect(),
            frames,
        }
    }

    /// Wrap independently allocated channel slices, each aligned and at least
    /// `frames` long.
    pub fn wrap_channels(frames: usize, channels: Vec<&'a mut [f32]>) -> Self {
        validate_config(channels.len(), frames);
        for (ch, data) in channels.iter().enumerate() {
            assert!(
                is_aligned(data.as_ptr()),
                "channel {ch} must be {CHANNEL_ALIGNMENT}-byte aligned"
            );
            assert!(
                data.len() >= frames,
                "channel {ch} holds {} frames, {frames} required",
                data.len()
            );
        }

        Self {
            channel_table: (0..channels.len()).collect(),
            storage: Storage::Channels(channels),
            frames,
        }
    }

    /// Build a wrapper with `channels` unassigned channels and zero frames.
    ///
    /// Assign memory with [`AudioBuffer::set_channel_data`], then call
    /// [`AudioBuffer::set_frames`].
    pub fn create_wrapper(channels: usize) -> Self {
        validate_config(channels, 1);
        Self {
            storage: Storage::Channels((0..channels).map(|_| Default::default()).collect()),
            channel_table: (0..channels).collect(),
            frames: 0,
        }
    }

    /// Point channel `ch` of a wrapper at `data`. Once frames are set, `data` must
    /// hold at least that many.
    pub fn set_channel_data(&mut self, ch: usize, data: &'a mut [f32]) {
        assert!(ch < self.channels(), "channel {ch} out of range");
        assert!(
            is_aligned(data.as_ptr()),
            "channel {ch} must be {CHANNEL_ALIGNMENT}-byte aligned"
        );
        assert!(
            data.len() >= self.frames,
            "channel {ch} holds {} frames, {} required",
            data.len(),
            self.frames
        );
        let slot = self.channel_table[ch];
        match &mut self.storage {
            Storage::Channels(channels) => channels[slot] = data,
            _ => panic!("set_channel_data() requires a buffer built by create_wrapper()"),
        }
    }

    /// Set the logical frame count of a wrapper. Every channel must hold at least
    /// `frames` samples.
    pub fn set_frames(&mut self, frames: usize) {
        assert!(frames > 0, "audio buffer needs at least one frame");
        match &self.storage {
            Storage::Owned(_) => panic!("set_frames() is not supported on owned buffers"),
            Storage::Block(data) => {
                assert!(data.len() >= self.channels() * aligned_frames(frames));
            }
            Storage::Channels(channels) => {
                for (ch, data) in channels.iter().enumerate() {
                    assert!(
                        data.len() >= frames,
                        "channel {ch} holds {} frames, {frames} required",
                        data.len()
                    );
                }
            }
        }
        self.frames = frames;
    }

    pub fn channels(&self) -> usize {
        self.channel_table.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Whether the samples are owned (and freed) by this buffer.
    pub fn is_owned(&self) -> bool {
        matches!(self.storage, Storage::Owned(_))
    }

    /// Samples of channel `ch`. Values are not guaranteed to be finite or in range.
    pub fn channel(&self, ch: usize) -> &[f32] {
        let slot = self.channel_table[ch];
        let frames = self.frames;
        match &self.storage {
            Storage::Owned(block) => &block.as_slice()[slot..slot + frames],
            Storage::Block(data) => &data[slot..slot + frames],
            Storage::Channels(channels) => &channels[slot][..frames],
        }
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let slot = self.channel_table[ch];
        let frames = self.frames;
        match &mut self.storage {
            Storage::Owned(block) => &mut block.as_mut_slice()[slot..slot + frames],
            Storage::Block(data) => &mut data[slot..slot + frames],
            Storage::Channels(channels) => &mut channels[slot][..frames],
        }
    }

    /// Overwrite the buffer from interleaved `source` (`[ch0, ch1, ..., ch0, ...]`).
    ///
    /// Frames past `frames_to_write` are zeroed so no stale samples survive a short write.
    pub fn copy_from_interleaved<T: SampleConversion>(
        &mut self,
        source: &[T::Value],
        frames_to_write: usize,
    ) {
        check_overflow(0, frames_to_write, self.frames);
        self.convert_from_interleaved::<T>(source, 0, frames_to_write);
        self.zero_frames_partial(frames_to_write, self.frames - frames_to_write);
    }

    /// Like [`AudioBuffer::copy_from_interleaved`] but writes only
    /// `write_offset..write_offset + frames_to_write`; everything else is left as is.
    pub fn copy_from_interleaved_partial<T: SampleConversion>(
        &mut self,
        source: &[T::Value],
        write_offset: usize,
        frames_to_write: usize,
    ) {
        check_overflow(write_offset, frames_to_write, self.frames);
        self.convert_from_interleaved::<T>(source, write_offset, frames_to_write);
    }

    /// Write the first `frames_to_read` frames into interleaved `dest`.
    pub fn to_interleaved<T: SampleConversion>(
        &self,
        frames_to_read: usize,
        dest: &mut [T::Value],
    ) {
        self.to_interleaved_partial::<T>(0, frames_to_read, dest);
    }

    /// Write `read_offset..read_offset + frames_to_read` into interleaved `dest`.
    pub fn to_interleaved_partial<T: SampleConversion>(
        &self,
        read_offset: usize,
        frames_to_read: usize,
        dest: &mut [T::Value],
    ) {
        check_overflow(read_offset, frames_to_read, self.frames);
        let channels = self.channels();
        assert!(
            dest.len() >= frames_to_read * channels,
            "interleaved destination too small"
        );

        for ch in 0..channels {
            let src = &self.channel(ch)[read_offset..read_offset + frames_to_read];
            for (frame, &sample) in src.iter().enumerate() {
                dest[frame * channels + ch] = T::from_float(sample);
            }
        }
    }

    fn convert_from_interleaved<T: SampleConversion>(
        &mut self,
        source: &[T::Value],
        write_offset: usize,
        frames_to_write: usize,
    ) {
        let channels = self.channels();
        assert!(
            source.len() >= frames_to_write * channels,
            "interleaved source holds {} samples, {} required",
            source.len(),
            frames_to_write * channels
        );

        for ch in 0..channels {
            let dst = &mut self.channel_mut(ch)[write_offset..write_offset + frames_to_write];
            for (frame, sample) in dst.iter_mut().enumerate() {
                *sample = T::to_float(source[frame * channels + ch]);
            }
        }
    }

    /// Copy every sample into `dest`, which must have the same shape.
    pub fn copy_to(&self, dest: &mut AudioBuffer<'_>) {
        assert_eq!(self.frames, dest.frames, "copy_to() requires equal frame counts");
        self.copy_partial_frames_to(0, self.frames, 0, dest);
    }

    /// Copy `frame_count` frames starting at `source_start` into `dest` at `dest_start`.
    pub fn copy_partial_frames_to(
        &self,
        source_start: usize,
        frame_count: usize,
        dest_start: usize,
        dest: &mut AudioBuffer<'_>,
    ) {
        assert_eq!(
            self.channels(),
            dest.channels(),
            "copy requires equal channel counts"
        );
        check_overflow(source_start, frame_count, self.frames);
        check_overflow(dest_start, frame_count, dest.frames);

        for ch in 0..self.channels() {
            dest.channel_mut(ch)[dest_start..dest_start + frame_count]
                .copy_from_slice(&self.channel(ch)[source_start..source_start + frame_count]);
        }
    }

    /// Copy into `dest`, clamping every sample to `[-1.0, 1.0]`.
    ///
    /// Infinities clamp to the nearest bound and NaN becomes silence.
    pub fn copy_and_clip_to(&self, dest: &mut AudioBuffer<'_>) {
        assert_eq!(
            self.channels(),
            dest.channels(),
            "copy requires equal channel counts"
        );
        assert!(dest.frames >= self.frames, "destination too short");

        for ch in 0..self.channels() {
            let src = self.channel(ch);
            let dst = &mut dest.channel_mut(ch)[..src.len()];
            for (out, &sample) in dst.iter_mut().zip(src) {
                *out = if sample.is_nan() {
                    0.0
                } else {
                    Float32::from_float(sample)
                };
            }
        }
    }

    pub fn zero(&mut self) {
        self.zero_frames_partial(0, self.frames);
    }

    /// Zero the first `frames` frames.
    pub fn zero_frames(&mut self, frames: usize) {
        self.zero_frames_partial(0, frames);
    }

    /// Zero `start_frame..start_frame + frames`.
    pub fn zero_frames_partial(&mut self, start_frame: usize, frames: usize) {
        check_overflow(start_frame, frames, self.frames);
        if frames == 0 {
            return;
        }
        for ch in 0..self.channels() {
            self.channel_mut(ch)[start_frame..start_frame + frames].fill(0.0);
        }
    }

    /// Exact test for silence across every channel and frame.
    pub fn are_frames_zero(&self) -> bool {
        (0..self.channels()).all(|ch| self.channel(ch).iter().all(|&s| s == 0.0))
    }

    /// Multiply every sample by `volume`.
    ///
    /// `0.0` zeroes the buffer, `1.0` is a no-op and negative values are ignored.
    pub fn scale(&mut self, volume: f32) {
        if volume > 0.0 && volume != 1.0 {
            for ch in 0..self.channels() {
                for sample in self.channel_mut(ch) {
                    *sample *= volume;
                }
            }
        } else if volume == 0.0 {
            self.zero();
        }
    }

    /// Swap two channels by exchanging their slots; no samples move.
    pub fn swap_channels(&mut self, a: usize, b: usize) {
        assert_ne!(a, b, "cannot swap a channel with itself");
        assert!(a < self.channels() && b < self.channels(), "channel out of range");
        self.channel_table.swap(a, b);
    }
}

impl fmt::Debug for AudioBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels())
            .field("frames", &self.frames)
            .field("owned", &self.is_owned())
            .finish()
    }
}
