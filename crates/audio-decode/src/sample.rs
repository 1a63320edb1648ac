//! Per-representation rules for converting stored samples to and from
//! normalized `f32` in `[-1.0, 1.0]`.
//!
//! Each representation is a zero-sized marker implementing [`SampleConversion`].
//! [`crate::buffer::AudioBuffer`] is generic over these markers for its
//! interleave/de-interleave paths; [`SampleKind`] is the runtime tag used when
//! the representation is only known from a decoder's byte width.

use audio_decode_types::SampleFormat;

/// Conversion contract between a stored sample value and normalized float.
pub trait SampleConversion {
    /// Stored sample type.
    type Value: Copy + Default;

    /// Nominal minimum / maximum / silence values of the stored representation.
    const MIN_VALUE: Self::Value;
    const MAX_VALUE: Self::Value;
    const ZERO_POINT_VALUE: Self::Value;

    fn from_float(value: f32) -> Self::Value;

    fn to_float(value: Self::Value) -> f32;
}

/// Fixed-point conversion shared by the integer markers.
///
/// Negative offsets from the zero point are scaled by `zero - min`, positive ones by
/// `max - zero`, so both ends of the range map exactly onto -1.0 and +1.0.
macro_rules! fixed_sample_conversion {
    ($name:ident, $ty:ty, $min:expr, $max:expr, $zero:expr) => {
        impl SampleConversion for $name {
            type Value = $ty;

            const MIN_VALUE: $ty = $min;
            const MAX_VALUE: $ty = $max;
            const ZERO_POINT_VALUE: $ty = $zero;

            #[inline]
            fn from_float(value: f32) -> $ty {
                let zero = Self::ZERO_POINT_VALUE as f64;
                let value = value as f64;
                if value < 0.0 {
                    if value <= -1.0 {
                        return Self::MIN_VALUE;
                    }
                    let scaled = (value * (zero - Self::MIN_VALUE as f64)).round();
                    (scaled + zero) as $ty
                } else {
                    if value >= 1.0 {
                        return Self::MAX_VALUE;
                    }
                    let scaled = (value * (Self::MAX_VALUE as f64 - zero)).round();
                    (scaled + zero) as $ty
                }
            }

            #[inline]
            fn to_float(value: $ty) -> f32 {
                let zero = Self::ZERO_POINT_VALUE as f64;
                let offset = value as f64 - zero;
                let normalized = if offset < 0.0 {
                    offset / (zero - Self::MIN_VALUE as f64)
                } else {
                    offset / (Self::MAX_VALUE as f64 - zero)
                };
                normalized as f32
            }
        }
    };
}

/// Unsigned 8-bit samples centred on 128.
#[derive(Clone, Copy, Debug)]
pub struct UnsignedInt8;

/// Signed 16-bit samples.
#[derive(Clone, Copy, Debug)]
pub struct SignedInt16;

/// Signed 32-bit samples.
#[derive(Clone, Copy, Debug)]
pub struct SignedInt32;

fixed_sample_conversion!(UnsignedInt8, u8, u8::MIN, u8::MAX, 128);
fixed_sample_conversion!(SignedInt16, i16, i16::MIN, i16::MAX, 0);
fixed_sample_conversion!(SignedInt32, i32, i32::MIN, i32::MAX, 0);

/// 32-bit float that clips on the way out.
///
/// Use for anything that will reach an output device. The upper bound is tested
/// with `>=`, matching the integer conversions.
#[derive(Clone, Copy, Debug)]
pub struct Float32;

impl SampleConversion for Float32 {
    type Value = f32;

    const MIN_VALUE: f32 = -1.0;
    const MAX_VALUE: f32 = 1.0;
    const ZERO_POINT_VALUE: f32 = 0.0;

    #[inline]
    fn from_float(value: f32) -> f32 {
        if value < Self::MIN_VALUE {
            return Self::MIN_VALUE;
        }
        if value >= Self::MAX_VALUE {
            return Self::MAX_VALUE;
        }
        value
    }

    #[inline]
    fn to_float(value: f32) -> f32 {
        value
    }
}

/// 32-bit float passed through unmodified.
///
/// `MIN_VALUE`/`MAX_VALUE` describe the nominal range only; nothing enforces them.
/// Later stages are expected to clip explicitly.
#[derive(Clone, Copy, Debug)]
pub struct Float32NoClip;

impl SampleConversion for Float32NoClip {
    type Value = f32;

    const MIN_VALUE: f32 = -1.0;
    const MAX_VALUE: f32 = 1.0;
    const ZERO_POINT_VALUE: f32 = 0.0;

    #[inline]
    fn from_float(value: f32) -> f32 {
        value
    }

    #[inline]
    fn to_float(value: f32) -> f32 {
        value
    }
}

/// Runtime tag for the closed set of conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    UnsignedInt8,
    SignedInt16,
    SignedInt32,
    Float32,
    Float32NoClip,
}

impl SampleKind {
    /// Integer conversion selected by stored width; `None` for unsupported widths.
    pub fn for_integer_width(bytes_per_sample: usize) -> Option<Self> {
        match bytes_per_sample {
            1 => Some(SampleKind::UnsignedInt8),
            2 => Some(SampleKind::SignedInt16),
            4 => Some(SampleKind::SignedInt32),
            _ => None,
        }
    }

    /// Conversion used to de-interleave decoder output of `format`.
    pub fn for_format(format: SampleFormat) -> Self {
        if format.is_float() {
            return SampleKind::Float32;
        }
        // Integer formats are 1, 2 or 4 bytes wide.
        Self::for_integer_width(format.bytes_per_sample()).unwrap_or(SampleKind::SignedInt32)
    }

    /// Quantization step of the representation; zero for float.
    pub fn epsilon(self) -> f32 {
        match self {
            SampleKind::UnsignedInt8 => 1.0 / 128.0,
            SampleKind::SignedInt16 => 1.0 / 32_768.0,
            SampleKind::SignedInt32 => 1.0 / 2_147_483_648.0,
            SampleKind::Float32 | SampleKind::Float32NoClip => 0.0,
        }
    }

    /// Round `value` through the stored representation and back.
    pub fn quantize(self, value: f32) -> f32 {
        match self {
            SampleKind::UnsignedInt8 => UnsignedInt8::to_float(UnsignedInt8::from_float(value)),
            SampleKind::SignedInt16 => SignedInt16::to_float(SignedInt16::from_float(value)),
            SampleKind::SignedInt32 => SignedInt32::to_float(SignedInt32::from_float(value)),
            SampleKind::Float32 => Float32::from_float(value),
            SampleKind::Float32NoClip => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int16_extremes_map_to_unit_range() {
        assert_eq!(SignedInt16::to_float(i16::MIN), -1.0);
        assert_eq!(SignedInt16::to_float(i16::MAX), 1.0);
        assert_eq!(SignedInt16::to_float(0), 0.0);
        assert_eq!(SignedInt16::from_float(-1.0), i16::MIN);
        assert_eq!(SignedInt16::from_float(1.0), i16::MAX);
        assert_eq!(SignedInt16::from_float(0.0), 0);
    }

    #[test]
    fn int_conversion_clips_out_of_range() {
        assert_eq!(SignedInt16::from_float(3.5), i16::MAX);
        assert_eq!(SignedInt16::from_float(-7.0), i16::MIN);
        assert_eq!(UnsignedInt8::from_float(2.0), u8::MAX);
        assert_eq!(UnsignedInt8::from_float(-2.0), u8::MIN);
        assert_eq!(SignedInt32::from_float(1.0), i32::MAX);
        assert_eq!(SignedInt32::from_float(-1.0), i32::MIN);
    }

    #[test]
    fn uint8_is_centred_on_128() {
        assert_eq!(UnsignedInt8::to_float(128), 0.0);
        assert_eq!(UnsignedInt8::to_float(0), -1.0);
        assert_eq!(UnsignedInt8::to_float(255), 1.0);
        assert_eq!(UnsignedInt8::from_float(0.0), 128);
    }

    #[test]
    fn integer_round_trip_is_exact() {
        for v in [i16::MIN, -12_345, -1, 0, 1, 16_383, i16::MAX] {
            assert_eq!(SignedInt16::from_float(SignedInt16::to_float(v)), v);
        }
        for v in [0u8, 1, 127, 128, 200, 255] {
            assert_eq!(UnsignedInt8::from_float(UnsignedInt8::to_float(v)), v);
        }
    }

    #[test]
    fn float_clip_uses_inclusive_upper_bound() {
        assert_eq!(Float32::from_float(1.0), 1.0);
        assert_eq!(Float32::from_float(1.5), 1.0);
        assert_eq!(Float32::from_float(-1.5), -1.0);
        assert_eq!(Float32::from_float(0.25), 0.25);
        assert_eq!(Float32::from_float(f32::INFINITY), 1.0);
    }

    #[test]
    fn no_clip_passes_through() {
        assert_eq!(Float32NoClip::from_float(4.0), 4.0);
        assert_eq!(Float32NoClip::from_float(-4.0), -4.0);
        assert_eq!(Float32NoClip::MAX_VALUE, Float32::MAX_VALUE);
    }

    #[test]
    fn kind_selects_by_width() {
        assert_eq!(SampleKind::for_integer_width(1), Some(SampleKind::UnsignedInt8));
        assert_eq!(SampleKind::for_integer_width(2), Some(SampleKind::SignedInt16));
        assert_eq!(SampleKind::for_integer_width(4), Some(SampleKind::SignedInt32));
        assert_eq!(SampleKind::for_integer_width(3), None);
    }

    #[test]
    fn kind_for_format_follows_storage_width() {
        assert_eq!(SampleKind::for_format(SampleFormat::U8), SampleKind::UnsignedInt8);
        assert_eq!(SampleKind::for_format(SampleFormat::S16), SampleKind::SignedInt16);
        assert_eq!(SampleKind::for_format(SampleFormat::S32), SampleKind::SignedInt32);
        assert_eq!(SampleKind::for_format(SampleFormat::F32), SampleKind::Float32);
        assert_eq!(SampleKind::for_format(SampleFormat::F32Planar), SampleKind::Float32);
    }

    #[test]
    fn quantize_s16_stays_within_epsilon() {
        let kind = SampleKind::SignedInt16;
        for v in [-0.9f32, -0.3, 0.0, 0.123_456, 0.75] {
            assert!((kind.quantize(v) - v).abs() <= kind.epsilon());
        }
    }
}
