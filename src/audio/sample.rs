use std::fmt::Debug;

use num_traits::{Bounded, FromPrimitive, Num, ToPrimitive};

pub trait AudioSample:
    Num + Copy + Send + Sync + PartialOrd + ToPrimitive + FromPrimitive + Bounded + Debug + 'static
{
    fn to_f64_normalized(self) -> f64;

    fn from_f64_normalized(value: f64) -> Self;
}

impl AudioSample for f32 {
    fn to_f64_normalized(self) -> f64 {
        self as f64
    }

    fn from_f64_normalized(value: f64) -> Self {
        value.clamp(-1.0, 1.0) as f32
    }
}

/// PCM16 as spoken by the Live endpoint.
///
/// Encoding is asymmetric (32767 for positive, 32768 for negative values) so
/// that both -1.0 and 1.0 land on a representable integer. Decoding always
/// divides by 32768.
impl AudioSample for i16 {
    fn to_f64_normalized(self) -> f64 {
        self as f64 / 32768.0
    }

    fn from_f64_normalized(value: f64) -> Self {
        let s = value.clamp(-1.0, 1.0);
        let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
        scaled.round() as i16
    }
}
