//! The counter cell abstraction that fixes a histogram's memory/saturation
//! trade-off.

use num_traits as num;

/// Operations a histogram needs from its counter cells.
///
/// The counter width is the only difference between the histogram variants:
/// `u16` keeps the footprint small but saturates after 65 535 samples per
/// value range, `u64` effectively never saturates. Saturation is not an
/// error; it is observable after the fact through
/// [`Histogram::has_overflowed`](crate::Histogram::has_overflowed).
pub trait Counter:
    num::Num
    + num::ToPrimitive
    + num::FromPrimitive
    + num::Saturating
    + num::Bounded
    + num::CheckedAdd
    + num::CheckedSub
    + Copy
    + PartialOrd<Self>
{
    /// Widen the counter to a `u64`.
    fn as_u64(self) -> u64;

    /// Widen the counter to an `f64` for statistics.
    fn as_f64(self) -> f64;
}

impl Counter for u16 {
    #[inline]
    fn as_u64(self) -> u64 {
        u64::from(self)
    }
    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Counter for u32 {
    #[inline]
    fn as_u64(self) -> u64 {
        u64::from(self)
    }
    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Counter for u64 {
    #[inline]
    fn as_u64(self) -> u64 {
        self
    }
    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}
