//! Fixed-memory high dynamic range histograms for latency telemetry.
//!
//! `hdrsketch` records positive integer values across a very wide, fixed
//! dynamic range (for example 1 microsecond to 1 hour) while maintaining a
//! configurable number of significant decimal digits at every value
//! magnitude. Recording is O(1) and allocation-free: the value is mapped
//! straight to a counter slot with a handful of bit operations, so the
//! structure can absorb millions of samples per second. Arbitrary
//! percentiles, means and deviations can be computed after the fact, and
//! compact binary snapshots can be exchanged with peer implementations of
//! the same wire format.
//!
//! # Buckets and sub-buckets
//!
//! Counters are organized in power-of-two *buckets*, each split into
//! `sub_bucket_count` equal-width slots. Bucket `k` covers values up to
//! `sub_bucket_count << k` with a resolution of `2^k` units; since the lower
//! half of every bucket after the first overlaps the whole range of the
//! preceding buckets, only the upper half of those buckets is stored. The
//! number of sub-buckets is derived from the requested precision: with 3
//! significant digits, values must stay distinguishable to one part in
//! 1 000, which requires single-unit resolution up to 2 000 and therefore
//! 2 048 sub-buckets.
//!
//! All values that fall into the same slot form an *equivalence class*; the
//! [`Histogram::lowest_equivalent`], [`Histogram::highest_equivalent`] and
//! [`Histogram::median_equivalent`] helpers expose its extent.
//!
//! # Example
//!
//! ```
//! use hdrsketch::Histogram;
//!
//! // track 1..=3_600_000_000 with 3 significant digits
//! let mut hist = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
//!
//! hist.record(54_321).unwrap();
//! hist.record_n(1_000, 50).unwrap();
//!
//! assert_eq!(hist.total_count(), 51);
//! assert_eq!(hist.value_at_percentile(50.0), 1_000);
//! ```
//!
//! # Counter widths and concurrency
//!
//! The counter cell type is generic: `Histogram<u16>`, `Histogram<u32>` and
//! `Histogram<u64>` (aliased as [`ShortHistogram`], [`IntHistogram`] and
//! [`LongHistogram`]) trade memory for saturation headroom. Counters
//! saturate instead of wrapping; a saturated histogram reports
//! [`Histogram::has_overflowed`]. The plain variants follow a single-writer
//! discipline: recording takes `&mut self`. For concurrent recording from
//! several threads, use [`SynchronizedHistogram`], which guards one
//! `Histogram<u64>` with a mutex.
//!
//! # Coordinated omission
//!
//! When the sampling loop itself is blocked by the long events it measures,
//! the recorded distribution is biased: the samples that *would* have been
//! taken during the stall are missing. [`Histogram::record_with_expected_interval`]
//! compensates at record time by synthesizing one sample at each expected
//! interval below the observed value;
//! [`Histogram::copy_corrected`] applies the same correction to an already
//! recorded histogram. The two are equivalent and must not be combined on
//! the same data.

#![deny(missing_docs)]
#![warn(trivial_numeric_casts, unused_import_braces)]

use std::ops::{AddAssign, SubAssign};

mod counter;
pub mod errors;
pub mod iterators;
mod report;
#[cfg(feature = "serialization")]
pub mod serialization;
#[cfg(feature = "sync")]
pub mod sync;

pub use crate::counter::Counter;
pub use crate::errors::{AdditionError, CreationError, RecordError, SubtractionError};
pub use crate::report::PercentileReportFormat;
#[cfg(feature = "sync")]
pub use crate::sync::SynchronizedHistogram;

use crate::iterators::{
    all::AllSteps, linear::LinearSteps, log::LogarithmicSteps, percentile::PercentileSteps,
    recorded::RecordedSteps, HistogramWalker,
};

/// `min_non_zero_value` of a histogram with no samples.
const EMPTY_MIN: u64 = u64::max_value();
/// `max_value` of a histogram with no samples.
const EMPTY_MAX: u64 = 0;

/// A histogram with a 16-bit counter per value slot.
pub type ShortHistogram = Histogram<u16>;
/// A histogram with a 32-bit counter per value slot.
pub type IntHistogram = Histogram<u32>;
/// A histogram with a 64-bit counter per value slot.
pub type LongHistogram = Histogram<u64>;

/// A fixed-range, fixed-precision histogram of `u64` values.
///
/// The configuration (lowest discernible value, highest trackable value and
/// number of significant digits) is immutable after construction, and so is
/// the length of the counts array derived from it. See the crate-level
/// documentation for the bucketing scheme.
#[derive(Debug)]
pub struct Histogram<C: Counter> {
    // configuration, >= 1
    lowest_discernible_value: u64,
    // >= 2 * lowest_discernible_value
    highest_trackable_value: u64,
    // in [0, 5]
    significant_value_digits: u8,

    // derived, in [1, 64]
    bucket_count: u8,
    // power of two in [2, 2^18]
    sub_bucket_count: u32,
    sub_bucket_half_count: u32,
    // log2(sub_bucket_half_count)
    sub_bucket_half_count_magnitude: u8,
    // bits of the largest sub-bucket index, shifted by unit magnitude
    sub_bucket_mask: u64,
    // leading zeros of the largest value that fits in bucket 0
    leading_zero_count_base: u8,
    // floor(log2(lowest_discernible_value))
    unit_magnitude: u8,
    // low unit_magnitude bits set
    unit_magnitude_mask: u64,

    // trackers; EMPTY_MAX / EMPTY_MIN while no samples are recorded
    max_value: u64,
    min_non_zero_value: u64,

    // opaque to the histogram itself; set by the host or the log reader
    start_timestamp_ms: u64,
    end_timestamp_ms: u64,

    total_count: u64,
    counts: Vec<C>,
}

impl<C: Counter> Histogram<C> {
    // ****************************************************************
    // Construction
    // ****************************************************************

    /// Construct a histogram covering `[1, high]` with `sigfig` significant
    /// decimal digits.
    ///
    /// See [`new_with_bounds`](Histogram::new_with_bounds).
    pub fn new_with_max(high: u64, sigfig: u8) -> Result<Histogram<C>, CreationError> {
        Self::new_with_bounds(1, high, sigfig)
    }

    /// Construct a histogram with explicit range bounds.
    ///
    /// `low` is the lowest value that needs to be discerned from 0; it must
    /// be at least 1 and may be rounded down to the nearest power of two
    /// internally. Raising it above 1 shrinks the counts array when the
    /// recorded unit is much finer than the needed accuracy (for example
    /// nanosecond values with microsecond accuracy: `low = 1000`).
    ///
    /// `high` is the highest trackable value and must be at least `2 * low`.
    ///
    /// `sigfig` is the number of significant decimal digits maintained
    /// across the whole range, in `[0, 5]`. Memory grows exponentially with
    /// this parameter.
    pub fn new_with_bounds(low: u64, high: u64, sigfig: u8) -> Result<Histogram<C>, CreationError> {
        if low < 1 {
            return Err(CreationError::LowIsZero);
        }
        if low > u64::max_value() / 2 {
            return Err(CreationError::LowExceedsMax);
        }
        if high < 2 * low {
            return Err(CreationError::HighLessThanTwiceLow);
        }
        if sigfig > 5 {
            return Err(CreationError::SigFigExceedsMax);
        }

        // Precision of "n significant digits" means single-unit resolution
        // up to 2 * 10^n: +/- 1 unit at 1000 implies +/- 2 at 2000, but not
        // at 1999, so the single-unit span has to reach 2000.
        let largest_value_with_single_unit_resolution = 2 * 10_u32.pow(u32::from(sigfig));

        let unit_magnitude = (low as f64).log2().floor() as u8;
        let unit_magnitude_mask = (1_u64 << unit_magnitude) - 1;

        // Sub-bucket count is the power of two that covers the single-unit
        // span; in [2, 2^18].
        let sub_bucket_count_magnitude =
            (f64::from(largest_value_with_single_unit_resolution)).log2().ceil() as u8;
        let sub_bucket_count = 1_u32 << u32::from(sub_bucket_count_magnitude);

        if unit_magnitude + sub_bucket_count_magnitude > 63 {
            // The shifted sub-bucket span must stay expressible in a u64.
            return Err(CreationError::CannotRepresentSigFigBeyondLow);
        }

        let sub_bucket_half_count_magnitude = sub_bucket_count_magnitude - 1;
        let sub_bucket_half_count = sub_bucket_count / 2;
        let sub_bucket_mask = (u64::from(sub_bucket_count) - 1) << unit_magnitude;

        let bucket_count = Self::buckets_to_cover(high, sub_bucket_count, unit_magnitude);
        let counts_len = (usize::from(bucket_count) + 1)
            .checked_mul(sub_bucket_half_count as usize)
            .ok_or(CreationError::UsizeTypeTooSmall)?;

        Ok(Histogram {
            lowest_discernible_value: low,
            highest_trackable_value: high,
            significant_value_digits: sigfig,

            bucket_count,
            sub_bucket_count,
            sub_bucket_half_count,
            sub_bucket_half_count_magnitude,
            sub_bucket_mask,
            leading_zero_count_base: 64 - unit_magnitude - sub_bucket_count_magnitude,
            unit_magnitude,
            unit_magnitude_mask,

            max_value: EMPTY_MAX,
            min_non_zero_value: EMPTY_MIN,

            start_timestamp_ms: 0,
            end_timestamp_ms: 0,

            total_count: 0,
            counts: vec![C::zero(); counts_len],
        })
    }

    /// Construct an empty histogram with the same configuration (and
    /// timestamps) as `source`. The counter width may differ.
    pub fn new_from<D: Counter>(source: &Histogram<D>) -> Histogram<C> {
        let mut h = Self::new_with_bounds(
            source.lowest_discernible_value,
            source.highest_trackable_value,
            source.significant_value_digits,
        )
        .expect("cloning a valid configuration cannot fail");
        h.start_timestamp_ms = source.start_timestamp_ms;
        h.end_timestamp_ms = source.end_timestamp_ms;
        h
    }

    /// Number of buckets needed so that `value` is representable.
    fn buckets_to_cover(value: u64, sub_bucket_count: u32, unit_magnitude: u8) -> u8 {
        // The k'th bucket tracks values below sub_bucket_count << k (scaled
        // by the unit magnitude).
        let mut smallest_untrackable = u64::from(sub_bucket_count) << unit_magnitude;
        let mut buckets_needed = 1_u8;
        while smallest_untrackable <= value {
            if smallest_untrackable > u64::max_value() / 2 {
                // the next bucket covers everything up to and beyond
                // u64::max_value()
                return buckets_needed + 1;
            }
            smallest_untrackable <<= 1;
            buckets_needed += 1;
        }
        buckets_needed
    }

    // ****************************************************************
    // Configuration read-outs
    // ****************************************************************

    /// The configured lowest discernible value.
    pub fn lowest_discernible_value(&self) -> u64 {
        self.lowest_discernible_value
    }

    /// The configured highest trackable value.
    pub fn highest_trackable_value(&self) -> u64 {
        self.highest_trackable_value
    }

    /// The configured number of significant decimal digits.
    pub fn significant_value_digits(&self) -> u8 {
        self.significant_value_digits
    }

    /// The number of power-of-two buckets covering the range.
    pub fn bucket_count(&self) -> u8 {
        self.bucket_count
    }

    /// The number of sub-buckets per bucket.
    pub fn sub_bucket_count(&self) -> u32 {
        self.sub_bucket_count
    }

    /// The length of the underlying counts array.
    pub fn counts_array_length(&self) -> usize {
        self.counts.len()
    }

    // ****************************************************************
    // Value <-> index mapping
    // ****************************************************************

    /// The bucket holding `value`: how many powers of two `value` lies above
    /// the span of bucket 0. The mask pins small values to bucket 0.
    #[inline]
    fn bucket_index_of(&self, value: u64) -> u8 {
        self.leading_zero_count_base - (value | self.sub_bucket_mask).leading_zeros() as u8
    }

    /// The slot within `bucket_index` for `value`. In the upper half for
    /// every bucket except bucket 0, since a value in the lower half would
    /// already have fit in the previous bucket.
    #[inline]
    fn sub_bucket_index_of(&self, value: u64, bucket_index: u8) -> u32 {
        (value >> (bucket_index + self.unit_magnitude)) as u32
    }

    /// The value at the start of the slot `(bucket_index, sub_bucket_index)`.
    #[inline]
    fn value_from_parts(&self, bucket_index: u8, sub_bucket_index: u32) -> u64 {
        u64::from(sub_bucket_index) << (bucket_index + self.unit_magnitude)
    }

    /// Counts-array index for `value`, without range policing. `None` only
    /// when the index cannot be represented in `usize`.
    fn array_index_of(&self, value: u64) -> Option<usize> {
        let bucket_index = self.bucket_index_of(value);
        let sub_bucket_index = self.sub_bucket_index_of(value, bucket_index);

        debug_assert!(sub_bucket_index < self.sub_bucket_count);
        debug_assert!(bucket_index == 0 || sub_bucket_index >= self.sub_bucket_half_count);

        // Bucket 0 owns a full sub_bucket_count of slots; every later bucket
        // only its upper half. The base index points at the middle of the
        // bucket, and the offset is negative only within bucket 0.
        let bucket_base =
            (i64::from(bucket_index) + 1) << self.sub_bucket_half_count_magnitude;
        let offset = i64::from(sub_bucket_index) - i64::from(self.sub_bucket_half_count);

        let index = bucket_base + offset;
        debug_assert!(index >= 0);
        if index as u64 <= usize::max_value() as u64 {
            Some(index as usize)
        } else {
            None
        }
    }

    /// Counts-array index for `value`, rejecting values beyond the highest
    /// trackable value.
    fn index_of(&self, value: u64) -> Option<usize> {
        if value > self.highest_trackable_value {
            return None;
        }
        self.array_index_of(value)
    }

    /// Counts-array index for `value`, clamped to the last slot for values
    /// beyond the representable range.
    fn index_of_clamped(&self, value: u64) -> usize {
        self.array_index_of(value)
            .map_or(self.last_index(), |i| i.min(self.last_index()))
    }

    fn last_index(&self) -> usize {
        self.counts.len() - 1
    }

    /// The value at the start of the slot at `index`.
    ///
    /// Pure arithmetic: indexes at or beyond the array yield the value the
    /// slot would have, which the iterators rely on when probing one step
    /// past the end.
    pub(crate) fn value_at_index(&self, index: usize) -> u64 {
        // The top half of bucket 0 maps to quotient 1, the (only stored)
        // top half of bucket 1 to quotient 2, and so on; subtracting one
        // leaves -1 for the bottom half of bucket 0.
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as isize - 1;
        let mut sub_bucket_index =
            (index as u32 & (self.sub_bucket_half_count - 1)) + self.sub_bucket_half_count;
        if bucket_index < 0 {
            // bottom half of bucket 0
            sub_bucket_index -= self.sub_bucket_half_count;
            bucket_index = 0;
        }
        self.value_from_parts(bucket_index as u8, sub_bucket_index)
    }

    pub(crate) fn count_at_index(&self, index: usize) -> Option<C> {
        self.counts.get(index).copied()
    }

    #[cfg(feature = "serialization")]
    pub(crate) fn set_count_at_index(&mut self, index: usize, count: C) -> Result<(), ()> {
        let slot = self.counts.get_mut(index).ok_or(())?;
        *slot = count;
        Ok(())
    }

    // ****************************************************************
    // Equivalence helpers
    // ****************************************************************

    /// The lowest value in `value`'s equivalence class: all values in the
    /// class are counted in the same slot.
    pub fn lowest_equivalent(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index_of(value);
        let sub_bucket_index = self.sub_bucket_index_of(value, bucket_index);
        self.value_from_parts(bucket_index, sub_bucket_index)
    }

    /// The highest value in `value`'s equivalence class (capped at
    /// `u64::max_value()`).
    pub fn highest_equivalent(&self, value: u64) -> u64 {
        if value == u64::max_value() {
            u64::max_value()
        } else {
            self.next_non_equivalent(value) - 1
        }
    }

    /// A value in the middle (rounded up) of `value`'s equivalence class.
    pub fn median_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.size_of_equivalent_range(value) >> 1)
    }

    /// The lowest value beyond `value`'s equivalence class (capped at
    /// `u64::max_value()`).
    pub fn next_non_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.size_of_equivalent_range(value))
    }

    /// The width, in value units, of `value`'s equivalence class. Always a
    /// power of two.
    pub fn size_of_equivalent_range(&self, value: u64) -> u64 {
        1_u64 << (self.unit_magnitude + self.bucket_index_of(value))
    }

    /// Whether `a` and `b` land in the same counter slot.
    pub fn values_are_equivalent(&self, a: u64, b: u64) -> bool {
        self.lowest_equivalent(a) == self.lowest_equivalent(b)
    }

    // ****************************************************************
    // Recording
    // ****************************************************************

    /// Record a single occurrence of `value`.
    ///
    /// Errors with [`RecordError::ValueOutOfRange`] (and records nothing) if
    /// `value` exceeds the highest trackable value.
    pub fn record(&mut self, value: u64) -> Result<(), RecordError> {
        self.record_n(value, C::one())
    }

    /// Record `count` occurrences of `value`.
    pub fn record_n(&mut self, value: u64, count: C) -> Result<(), RecordError> {
        let index = self.index_of(value).ok_or(RecordError::ValueOutOfRange)?;
        let slot = &mut self.counts[index];
        *slot = slot.saturating_add(count);
        self.total_count = self.total_count.saturating_add(count.as_u64());
        self.update_min_max(value);
        Ok(())
    }

    /// Record `value` while compensating for coordinated omission.
    ///
    /// In addition to `value` itself, one synthetic sample is recorded at
    /// each of `value - interval`, `value - 2 * interval`, … while the
    /// result stays at or above `interval`: the samples a periodic measurer
    /// would have observed had it not been blocked by the long one. No
    /// compensation happens when `interval` is zero or `value <= interval`.
    ///
    /// This at-record-time correction and the after-the-fact
    /// [`copy_corrected`](Histogram::copy_corrected) are two routes to the
    /// same correction; apply only one of them to a given data set.
    pub fn record_with_expected_interval(
        &mut self,
        value: u64,
        interval: u64,
    ) -> Result<(), RecordError> {
        self.record_n_with_expected_interval(value, C::one(), interval)
    }

    /// Record `count` occurrences of `value` while compensating for
    /// coordinated omission.
    ///
    /// See [`record_with_expected_interval`](Histogram::record_with_expected_interval).
    pub fn record_n_with_expected_interval(
        &mut self,
        value: u64,
        count: C,
        interval: u64,
    ) -> Result<(), RecordError> {
        self.record_n(value, count)?;
        if interval == 0 || value <= interval {
            return Ok(());
        }

        let mut missing = value - interval;
        while missing >= interval {
            self.record_n(missing, count)?;
            missing -= interval;
        }
        Ok(())
    }

    // ****************************************************************
    // Bulk operations
    // ****************************************************************

    /// Add every recorded count of `other` into this histogram.
    ///
    /// Errors (without mutating) if `other` holds values this histogram
    /// cannot represent.
    pub fn add<D: Counter>(&mut self, other: &Histogram<D>) -> Result<(), AdditionError> {
        let top = self.highest_equivalent(self.value_at_index(self.last_index()));
        if top < other.max() {
            return Err(AdditionError::OtherValueExceedsRange);
        }

        if self.bucket_count == other.bucket_count
            && self.sub_bucket_count == other.sub_bucket_count
            && self.unit_magnitude == other.unit_magnitude
        {
            // Identical slot layout: stream the arrays.
            let mut added: u64 = 0;
            for i in 0..other.counts.len() {
                let other_count = other.counts[i].as_u64();
                if other_count != 0 {
                    let slot = &mut self.counts[i];
                    *slot = slot.saturating_add(
                        C::from_u64(other_count).unwrap_or_else(C::max_value),
                    );
                    added = added.saturating_add(other_count);
                }
            }
            self.total_count = self.total_count.saturating_add(added);
            let other_max = other.max();
            if other_max > self.max() {
                self.update_max(other_max);
            }
            let other_min = other.min_non_zero();
            if other_min < self.min_non_zero() {
                self.update_min(other_min);
            }
        } else {
            // Different layouts: translate slot by slot through the values.
            for i in 0..other.counts.len() {
                let other_count = other.counts[i].as_u64();
                if other_count != 0 {
                    self.add_raw(other.value_at_index(i), other_count);
                }
            }
        }
        Ok(())
    }

    /// Record `count` occurrences of `value` where `value` is already known
    /// representable (range-checked by the caller).
    fn add_raw(&mut self, value: u64, count: u64) {
        let index = self.index_of_clamped(value);
        let slot = &mut self.counts[index];
        *slot = slot.saturating_add(C::from_u64(count).unwrap_or_else(C::max_value));
        self.total_count = self.total_count.saturating_add(count);
        self.update_min_max(value);
    }

    /// Subtract every recorded count of `subtrahend` from this histogram.
    ///
    /// Errors if the subtrahend holds values outside this histogram's range,
    /// or if some count would go negative (in which case counts below the
    /// offending value have already been subtracted).
    pub fn subtract<D: Counter>(
        &mut self,
        subtrahend: &Histogram<D>,
    ) -> Result<(), SubtractionError> {
        let top = self.highest_equivalent(self.value_at_index(self.last_index()));
        if top < subtrahend.max() {
            return Err(SubtractionError::SubtrahendValueExceedsRange);
        }

        for i in 0..subtrahend.counts.len() {
            let other_count = subtrahend.counts[i].as_u64();
            if other_count != 0 {
                let value = subtrahend.value_at_index(i);
                let index = self.index_of_clamped(value);
                let slot = &mut self.counts[index];
                let subtracted = C::from_u64(other_count)
                    .and_then(|c| slot.checked_sub(&c))
                    .ok_or(SubtractionError::SubtrahendCountExceedsMinuendCount)?;
                *slot = subtracted;
            }
        }

        // min, max and total all need re-deriving after removal.
        let len = self.counts.len();
        self.rescan(len);
        Ok(())
    }

    /// Clear all counts, statistics and timestamps, keeping the
    /// configuration.
    pub fn reset(&mut self) {
        for slot in &mut self.counts {
            *slot = C::zero();
        }
        self.total_count = 0;
        self.max_value = EMPTY_MAX;
        self.min_non_zero_value = EMPTY_MIN;
        self.start_timestamp_ms = 0;
        self.end_timestamp_ms = 0;
    }

    /// A deep copy of this histogram. Equivalent to `clone()`.
    pub fn copy(&self) -> Histogram<C> {
        self.clone()
    }

    /// Overwrite `target` with this histogram's configuration-compatible
    /// contents and timestamps.
    pub fn copy_into(&self, target: &mut Histogram<C>) -> Result<(), AdditionError> {
        target.reset();
        target.add(self)?;
        target.start_timestamp_ms = self.start_timestamp_ms;
        target.end_timestamp_ms = self.end_timestamp_ms;
        Ok(())
    }

    /// A copy with coordinated-omission correction applied: for every
    /// recorded value above `interval`, the copy gains synthetic samples at
    /// each expected interval below it, mirroring what
    /// [`record_with_expected_interval`](Histogram::record_with_expected_interval)
    /// would have produced at record time. The replay works from each
    /// recorded range's highest equivalent value, so the synthesized chain
    /// can sit up to one equivalence range above the live-corrected one.
    pub fn copy_corrected(&self, interval: u64) -> Histogram<C> {
        let mut corrected = Histogram::new_from(self);
        for v in self.recorded_values() {
            corrected
                .record_n_with_expected_interval(
                    v.value_iterated_to(),
                    C::from_u64(v.count_at_value()).unwrap_or_else(C::max_value),
                    interval,
                )
                .expect("same configuration, all values representable");
        }
        corrected
    }

    // ****************************************************************
    // Statistics
    // ****************************************************************

    /// The total number of recorded samples.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// `true` if no samples have been recorded.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// The lowest recorded value, or 0 if none were recorded (or if 0 itself
    /// was recorded).
    pub fn min(&self) -> u64 {
        if self.total_count == 0 || self.counts[0] != C::zero() {
            0
        } else {
            self.min_non_zero()
        }
    }

    /// The lowest recorded non-zero value, rounded to its equivalence
    /// class's lowest value; `u64::max_value()` if none were recorded.
    pub fn min_non_zero(&self) -> u64 {
        if self.min_non_zero_value == EMPTY_MIN {
            EMPTY_MIN
        } else {
            self.lowest_equivalent(self.min_non_zero_value)
        }
    }

    /// The highest recorded value, rounded to its equivalence class's
    /// highest value; 0 if none were recorded.
    pub fn max(&self) -> u64 {
        if self.max_value == EMPTY_MAX {
            EMPTY_MAX
        } else {
            self.highest_equivalent(self.max_value)
        }
    }

    /// The count recorded in the equivalence class of `value`. Values beyond
    /// the representable range are clamped to the last slot.
    pub fn count_at_value(&self, value: u64) -> u64 {
        self.counts[self.index_of_clamped(value)].as_u64()
    }

    /// The total count recorded between `low` and `high` inclusive, to the
    /// histogram's resolution: the range actually summed is
    /// `lowest_equivalent(low) ..= highest_equivalent(high)`. Saturates at
    /// `u64::max_value()`.
    pub fn count_between(&self, low: u64, high: u64) -> u64 {
        let low_index = self.index_of_clamped(low);
        let high_index = self.index_of_clamped(high);
        self.counts[low_index..=high_index]
            .iter()
            .fold(0_u64, |t, c| t.saturating_add(c.as_u64()))
    }

    /// The value at the given percentile of the recorded distribution.
    ///
    /// For `percentile > 0`, the returned value is the one at least the
    /// given percentage of samples are smaller than or equivalent to,
    /// reported as the highest value of its equivalence class. For
    /// `percentile == 0`, the lowest recorded non-zero value, reported as
    /// the lowest value of its class. Percentiles above 100 are clamped;
    /// an empty histogram yields 0.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        let percentile = if percentile > 100.0 { 100.0 } else { percentile };

        let mut count_at_percentile =
            (percentile / 100.0 * self.total_count as f64).ceil() as u64;
        if count_at_percentile < 1 {
            // always reach at least the first recorded slot
            count_at_percentile = 1;
        }

        let mut cumulative: u64 = 0;
        for index in 0..self.counts.len() {
            cumulative = cumulative.saturating_add(self.counts[index].as_u64());
            if cumulative >= count_at_percentile {
                let value = self.value_at_index(index);
                return if percentile == 0.0 {
                    self.lowest_equivalent(value)
                } else {
                    self.highest_equivalent(value)
                };
            }
        }
        0
    }

    /// The percentage of recorded samples at or below `value` (equivalence
    /// respected). 100.0 for an empty histogram.
    pub fn percentile_at_or_below(&self, value: u64) -> f64 {
        if self.total_count == 0 {
            return 100.0;
        }
        let target = self.index_of_clamped(value);
        let below: u64 = self.counts[..=target]
            .iter()
            .fold(0_u64, |t, c| t.saturating_add(c.as_u64()));
        100.0 * below as f64 / self.total_count as f64
    }

    /// The mean of all recorded values, using the median of each equivalence
    /// class. 0.0 for an empty histogram.
    pub fn mean(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mut sum = 0.0_f64;
        for index in 0..self.counts.len() {
            let count = self.counts[index].as_u64();
            if count != 0 {
                sum += self.median_equivalent(self.value_at_index(index)) as f64 * count as f64;
            }
        }
        sum / self.total_count as f64
    }

    /// The standard deviation of all recorded values, using the median of
    /// each equivalence class. 0.0 for an empty histogram.
    pub fn std_deviation(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let mut geometric_deviation_sum = 0.0_f64;
        for index in 0..self.counts.len() {
            let count = self.counts[index].as_u64();
            if count != 0 {
                let deviation =
                    self.median_equivalent(self.value_at_index(index)) as f64 - mean;
                geometric_deviation_sum += deviation * deviation * count as f64;
            }
        }
        (geometric_deviation_sum / self.total_count as f64).sqrt()
    }

    // ****************************************************************
    // Overflow audit
    // ****************************************************************

    /// Whether some counter saturated, leaving `total_count` out of sync
    /// with the sum of the counts array. Only reachable with the 16- and
    /// 32-bit counter widths. O(counts array length).
    pub fn has_overflowed(&self) -> bool {
        self.total_count != self.summed_count()
    }

    /// Re-derive `total_count` from the counts array, clearing
    /// [`has_overflowed`](Histogram::has_overflowed).
    pub fn reestablish_total_count(&mut self) {
        self.total_count = self.summed_count();
    }

    fn summed_count(&self) -> u64 {
        self.counts
            .iter()
            .fold(0_u64, |t, c| t.saturating_add(c.as_u64()))
    }

    // ****************************************************************
    // Timestamps
    // ****************************************************************

    /// The interval start timestamp, in milliseconds since some host-defined
    /// epoch. 0 when unset.
    pub fn start_timestamp(&self) -> u64 {
        self.start_timestamp_ms
    }

    /// Set the interval start timestamp, in milliseconds.
    pub fn set_start_timestamp(&mut self, timestamp_ms: u64) {
        self.start_timestamp_ms = timestamp_ms;
    }

    /// The interval end timestamp, in milliseconds. 0 when unset.
    pub fn end_timestamp(&self) -> u64 {
        self.end_timestamp_ms
    }

    /// Set the interval end timestamp, in milliseconds.
    pub fn set_end_timestamp(&mut self, timestamp_ms: u64) {
        self.end_timestamp_ms = timestamp_ms;
    }

    // ****************************************************************
    // Iterators
    // ****************************************************************

    /// Walk every equivalence class with at least one recorded sample, in
    /// ascending value order.
    ///
    /// The walk works against the total count observed at construction;
    /// since it borrows the histogram for its whole lifetime, the histogram
    /// cannot change underneath it.
    pub fn recorded_values(&self) -> HistogramWalker<'_, C, RecordedSteps> {
        HistogramWalker::new(self, RecordedSteps::new())
    }

    /// Walk every slot of the counts array in ascending value order, whether
    /// or not it holds samples.
    pub fn all_values(&self) -> HistogramWalker<'_, C, AllSteps> {
        HistogramWalker::new(self, AllSteps::new())
    }

    /// Walk the value range in fixed steps of `value_units_per_bucket`,
    /// yielding the count accumulated in each step. The walk ends once all
    /// recorded counts have been reported and the next step would leave the
    /// last populated slot.
    ///
    /// A count recorded in the equivalence range straddling a step boundary
    /// is attributed to the step that closes at that boundary.
    ///
    /// Panics if `value_units_per_bucket` is zero.
    pub fn linear_bucket_values(
        &self,
        value_units_per_bucket: u64,
    ) -> HistogramWalker<'_, C, LinearSteps<'_, C>> {
        HistogramWalker::new(self, LinearSteps::new(self, value_units_per_bucket))
    }

    /// Walk the value range in steps that start at
    /// `value_units_in_first_bucket` and grow by `log_base` per step.
    ///
    /// Panics if `value_units_in_first_bucket` is zero or `log_base <= 1.0`.
    pub fn logarithmic_bucket_values(
        &self,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> HistogramWalker<'_, C, LogarithmicSteps<'_, C>> {
        HistogramWalker::new(
            self,
            LogarithmicSteps::new(self, value_units_in_first_bucket, log_base),
        )
    }

    /// Walk the distribution by percentile levels, with
    /// `ticks_per_half_distance` reporting steps per halving of the distance
    /// to 100%. Resolution therefore doubles as the walk approaches 100%,
    /// which reads uniformly in `-log10(1 - percentile/100)` space. One
    /// final step is always emitted at exactly 100%.
    ///
    /// Panics if `ticks_per_half_distance` is zero.
    pub fn percentiles(
        &self,
        ticks_per_half_distance: u32,
    ) -> HistogramWalker<'_, C, PercentileSteps> {
        HistogramWalker::new(self, PercentileSteps::new(ticks_per_half_distance))
    }

    // ****************************************************************
    // Internal state maintenance
    // ****************************************************************

    fn update_max(&mut self, value: u64) {
        // track the highest unit-equivalent value so the getter can round up
        let internal = value | self.unit_magnitude_mask;
        if internal > self.max_value {
            self.max_value = internal;
        }
    }

    fn update_min(&mut self, value: u64) {
        if value <= self.unit_magnitude_mask {
            return; // unit-equivalent to 0
        }
        let internal = value & !self.unit_magnitude_mask;
        if internal < self.min_non_zero_value {
            self.min_non_zero_value = internal;
        }
    }

    fn update_min_max(&mut self, value: u64) {
        if value > self.max_value {
            self.update_max(value);
        }
        if value != 0 && value < self.min_non_zero_value {
            self.update_min(value);
        }
    }

    /// Re-derive min, max and total count by scanning the first
    /// `length_to_scan` slots.
    pub(crate) fn rescan(&mut self, length_to_scan: usize) {
        self.max_value = EMPTY_MAX;
        self.min_non_zero_value = EMPTY_MIN;

        let mut total: u64 = 0;
        let mut min_index = None;
        let mut max_index = None;

        assert!(length_to_scan <= self.counts.len());
        for index in 0..length_to_scan {
            let count = self.counts[index].as_u64();
            if count != 0 {
                total = total.saturating_add(count);
                max_index = Some(index);
                if min_index.is_none() && index != 0 {
                    min_index = Some(index);
                }
            }
        }

        if let Some(index) = max_index {
            let max = self.highest_equivalent(self.value_at_index(index));
            self.update_max(max);
        }
        if let Some(index) = min_index {
            let min = self.value_at_index(index);
            self.update_min(min);
        }
        self.total_count = total;
    }
}

impl<C: Counter> Clone for Histogram<C> {
    fn clone(&self) -> Self {
        Histogram {
            counts: self.counts.clone(),
            ..*self
        }
    }
}

/// Structural equality: same configuration, same total count, same counts.
/// Timestamps are not part of the comparison.
impl<C: Counter> PartialEq for Histogram<C> {
    fn eq(&self, other: &Histogram<C>) -> bool {
        self.lowest_discernible_value == other.lowest_discernible_value
            && self.highest_trackable_value == other.highest_trackable_value
            && self.significant_value_digits == other.significant_value_digits
            && self.total_count == other.total_count
            && self.counts == other.counts
    }
}

// record / add / subtract sugar; these are the unwrapping forms of the
// corresponding methods and panic where those would error.

impl<C: Counter> AddAssign<u64> for Histogram<C> {
    fn add_assign(&mut self, value: u64) {
        self.record(value).unwrap();
    }
}

impl<'a, C: Counter, D: Counter> AddAssign<&'a Histogram<D>> for Histogram<C> {
    fn add_assign(&mut self, other: &'a Histogram<D>) {
        self.add(other).unwrap();
    }
}

impl<'a, C: Counter, D: Counter> SubAssign<&'a Histogram<D>> for Histogram<C> {
    fn sub_assign(&mut self, other: &'a Histogram<D>) {
        self.subtract(other).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_for_three_digits_hour_range() {
        let h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        assert_eq!(h.sub_bucket_count(), 2048);
        assert_eq!(h.bucket_count(), 22);
        assert_eq!(h.counts_array_length(), 23 * 1024);
        assert_eq!(h.unit_magnitude, 0);
    }

    #[test]
    fn config_minimal() {
        let h = Histogram::<u64>::new_with_bounds(1, 2, 0).unwrap();
        // 0 digits need single-unit resolution to 2, so 2 sub-buckets
        assert_eq!(h.sub_bucket_count(), 2);
        assert_eq!(h.bucket_count(), 2);
        assert_eq!(h.counts_array_length(), 3);
    }

    #[test]
    fn config_unit_magnitude_from_low() {
        let h = Histogram::<u64>::new_with_bounds(1024, 1_000_000, 3).unwrap();
        assert_eq!(h.unit_magnitude, 10);
        assert_eq!(h.unit_magnitude_mask, 1023);
    }

    #[test]
    fn config_low_not_power_of_two_rounds_down() {
        let h = Histogram::<u64>::new_with_bounds(1000, 1_000_000, 3).unwrap();
        // 2^9 = 512 <= 1000 < 1024
        assert_eq!(h.unit_magnitude, 9);
    }

    #[test]
    fn construction_errors() {
        assert_eq!(
            Histogram::<u64>::new_with_bounds(0, 100, 3).unwrap_err(),
            CreationError::LowIsZero
        );
        assert_eq!(
            Histogram::<u64>::new_with_bounds(10, 19, 3).unwrap_err(),
            CreationError::HighLessThanTwiceLow
        );
        assert_eq!(
            Histogram::<u64>::new_with_bounds(1, 100, 6).unwrap_err(),
            CreationError::SigFigExceedsMax
        );
        assert_eq!(
            Histogram::<u64>::new_with_bounds(u64::max_value() / 2 + 1, u64::max_value(), 3)
                .unwrap_err(),
            CreationError::LowExceedsMax
        );
        assert_eq!(
            Histogram::<u64>::new_with_bounds(1 << 60, u64::max_value(), 5).unwrap_err(),
            CreationError::CannotRepresentSigFigBeyondLow
        );
    }

    #[test]
    fn index_round_trip_through_values() {
        let h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        for &value in &[
            1,
            2,
            1000,
            2047,
            2048,
            2049,
            10_000,
            99_999,
            1_000_000,
            3_600_000_000,
        ] {
            let index = h.index_of(value).unwrap();
            assert_eq!(h.value_at_index(index), h.lowest_equivalent(value));
        }
    }

    #[test]
    fn index_of_bucket_boundaries() {
        let h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        // bucket 0 uses all 2048 slots
        assert_eq!(h.index_of(0).unwrap(), 0);
        assert_eq!(h.index_of(2047).unwrap(), 2047);
        // bucket 1 starts in the upper half
        assert_eq!(h.index_of(2048).unwrap(), 2048);
        assert_eq!(h.index_of(2049).unwrap(), 2048);
        assert_eq!(h.index_of(4095).unwrap(), 3071);
        assert_eq!(h.index_of(4096).unwrap(), 3072);
    }

    #[test]
    fn index_of_rejects_above_highest() {
        let h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        assert!(h.index_of(10_000).is_some());
        assert!(h.index_of(10_001).is_none());
    }

    #[test]
    fn equivalence_ranges_are_powers_of_two() {
        let h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        for &value in &[1, 1000, 2048, 4096, 10_000, 1_000_000, 3_000_000_000] {
            let range = h.size_of_equivalent_range(value);
            assert!(range.is_power_of_two());
            assert!(h.values_are_equivalent(value, h.lowest_equivalent(value)));
            assert_eq!(
                h.highest_equivalent(value),
                h.lowest_equivalent(value) + range - 1
            );
            assert_eq!(
                h.median_equivalent(value),
                h.lowest_equivalent(value) + (range >> 1)
            );
        }
    }

    #[test]
    fn scaled_equivalence_uses_unit_magnitude() {
        let h = Histogram::<u64>::new_with_bounds(1024, 3_600_000_000, 3).unwrap();
        assert_eq!(h.lowest_equivalent(1024), 1024);
        assert_eq!(h.size_of_equivalent_range(1024), 1024);
        assert_eq!(h.highest_equivalent(2000), 2047);
    }

    #[test]
    fn record_boundaries() {
        let mut h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        assert!(h.record(10_000).is_ok());
        assert_eq!(h.record(10_001), Err(RecordError::ValueOutOfRange));
        // the failed record did not touch state
        assert_eq!(h.total_count(), 1);
        assert_eq!(h.max(), h.highest_equivalent(10_000));
    }

    #[test]
    fn record_zero() {
        let mut h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        h.record(0).unwrap();
        assert_eq!(h.count_at_value(0), 1);
        assert_eq!(h.min(), 0);
    }

    #[test]
    fn min_max_tracking() {
        let mut h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        h.record(1000).unwrap();
        h.record(100_000_000).unwrap();
        assert_eq!(h.min(), 1000);
        assert_eq!(h.min_non_zero(), 1000);
        assert!(h.values_are_equivalent(h.max(), 100_000_000));
    }

    #[test]
    fn reset_clears_everything() {
        let mut h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        h.record(5).unwrap();
        h.set_start_timestamp(123);
        h.set_end_timestamp(456);
        h.reset();
        assert_eq!(h.total_count(), 0);
        assert!(!h.has_overflowed());
        assert_eq!(h.max(), 0);
        assert_eq!(h.min_non_zero(), u64::max_value());
        assert_eq!(h.start_timestamp(), 0);
        assert_eq!(h.end_timestamp(), 0);
    }

    #[test]
    fn short_counter_saturates_and_overflow_is_audited() {
        let mut h = ShortHistogram::new_with_max(10_000, 2).unwrap();
        for _ in 0..u64::from(u16::max_value()) {
            h.record(100).unwrap();
        }
        assert!(!h.has_overflowed());
        h.record(100).unwrap();
        assert_eq!(h.count_at_value(100), u64::from(u16::max_value()));
        assert_eq!(h.total_count(), u64::from(u16::max_value()) + 1);
        assert!(h.has_overflowed());

        h.reestablish_total_count();
        assert_eq!(h.total_count(), u64::from(u16::max_value()));
        assert!(!h.has_overflowed());
    }

    #[test]
    fn clone_equals_source() {
        let mut h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        for value in (0..10_000).step_by(7) {
            h.record(value).unwrap();
        }
        let copy = h.copy();
        assert_eq!(h, copy);
    }

    #[test]
    fn copy_into_overwrites() {
        let mut h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        h.record(42).unwrap();
        h.set_start_timestamp(7);
        let mut target = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        target.record(9_999).unwrap();
        h.copy_into(&mut target).unwrap();
        assert_eq!(h, target);
        assert_eq!(target.start_timestamp(), 7);
    }

    #[test]
    fn add_then_subtract_round_trips() {
        let mut h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
        h.record_n(100, 5).unwrap();
        h.record_n(54_321, 2).unwrap();

        let mut doubled = h.clone();
        doubled.add(&h).unwrap();
        assert_eq!(doubled.count_at_value(100), 10);
        assert_eq!(doubled.total_count(), 2 * h.total_count());

        doubled.subtract(&h).unwrap();
        assert_eq!(doubled, h);
    }

    #[test]
    fn add_rejects_wider_range() {
        let mut small = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        let mut big = Histogram::<u64>::new_with_max(1_000_000, 3).unwrap();
        big.record(999_999).unwrap();
        assert_eq!(
            small.add(&big),
            Err(AdditionError::OtherValueExceedsRange)
        );
        assert!(small.is_empty());
    }

    #[test]
    fn add_translates_across_configurations() {
        let mut coarse = Histogram::<u64>::new_with_max(1_000_000, 2).unwrap();
        let mut fine = Histogram::<u64>::new_with_max(1_000_000, 4).unwrap();
        fine.record_n(54_321, 3).unwrap();
        coarse.add(&fine).unwrap();
        assert_eq!(coarse.count_at_value(54_321), 3);
        assert_eq!(coarse.total_count(), 3);
    }

    #[test]
    fn subtract_rejects_negative_counts() {
        let mut h = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        h.record_n(100, 1).unwrap();
        let mut other = Histogram::<u64>::new_with_max(10_000, 3).unwrap();
        other.record_n(100, 2).unwrap();
        assert_eq!(
            h.subtract(&other),
            Err(SubtractionError::SubtrahendCountExceedsMinuendCount)
        );
    }

    #[test]
    fn subtract_rescans_min_max() {
        let mut h = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
        h.record(10).unwrap();
        h.record(99_000).unwrap();
        let mut spike = Histogram::<u64>::new_with_max(100_000, 3).unwrap();
        spike.record(99_000).unwrap();
        h.subtract(&spike).unwrap();
        assert_eq!(h.total_count(), 1);
        assert!(h.values_are_equivalent(h.max(), 10));
        assert_eq!(h.min_non_zero(), 10);
    }

    #[test]
    fn corrected_copy_matches_corrected_recording() {
        // 32 767 is the top of its equivalence range, so the corrected copy
        // (which replays each recorded range from its highest value) and
        // live correction synthesize identical chains
        let mut raw = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        let mut live = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        for _ in 0..100 {
            raw.record(1000).unwrap();
            live.record_with_expected_interval(1000, 10_000).unwrap();
        }
        raw.record(32_767).unwrap();
        live.record_with_expected_interval(32_767, 10_000).unwrap();

        assert_eq!(raw.copy_corrected(10_000), live);
    }

    #[test]
    fn value_percentile_round_trip_property() {
        let mut h = Histogram::<u64>::new_with_max(3_600_000_000, 3).unwrap();
        for value in &[1_u64, 500, 1000, 50_000, 5_000_000, 3_000_000_000] {
            h.record(*value).unwrap();
        }
        for p in &[0.0, 10.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.99, 100.0] {
            let v = h.value_at_percentile(*p);
            assert!(h.percentile_at_or_below(v) >= *p);
            assert!(v <= h.value_at_percentile(100.0));
        }
    }
}
