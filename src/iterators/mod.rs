//! Walks over a histogram's value range.
//!
//! All iteration is built on one scaffold, [`HistogramWalker`], which visits
//! the counts array in ascending value order, skips the duplicated lower
//! half of every bucket after the first (those slots simply do not exist in
//! the array), and accumulates running totals. What differs between the five
//! iteration flavors is only *where* emissions happen, which a
//! [`StepPolicy`] decides.
//!
//! A peculiarity inherited from the wire-compatible family of
//! implementations: an emission does not advance the walk, so a policy sees
//! the same position again right after reporting it. Policies that must
//! emit a position only once (recorded values, all values) track the last
//! emitted index themselves.

use crate::{Counter, Histogram};

pub mod all;
pub mod linear;
pub mod log;
pub mod percentile;
pub mod recorded;

/// One emission of a histogram walk.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationValue {
    value_iterated_to: u64,
    percentile: f64,
    percentile_iterated_to: f64,
    count_at_value: u64,
    count_since_last_iteration: u64,
    total_count_to_value: u64,
    total_value_to_value: u64,
}

impl IterationValue {
    /// The value level this emission reports, inclusive.
    pub fn value_iterated_to(&self) -> u64 {
        self.value_iterated_to
    }

    /// The percentage of all recorded samples at or below
    /// [`value_iterated_to`](IterationValue::value_iterated_to).
    pub fn percentile(&self) -> f64 {
        self.percentile
    }

    /// The percentile level the iteration was moving towards when it
    /// emitted. Differs from [`percentile`](IterationValue::percentile) for
    /// the percentile walk, where a heavily-loaded slot can overshoot the
    /// requested level.
    pub fn percentile_iterated_to(&self) -> f64 {
        self.percentile_iterated_to
    }

    /// The count recorded in the slot the walk stood on when emitting.
    pub fn count_at_value(&self) -> u64 {
        self.count_at_value
    }

    /// The count accumulated since the previous emission.
    pub fn count_since_last_iteration(&self) -> u64 {
        self.count_since_last_iteration
    }

    /// The total count accumulated up to and including the current slot.
    pub fn total_count_to_value(&self) -> u64 {
        self.total_count_to_value
    }

    /// The sum of `count * median equivalent value` accumulated up to and
    /// including the current slot.
    pub fn total_value_to_value(&self) -> u64 {
        self.total_value_to_value
    }
}

/// Where a walk currently stands; handed to [`StepPolicy`] hooks.
#[derive(Debug)]
pub struct WalkPosition {
    index: usize,
    last_index: usize,
    value: u64,
    next_value: u64,
    value_ceiling: u64,
    count_at_index: u64,
    cumulative_count: u64,
    cumulative_percentile: f64,
}

impl WalkPosition {
    /// The counts-array index the walk stands on.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The last valid counts-array index.
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    /// The value at the start of the current slot.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// The value at the start of the next slot (computed arithmetically even
    /// one step past the end of the array).
    pub fn next_value(&self) -> u64 {
        self.next_value
    }

    /// The highest value equivalent to the current slot's value.
    pub fn value_ceiling(&self) -> u64 {
        self.value_ceiling
    }

    /// The count recorded in the current slot.
    pub fn count_at_index(&self) -> u64 {
        self.count_at_index
    }

    /// The count accumulated up to and including the current slot.
    pub fn cumulative_count(&self) -> u64 {
        self.cumulative_count
    }

    /// The percentage of all recorded samples accumulated so far.
    pub fn cumulative_percentile(&self) -> f64 {
        self.cumulative_percentile
    }
}

/// The pluggable part of a histogram walk: decides where emissions happen,
/// what value and percentile they report, and whether the walk continues
/// past the last recorded count.
pub trait StepPolicy {
    /// Should the walk emit at the current position?
    fn reached_target(&mut self, position: &WalkPosition) -> bool;

    /// Move the policy's target forward; called right after an emission.
    fn advance_target(&mut self, position: &WalkPosition);

    /// The value an emission at this position reports. Defaults to the
    /// highest value equivalent to the current slot.
    fn value_to_report(&self, position: &WalkPosition) -> u64 {
        position.value_ceiling()
    }

    /// The percentile level an emission at this position reports. Defaults
    /// to the running cumulative percentile.
    fn percentile_to_report(&self, cumulative_percentile: f64) -> f64 {
        cumulative_percentile
    }

    /// Once every recorded count has been reported: should the walk keep
    /// stepping anyway? Policies may adjust their target here (the
    /// percentile walk uses this for its final 100% emission).
    fn keep_stepping(&mut self, _position: &WalkPosition) -> bool {
        false
    }
}

/// The iteration scaffold shared by all walk flavors.
///
/// Yields an [`IterationValue`] wherever its [`StepPolicy`] asks for one.
/// The walk works against the total count observed at construction; the
/// `&Histogram` borrow guarantees the histogram cannot be mutated while the
/// walk is alive.
pub struct HistogramWalker<'a, C: Counter, P: StepPolicy> {
    hist: &'a Histogram<C>,
    total_count: u64,
    current_index: usize,
    count_at_this_index: u64,
    cumulative_count: u64,
    cumulative_value: u64,
    prev_cumulative_count: u64,
    fresh_index: bool,
    ended: bool,
    policy: P,
}

impl<'a, C: Counter, P: StepPolicy> HistogramWalker<'a, C, P> {
    pub(crate) fn new(hist: &'a Histogram<C>, policy: P) -> HistogramWalker<'a, C, P> {
        HistogramWalker {
            hist,
            total_count: hist.total_count(),
            current_index: 0,
            count_at_this_index: 0,
            cumulative_count: 0,
            cumulative_value: 0,
            prev_cumulative_count: 0,
            fresh_index: true,
            ended: false,
            policy,
        }
    }

    fn walk_position(&self) -> WalkPosition {
        let value = self.hist.value_at_index(self.current_index);
        WalkPosition {
            index: self.current_index,
            last_index: self.hist.counts_array_length() - 1,
            value,
            next_value: self.hist.value_at_index(self.current_index + 1),
            value_ceiling: self.hist.highest_equivalent(value),
            count_at_index: self.count_at_this_index,
            cumulative_count: self.cumulative_count,
            cumulative_percentile: if self.total_count == 0 {
                100.0
            } else {
                100.0 * self.cumulative_count as f64 / self.total_count as f64
            },
        }
    }
}

impl<'a, C: Counter, P: StepPolicy> Iterator for HistogramWalker<'a, C, P> {
    type Item = IterationValue;

    fn next(&mut self) -> Option<IterationValue> {
        while !self.ended {
            if self.current_index >= self.hist.counts_array_length() {
                self.ended = true;
                return None;
            }

            if self.fresh_index {
                let count = self
                    .hist
                    .count_at_index(self.current_index)
                    .expect("index checked against array length")
                    .as_u64();
                self.count_at_this_index = count;
                self.cumulative_count = self.cumulative_count.saturating_add(count);
                let median = self
                    .hist
                    .median_equivalent(self.hist.value_at_index(self.current_index));
                self.cumulative_value = self
                    .cumulative_value
                    .saturating_add(count.saturating_mul(median));
                self.fresh_index = false;
            }

            let position = self.walk_position();

            if self.prev_cumulative_count == self.total_count
                && !self.policy.keep_stepping(&position)
            {
                // every recorded count has been reported and the policy does
                // not want trailing steps
                self.ended = true;
                return None;
            }

            if self.policy.reached_target(&position) {
                let emission = IterationValue {
                    value_iterated_to: self.policy.value_to_report(&position),
                    percentile: position.cumulative_percentile,
                    percentile_iterated_to: self
                        .policy
                        .percentile_to_report(position.cumulative_percentile),
                    count_at_value: position.count_at_index,
                    count_since_last_iteration: self.cumulative_count
                        - self.prev_cumulative_count,
                    total_count_to_value: self.cumulative_count,
                    total_value_to_value: self.cumulative_value,
                };
                self.policy.advance_target(&position);
                self.prev_cumulative_count = self.cumulative_count;
                // the walk does not advance past an emitted position; the
                // policy will see it again on the next call
                return Some(emission);
            }

            self.current_index += 1;
            self.fresh_index = true;
        }
        None
    }
}
