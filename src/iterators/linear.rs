//! The linear step policy.

use crate::iterators::{StepPolicy, WalkPosition};
use crate::{Counter, Histogram};

/// Emits at fixed-size value steps.
///
/// Step `k` covers `[k * step, (k + 1) * step)` and closes at the exclusive
/// boundary `(k + 1) * step`; a count recorded in the equivalence range that
/// straddles the boundary is attributed to the closing step. The reported
/// value is the step's inclusive upper end.
pub struct LinearSteps<'a, C: Counter> {
    hist: &'a Histogram<C>,
    value_units_per_bucket: u64,
    next_boundary: u64,
}

impl<'a, C: Counter> LinearSteps<'a, C> {
    pub(crate) fn new(hist: &'a Histogram<C>, value_units_per_bucket: u64) -> LinearSteps<'a, C> {
        assert!(
            value_units_per_bucket > 0,
            "value_units_per_bucket must be > 0"
        );
        LinearSteps {
            hist,
            value_units_per_bucket,
            next_boundary: value_units_per_bucket,
        }
    }
}

impl<'a, C: Counter> StepPolicy for LinearSteps<'a, C> {
    fn reached_target(&mut self, position: &WalkPosition) -> bool {
        // also emit at the very last slot so counts in a final partial step
        // are not lost when the boundary lies beyond the array
        position.value() >= self.hist.lowest_equivalent(self.next_boundary)
            || position.index() == position.last_index()
    }

    fn advance_target(&mut self, _position: &WalkPosition) {
        self.next_boundary = self.next_boundary.saturating_add(self.value_units_per_bucket);
    }

    fn value_to_report(&self, _position: &WalkPosition) -> u64 {
        self.next_boundary - 1
    }

    fn keep_stepping(&mut self, position: &WalkPosition) -> bool {
        // not done while the next step would still land inside the slot the
        // walk stands on
        self.next_boundary < position.next_value()
    }
}
