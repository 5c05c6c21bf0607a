//! The logarithmic step policy.

use crate::iterators::{StepPolicy, WalkPosition};
use crate::{Counter, Histogram};

/// Emits at exponentially growing value steps.
///
/// The first step closes at `value_units_in_first_bucket`; every following
/// boundary is the previous one multiplied by `log_base`. Boundary
/// attribution matches the linear policy: the equivalence range straddling a
/// boundary belongs to the step closing there.
pub struct LogarithmicSteps<'a, C: Counter> {
    hist: &'a Histogram<C>,
    // grows strictly, since log_base > 1
    next_boundary: f64,
    log_base: f64,
}

impl<'a, C: Counter> LogarithmicSteps<'a, C> {
    pub(crate) fn new(
        hist: &'a Histogram<C>,
        value_units_in_first_bucket: u64,
        log_base: f64,
    ) -> LogarithmicSteps<'a, C> {
        assert!(
            value_units_in_first_bucket > 0,
            "value_units_in_first_bucket must be > 0"
        );
        assert!(log_base > 1.0, "log_base must be > 1.0");
        LogarithmicSteps {
            hist,
            next_boundary: value_units_in_first_bucket as f64,
            log_base,
        }
    }

    fn boundary(&self) -> u64 {
        self.next_boundary as u64
    }
}

impl<'a, C: Counter> StepPolicy for LogarithmicSteps<'a, C> {
    fn reached_target(&mut self, position: &WalkPosition) -> bool {
        position.value() >= self.hist.lowest_equivalent(self.boundary())
            || position.index() == position.last_index()
    }

    fn advance_target(&mut self, _position: &WalkPosition) {
        self.next_boundary *= self.log_base;
    }

    fn value_to_report(&self, _position: &WalkPosition) -> u64 {
        self.boundary() - 1
    }

    fn keep_stepping(&mut self, position: &WalkPosition) -> bool {
        self.hist.lowest_equivalent(self.boundary()) < position.next_value()
    }
}
