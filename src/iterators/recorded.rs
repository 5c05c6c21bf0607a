//! The recorded-values step policy.

use crate::iterators::{StepPolicy, WalkPosition};

/// Emits once for every slot holding at least one recorded sample.
pub struct RecordedSteps {
    visited: Option<usize>,
}

impl RecordedSteps {
    pub(crate) fn new() -> RecordedSteps {
        RecordedSteps { visited: None }
    }
}

impl StepPolicy for RecordedSteps {
    fn reached_target(&mut self, position: &WalkPosition) -> bool {
        position.count_at_index() != 0 && self.visited != Some(position.index())
    }

    fn advance_target(&mut self, position: &WalkPosition) {
        self.visited = Some(position.index());
    }
}
