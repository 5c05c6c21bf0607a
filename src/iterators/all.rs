//! The all-values step policy.

use crate::iterators::{StepPolicy, WalkPosition};

/// Emits once for every slot of the counts array, recorded or not.
pub struct AllSteps {
    visited: Option<usize>,
}

impl AllSteps {
    pub(crate) fn new() -> AllSteps {
        AllSteps { visited: None }
    }
}

impl StepPolicy for AllSteps {
    fn reached_target(&mut self, position: &WalkPosition) -> bool {
        self.visited != Some(position.index())
    }

    fn advance_target(&mut self, position: &WalkPosition) {
        self.visited = Some(position.index());
    }

    fn keep_stepping(&mut self, _position: &WalkPosition) -> bool {
        // keep walking to the end of the array even after the last recorded
        // count; the index bound terminates the walk
        true
    }
}
