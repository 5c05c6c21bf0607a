//! The percentile step policy.

use crate::iterators::{StepPolicy, WalkPosition};

/// Emits at percentile levels whose resolution doubles on every halving of
/// the distance to 100%.
///
/// With `ticks_per_half_distance` ticks per half-distance, the level
/// following `p` is `p + 100 / (ticks * 2^(floor(log2(100/(100-p))) + 1))`:
/// fixed-size ticks within each half-distance, halved whenever the remaining
/// distance to 100% halves. Reading the emitted levels is uniform in
/// `-log10(1 - p/100)` space, which is what makes the high-percentile tail
/// legible.
///
/// After the last recorded count, exactly one additional emission is made at
/// the 100% level, even when the previous emission already reported 100%.
pub struct PercentileSteps {
    ticks_per_half_distance: u32,
    percentile_to_iterate_to: f64,
    reached_last_recorded: bool,
}

impl PercentileSteps {
    pub(crate) fn new(ticks_per_half_distance: u32) -> PercentileSteps {
        assert!(
            ticks_per_half_distance > 0,
            "ticks_per_half_distance must be > 0"
        );
        PercentileSteps {
            ticks_per_half_distance,
            percentile_to_iterate_to: 0.0,
            reached_last_recorded: false,
        }
    }
}

impl StepPolicy for PercentileSteps {
    fn reached_target(&mut self, position: &WalkPosition) -> bool {
        position.count_at_index() != 0
            && position.cumulative_percentile() >= self.percentile_to_iterate_to
    }

    fn advance_target(&mut self, _position: &WalkPosition) {
        // Number of times the distance to 100% has been halved so far: 1 at
        // 50%, 2 at 75%, 3 at 87.5%, … Each of the 2^halvings slices gets
        // ticks on both of its halves, hence the extra power of two. At the
        // final 100% level the tick count diverges and the step collapses
        // to zero, which is fine: the walk ends right after.
        let num_halvings = (100.0 / (100.0 - self.percentile_to_iterate_to))
            .log2()
            .floor();
        let total_ticks = f64::from(self.ticks_per_half_distance) * (2.0_f64).powf(num_halvings + 1.0);
        self.percentile_to_iterate_to += 100.0 / total_ticks;
    }

    fn percentile_to_report(&self, _cumulative_percentile: f64) -> f64 {
        self.percentile_to_iterate_to
    }

    fn keep_stepping(&mut self, position: &WalkPosition) -> bool {
        // one last step to exactly 100%
        if !self.reached_last_recorded && position.cumulative_count() > 0 {
            self.percentile_to_iterate_to = 100.0;
            self.reached_last_recorded = true;
            true
        } else {
            false
        }
    }
}
