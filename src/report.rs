//! Textual percentile distribution output.

use std::io;

use crate::{Counter, Histogram};

/// Output style for [`Histogram::output_percentile_distribution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PercentileReportFormat {
    /// A right-aligned human-readable table followed by summary footer
    /// lines.
    Plain,
    /// Comma-separated values with a quoted header row.
    Csv,
}

impl<C: Counter> Histogram<C> {
    /// Write the recorded distribution to `sink` as a percentile table.
    ///
    /// The table is driven by the percentile walk (see
    /// [`percentiles`](Histogram::percentiles)) with
    /// `ticks_per_half_distance` reporting steps per halving of the distance
    /// to 100%. Values are divided by `value_unit_scaling_ratio` before
    /// printing (for example `1000.0` to report microsecond recordings in
    /// milliseconds) and printed with the histogram's configured number of
    /// significant digits as decimals.
    ///
    /// In [`Plain`](PercentileReportFormat::Plain) form the table carries
    /// the columns `Value`, `Percentile`, `TotalCount` and
    /// `1/(1-Percentile)` (the last column is omitted on the final 100%
    /// row), followed by footer lines with the mean, standard deviation,
    /// max, total count, and bucket geometry. In
    /// [`Csv`](PercentileReportFormat::Csv) form the same rows are emitted
    /// as comma-separated values under a quoted header, with `Infinity` in
    /// the last column of the 100% row and no footer.
    pub fn output_percentile_distribution<W: io::Write>(
        &self,
        sink: &mut W,
        ticks_per_half_distance: u32,
        value_unit_scaling_ratio: f64,
        format: PercentileReportFormat,
    ) -> io::Result<()> {
        match format {
            PercentileReportFormat::Plain => {
                self.plain_distribution(sink, ticks_per_half_distance, value_unit_scaling_ratio)
            }
            PercentileReportFormat::Csv => {
                self.csv_distribution(sink, ticks_per_half_distance, value_unit_scaling_ratio)
            }
        }
    }

    fn plain_distribution<W: io::Write>(
        &self,
        sink: &mut W,
        ticks_per_half_distance: u32,
        scale: f64,
    ) -> io::Result<()> {
        let decimals = usize::from(self.significant_value_digits());

        writeln!(
            sink,
            "{:>12} {:>14} {:>10} {:>14}\n",
            "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
        )?;

        for step in self.percentiles(ticks_per_half_distance) {
            let value = step.value_iterated_to() as f64 / scale;
            let quantile = step.percentile_iterated_to() / 100.0;
            if step.percentile_iterated_to() < 100.0 {
                writeln!(
                    sink,
                    "{:>12.*} {:>2.12} {:>10} {:>14.2}",
                    decimals,
                    value,
                    quantile,
                    step.total_count_to_value(),
                    1.0 / (1.0 - quantile),
                )?;
            } else {
                writeln!(
                    sink,
                    "{:>12.*} {:>2.12} {:>10}",
                    decimals,
                    value,
                    quantile,
                    step.total_count_to_value(),
                )?;
            }
        }

        writeln!(
            sink,
            "#[Mean    = {:>12.*}, StdDeviation   = {:>12.*}]",
            decimals,
            self.mean() / scale,
            decimals,
            self.std_deviation() / scale,
        )?;
        writeln!(
            sink,
            "#[Max     = {:>12.*}, Total count    = {:>12}]",
            decimals,
            self.max() as f64 / scale,
            self.total_count(),
        )?;
        writeln!(
            sink,
            "#[Buckets = {:>12}, SubBuckets     = {:>12}]",
            self.bucket_count(),
            self.sub_bucket_count(),
        )
    }

    fn csv_distribution<W: io::Write>(
        &self,
        sink: &mut W,
        ticks_per_half_distance: u32,
        scale: f64,
    ) -> io::Result<()> {
        let decimals = usize::from(self.significant_value_digits());

        writeln!(
            sink,
            "\"Value\",\"Percentile\",\"TotalCount\",\"1/(1-Percentile)\""
        )?;

        for step in self.percentiles(ticks_per_half_distance) {
            let value = step.value_iterated_to() as f64 / scale;
            let quantile = step.percentile_iterated_to() / 100.0;
            if step.percentile_iterated_to() < 100.0 {
                writeln!(
                    sink,
                    "{:.*},{:.12},{},{:.2}",
                    decimals,
                    value,
                    quantile,
                    step.total_count_to_value(),
                    1.0 / (1.0 - quantile),
                )?;
            } else {
                writeln!(
                    sink,
                    "{:.*},{:.12},{},Infinity",
                    decimals,
                    value,
                    quantile,
                    step.total_count_to_value(),
                )?;
            }
        }
        Ok(())
    }
}
