//! Error types for histogram construction and mutation.

use std::error::Error;
use std::fmt;

/// Errors that can occur when constructing a histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum CreationError {
    /// The lowest discernible value must be at least 1.
    LowIsZero,
    /// The lowest discernible value must be no larger than `u64::max_value() / 2`
    /// so that `2 * low` cannot overflow.
    LowExceedsMax,
    /// The highest trackable value must be at least twice the lowest
    /// discernible value.
    HighLessThanTwiceLow,
    /// The number of significant decimal digits must be in `[0, 5]`.
    SigFigExceedsMax,
    /// The configured precision cannot be represented above the lowest
    /// discernible value: the exponent of the largest power of two below the
    /// lowest value plus the bits needed for the requested digits must not
    /// exceed 63.
    CannotRepresentSigFigBeyondLow,
    /// The counts array for this configuration does not fit in `usize` on
    /// this platform.
    UsizeTypeTooSmall,
}

impl fmt::Display for CreationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CreationError::LowIsZero => write!(f, "lowest discernible value must be >= 1"),
            CreationError::LowExceedsMax => write!(
                f,
                "lowest discernible value must be <= u64::max_value() / 2"
            ),
            CreationError::HighLessThanTwiceLow => write!(
                f,
                "highest trackable value must be >= 2 * lowest discernible value"
            ),
            CreationError::SigFigExceedsMax => {
                write!(f, "number of significant digits must be in [0, 5]")
            }
            CreationError::CannotRepresentSigFigBeyondLow => write!(
                f,
                "cannot maintain the requested precision above the lowest discernible value"
            ),
            CreationError::UsizeTypeTooSmall => {
                write!(f, "counts array length does not fit in usize")
            }
        }
    }
}

impl Error for CreationError {}

/// Errors that can occur while recording a value.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum RecordError {
    /// The value exceeds the histogram's highest trackable value. Nothing
    /// was recorded.
    ValueOutOfRange,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RecordError::ValueOutOfRange => {
                write!(f, "value exceeds the highest trackable value")
            }
        }
    }
}

impl Error for RecordError {}

/// Errors that can occur when adding another histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum AdditionError {
    /// The other histogram contains recorded values that exceed this
    /// histogram's range.
    OtherValueExceedsRange,
}

impl fmt::Display for AdditionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdditionError::OtherValueExceedsRange => write!(
                f,
                "the other histogram contains values outside this histogram's range"
            ),
        }
    }
}

impl Error for AdditionError {}

/// Errors that can occur when subtracting another histogram.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum SubtractionError {
    /// The subtrahend contains recorded values that exceed this histogram's
    /// range.
    SubtrahendValueExceedsRange,
    /// The subtrahend has a higher count than this histogram at some value;
    /// counts cannot go negative. Counts below the offending value have
    /// already been subtracted when this is returned.
    SubtrahendCountExceedsMinuendCount,
}

impl fmt::Display for SubtractionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubtractionError::SubtrahendValueExceedsRange => write!(
                f,
                "the subtracted histogram contains values outside this histogram's range"
            ),
            SubtractionError::SubtrahendCountExceedsMinuendCount => write!(
                f,
                "the subtracted histogram has a higher count than this histogram at some value"
            ),
        }
    }
}

impl Error for SubtractionError {}
