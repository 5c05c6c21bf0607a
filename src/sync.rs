//! A mutex-guarded histogram for concurrent recording.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::errors::{AdditionError, CreationError, RecordError, SubtractionError};
use crate::Histogram;

/// Source of process-unique, monotonically increasing identities. Lives
/// here so the core histogram carries no process-wide state.
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(0);

/// A 64-bit-counter histogram shared between threads.
///
/// Every operation, mutating or reading, acquires the histogram's mutex,
/// so the whole API takes `&self` and the type is `Sync`. This is the
/// simple, always-consistent concurrency story: writers serialize on the
/// lock. If recording throughput on the shared lock becomes the bottleneck,
/// record into thread-local [`Histogram`]s and [`add`](SynchronizedHistogram::add)
/// them in periodically instead.
///
/// Two-histogram operations ([`add`](SynchronizedHistogram::add),
/// [`subtract`](SynchronizedHistogram::subtract)) need both locks; they are
/// always acquired in ascending `identity` order (a process-unique id
/// assigned at construction), so two threads adding in opposite directions
/// cannot deadlock.
///
/// ```
/// use hdrsketch::SynchronizedHistogram;
/// use std::sync::Arc;
/// use std::thread;
///
/// let hist = Arc::new(SynchronizedHistogram::new_with_max(1_000_000, 3).unwrap());
/// let workers: Vec<_> = (0..4)
///     .map(|_| {
///         let hist = Arc::clone(&hist);
///         thread::spawn(move || {
///             for value in 1..=1000 {
///                 hist.record(value).unwrap();
///             }
///         })
///     })
///     .collect();
/// for worker in workers {
///     worker.join().unwrap();
/// }
/// assert_eq!(hist.total_count(), 4000);
/// ```
#[derive(Debug)]
pub struct SynchronizedHistogram {
    identity: u64,
    inner: Mutex<Histogram<u64>>,
}

impl SynchronizedHistogram {
    /// Construct a synchronized histogram covering `[1, high]` with
    /// `sigfig` significant decimal digits.
    pub fn new_with_max(high: u64, sigfig: u8) -> Result<SynchronizedHistogram, CreationError> {
        Histogram::new_with_max(high, sigfig).map(Self::from_histogram)
    }

    /// Construct a synchronized histogram with explicit range bounds. See
    /// [`Histogram::new_with_bounds`].
    pub fn new_with_bounds(
        low: u64,
        high: u64,
        sigfig: u8,
    ) -> Result<SynchronizedHistogram, CreationError> {
        Histogram::new_with_bounds(low, high, sigfig).map(Self::from_histogram)
    }

    /// Wrap an existing histogram, contents included.
    pub fn from_histogram(histogram: Histogram<u64>) -> SynchronizedHistogram {
        SynchronizedHistogram {
            identity: NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed),
            inner: Mutex::new(histogram),
        }
    }

    /// Record a single occurrence of `value`.
    pub fn record(&self, value: u64) -> Result<(), RecordError> {
        self.lock().record(value)
    }

    /// Record `count` occurrences of `value`.
    pub fn record_n(&self, value: u64, count: u64) -> Result<(), RecordError> {
        self.lock().record_n(value, count)
    }

    /// Record `value` while compensating for coordinated omission. See
    /// [`Histogram::record_with_expected_interval`].
    pub fn record_with_expected_interval(
        &self,
        value: u64,
        interval: u64,
    ) -> Result<(), RecordError> {
        self.lock().record_with_expected_interval(value, interval)
    }

    /// Add every recorded count of `other` into this histogram.
    ///
    /// Both mutexes are taken, in ascending identity order: this
    /// histogram's first exactly when `self.identity < other.identity`.
    pub fn add(&self, other: &SynchronizedHistogram) -> Result<(), AdditionError> {
        if self.identity == other.identity {
            // adding a histogram to itself; a second acquisition would
            // deadlock, so double under one lock via a snapshot
            let mut mine = self.lock();
            let copy = mine.clone();
            return mine.add(&copy);
        }
        if self.identity < other.identity {
            let mut mine = self.lock();
            let theirs = other.lock();
            mine.add(&*theirs)
        } else {
            let theirs = other.lock();
            let mut mine = self.lock();
            mine.add(&*theirs)
        }
    }

    /// Subtract every recorded count of `subtrahend` from this histogram.
    /// Lock ordering as in [`add`](SynchronizedHistogram::add).
    pub fn subtract(&self, subtrahend: &SynchronizedHistogram) -> Result<(), SubtractionError> {
        if self.identity == subtrahend.identity {
            let mut mine = self.lock();
            let copy = mine.clone();
            return mine.subtract(&copy);
        }
        if self.identity < subtrahend.identity {
            let mut mine = self.lock();
            let theirs = subtrahend.lock();
            mine.subtract(&*theirs)
        } else {
            let theirs = subtrahend.lock();
            let mut mine = self.lock();
            mine.subtract(&*theirs)
        }
    }

    /// Clear all counts, statistics and timestamps.
    pub fn reset(&self) {
        self.lock().reset();
    }

    /// The total number of recorded samples.
    pub fn total_count(&self) -> u64 {
        self.lock().total_count()
    }

    /// The value at the given percentile. See
    /// [`Histogram::value_at_percentile`].
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        self.lock().value_at_percentile(percentile)
    }

    /// The highest recorded value. See [`Histogram::max`].
    pub fn max(&self) -> u64 {
        self.lock().max()
    }

    /// The lowest recorded non-zero value. See [`Histogram::min_non_zero`].
    pub fn min_non_zero(&self) -> u64 {
        self.lock().min_non_zero()
    }

    /// A point-in-time copy of the inner histogram, taken under the lock.
    /// The copy can be iterated, encoded and queried freely while recording
    /// continues.
    pub fn snapshot(&self) -> Histogram<u64> {
        self.lock().clone()
    }

    /// Acquire the inner histogram's lock directly, for operations this
    /// wrapper does not mirror (iteration, encoding, …). Recording in other
    /// threads blocks until the guard is dropped.
    pub fn lock(&self) -> MutexGuard<'_, Histogram<u64>> {
        self.inner.lock().unwrap()
    }

    /// Unwrap into the inner histogram.
    pub fn into_inner(self) -> Histogram<u64> {
        self.inner.into_inner().unwrap()
    }
}
