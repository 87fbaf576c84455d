//! Fixed-footprint log-bucketed histograms for latency and throughput analysis.
//!
//! A [Histogram] spreads an unsigned integer value domain across
//! logarithmically scaled buckets, so recording a value is O(1), memory is
//! fixed at construction, and every recorded value is preserved to a
//! configured number of significant figures. Cursors then walk the bucket
//! table to produce value-distribution and percentile reports without ever
//! re-scanning raw samples.
//!
//! # Examples
//!
//! ```
//! use loghist::Histogram;
//!
//! // Track one microsecond to one hour, to 3 significant figures.
//! let mut h = Histogram::new(1, 3_600_000_000, 3)?;
//!
//! // Record some request latencies.
//! for latency in [512u64, 480, 731, 205, 3_001] {
//!     h.record(latency)?;
//! }
//!
//! // Walk the distribution toward the tail.
//! for step in h.iter_percentiles(1.0) {
//!     println!("{:>12} {:>9.5}%", step.value_iterated_to, step.percentile);
//! }
//! # Ok::<(), loghist::Error>(())
//! ```
#[macro_use]
mod histogram;
mod analysis;
mod cursor;
mod serde;
use thiserror;

use std::fmt;

pub use cursor::{AllBuckets, AllBucketsCursor, Cursor, PercentileCursor, Percentiles, Recorded,
                 RecordedCursor, Snapshot, Step, Traversal};
pub use histogram::Histogram;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("lowest trackable value must be >= 1")]
    LowestValueTooSmall,
    #[error("highest trackable value must be >= 2 * lowest trackable value")]
    RangeTooNarrow,
    #[error("significant figures must be between 0 and 5")]
    PrecisionOutOfBounds,
    #[error("value {0} outside trackable range")]
    ValueOutOfRange(u64),
}

impl Error {
    /// This function returns the errno-style code reported alongside the
    /// message when errors cross a process or wire boundary.
    pub fn code(&self) -> i32 {
        match self {
            Error::ValueOutOfRange(_) => 34, // ERANGE
            _ => 22,                         // EINVAL
        }
    }
    /// This function returns a display adapter rendering the error as
    /// `<message> (<code>)`.
    pub fn with_code(&self) -> WithCode<'_> {
        WithCode(self)
    }
}

/// Display adapter returned by [Error::with_code].
pub struct WithCode<'a>(&'a Error);

impl fmt::Display for WithCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.0.code())
    }
}
