use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one submitted extract, e.g. year plus entry number within the year.
///
/// Field order matters: the derived ordering is lexicographic on
/// `(period, sequence)`, which is the recency order used by [`is_newer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub period: i64,
    pub sequence: i64,
}

impl BatchKey {
    pub const fn new(period: i64, sequence: i64) -> Self {
        Self { period, sequence }
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.period, self.sequence)
    }
}

/// Whether data from `candidate` supersedes data stored from `stored`.
///
/// Ties are never newer, so the first batch applied under a key wins.
/// Every recency decision in the crate goes through this function.
pub fn is_newer(candidate: BatchKey, stored: BatchKey) -> bool {
    candidate > stored
}
