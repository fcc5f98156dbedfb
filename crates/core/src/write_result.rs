//! Result of a mutation

use serde::{Deserialize, Serialize};

/// Counters returned by every mutation
///
/// Each single-row mutation increments exactly one counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Rows deleted
    pub deleted: u64,
    /// Rows skipped
    pub skipped: u64,
    /// Rows that failed
    pub errors: u64,
    /// Message of the first failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
    /// Rows inserted
    pub inserted: u64,
    /// Rows replaced or updated
    pub replaced: u64,
    /// Rows written with identical content
    pub unchanged: u64,
}

impl WriteResult {
    /// Deleted rows
    pub fn deleted(n: u64) -> Self {
        Self {
            deleted: n,
            ..Self::default()
        }
    }

    /// Inserted rows
    pub fn inserted(n: u64) -> Self {
        Self {
            inserted: n,
            ..Self::default()
        }
    }

    /// Replaced rows
    pub fn replaced(n: u64) -> Self {
        Self {
            replaced: n,
            ..Self::default()
        }
    }

    /// Unchanged rows
    pub fn unchanged(n: u64) -> Self {
        Self {
            unchanged: n,
            ..Self::default()
        }
    }

    /// Skipped rows (nothing to mutate)
    pub fn skipped(n: u64) -> Self {
        Self {
            skipped: n,
            ..Self::default()
        }
    }

    /// A failed single-row mutation
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            errors: 1,
            skipped: 1,
            first_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Add another result's counters, keeping the earliest error message
    pub fn merge(&mut self, other: WriteResult) {
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.inserted += other.inserted;
        self.replaced += other.replaced;
        self.unchanged += other.unchanged;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
    }
}
