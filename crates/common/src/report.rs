//! Aggregate counters returned by ingest entry points.

use serde::Serialize;

/// Outcome of one ingestion run. A single bad record never raises; it is
/// counted here and the run continues.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Records normalized and written (including idempotent no-op rewrites).
    pub processed: usize,
    /// Records dropped by policy or filtering (not an error).
    pub skipped: usize,
    /// Records that failed to parse or validate.
    pub errors: usize,
}

impl IngestReport {
    /// Fold another report into this one (per-file reports into a run total).
    pub fn merge(&mut self, other: IngestReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_sums_all_counters() {
        let mut total = IngestReport {
            processed: 2,
            skipped: 1,
            errors: 0,
        };
        total.merge(IngestReport {
            processed: 3,
            skipped: 0,
            errors: 4,
        });
        assert_eq!(total, IngestReport {
            processed: 5,
            skipped: 1,
            errors: 4,
        });
    }
}
