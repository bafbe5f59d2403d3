//! Sorting diagnostics.

/// Metrics sink notified about sorting progress. All methods default to no-op.
pub trait SortMetrics {
    /// A row was pulled from the upstream.
    fn row_read(&mut self) {}

    /// A spill file was written.
    fn spill_written(&mut self, _rows: u64, _bytes: u64) {}

    /// A spill file was fully consumed and removed.
    fn spill_consumed(&mut self) {}

    /// A row was dropped as a duplicate of its predecessor.
    fn duplicate_dropped(&mut self) {}

    /// A row was pushed downstream.
    fn row_written(&mut self) {}
}

/// Metrics sink discarding everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl SortMetrics for NoopMetrics {}

/// Sorting run summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SortStats {
    /// Rows pulled from the upstream.
    pub rows_read: u64,
    /// Rows pushed downstream.
    pub rows_written: u64,
    /// Spill files created.
    pub spills: u64,
    /// Bytes written to spill files.
    pub spill_bytes: u64,
    /// Rows dropped by duplicate elimination, both at spill and at output time.
    pub duplicates_dropped: u64,
    /// The run was stopped by a cancel request.
    pub cancelled: bool,
}

impl SortMetrics for SortStats {
    fn row_read(&mut self) {
        self.rows_read += 1;
    }

    fn spill_written(&mut self, _rows: u64, bytes: u64) {
        self.spills += 1;
        self.spill_bytes += bytes;
    }

    fn duplicate_dropped(&mut self) {
        self.duplicates_dropped += 1;
    }

    fn row_written(&mut self) {
        self.rows_written += 1;
    }
}

/// Forwards every event to two sinks.
pub(crate) struct Tee<'a, 'b>(pub &'a mut dyn SortMetrics, pub &'b mut dyn SortMetrics);

impl SortMetrics for Tee<'_, '_> {
    fn row_read(&mut self) {
        self.0.row_read();
        self.1.row_read();
    }

    fn spill_written(&mut self, rows: u64, bytes: u64) {
        self.0.spill_written(rows, bytes);
        self.1.spill_written(rows, bytes);
    }

    fn spill_consumed(&mut self) {
        self.0.spill_consumed();
        self.1.spill_consumed();
    }

    fn duplicate_dropped(&mut self) {
        self.0.duplicate_dropped();
        self.1.duplicate_dropped();
    }

    fn row_written(&mut self) {
        self.0.row_written();
        self.1.row_written();
    }
}
