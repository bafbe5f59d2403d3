//! External row sorter.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{self, AtomicBool};
use std::sync::Arc;

use crate::buffer::RowBuffer;
use crate::codec::{RmpCodec, RowCodec};
use crate::key::{KeyComparator, KeySpec, KeySpecError, RowComparator};
use crate::merger::SpillMerger;
use crate::metrics::{SortMetrics, SortStats, Tee};
use crate::pipeline::{RowSink, RowSource};
use crate::row::Row;
use crate::spill::{SpillFile, SpillWriter};

/// Default number of rows kept in memory.
pub const DEFAULT_CAPACITY: usize = 5000;
/// Default spill file name prefix.
pub const DEFAULT_FILE_PREFIX: &str = "out";

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Invalid sorter configuration.
    Config(String),
    /// Invalid key fields.
    InvalidKeys(KeySpecError),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Row serialization error.
    SerializationError(Box<dyn Error + Send + Sync>),
    /// Row deserialization error.
    DeserializationError(Box<dyn Error + Send + Sync>),
    /// Upstream error.
    InputError(Box<dyn Error + Send + Sync>),
    /// Downstream error.
    OutputError(Box<dyn Error + Send + Sync>),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        let source: &(dyn Error + 'static) = match &self {
            SortError::Config(_) => return None,
            SortError::InvalidKeys(err) => err,
            SortError::TempDir(err) => err,
            SortError::IO(err) => err,
            SortError::SerializationError(err) => &**err,
            SortError::DeserializationError(err) => &**err,
            SortError::InputError(err) => &**err,
            SortError::OutputError(err) => &**err,
        };
        Some(source)
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            SortError::InvalidKeys(err) => write!(f, "invalid key fields: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "data serialization error: {}", err),
            SortError::DeserializationError(err) => write!(f, "data deserialization error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::OutputError(err) => write!(f, "output data stream error: {}", err),
        }
    }
}

/// Cooperative cancellation request shared between a running sorter and other threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Requests the sorter to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancelled.store(true, atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(atomic::Ordering::SeqCst)
    }
}

/// Row sorter builder. Provides methods for [`RowSorter`] initialization.
pub struct RowSorterBuilder<P = KeyComparator, C = RmpCodec>
where
    P: RowComparator,
    C: RowCodec,
{
    /// Maximum number of rows kept in memory.
    capacity: usize,
    /// Fields rows are sorted by.
    keys: KeySpec,
    /// Pass only rows with unique keys.
    unique: bool,
    /// Compress spill files.
    compress: bool,
    /// Directory to be used to store spill files.
    tmp_dir: Option<Box<Path>>,
    /// Spill file name prefix.
    prefix: String,
    /// Spill file read/write buffer size.
    rw_buf_size: Option<usize>,
    comparator: P,
    codec: C,
}

impl RowSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        RowSorterBuilder::default()
    }
}

impl Default for RowSorterBuilder {
    fn default() -> Self {
        RowSorterBuilder {
            capacity: DEFAULT_CAPACITY,
            keys: KeySpec::default(),
            unique: false,
            compress: false,
            tmp_dir: None,
            prefix: DEFAULT_FILE_PREFIX.to_owned(),
            rw_buf_size: None,
            comparator: KeyComparator,
            codec: RmpCodec,
        }
    }
}

impl<P, C> RowSorterBuilder<P, C>
where
    P: RowComparator,
    C: RowCodec,
{
    /// Builds a [`RowSorter`] instance using provided configuration.
    pub fn build(self) -> Result<RowSorter<P, C>, SortError> {
        RowSorter::new(
            self.capacity,
            self.keys,
            self.unique,
            self.compress,
            self.tmp_dir.as_deref(),
            self.prefix,
            self.rw_buf_size,
            self.comparator,
            self.codec,
        )
    }

    /// Sets maximum number of rows kept in memory before spilling them to disk.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        return self;
    }

    /// Sets fields rows are sorted by.
    pub fn with_keys(mut self, keys: impl Into<KeySpec>) -> Self {
        self.keys = keys.into();
        return self;
    }

    /// Enables or disables passing only rows with unique keys.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        return self;
    }

    /// Enables or disables spill file compression.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        return self;
    }

    /// Sets directory to be used to store spill files.
    pub fn with_tmp_dir(mut self, path: &Path) -> Self {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets spill file name prefix.
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        return self;
    }

    /// Sets spill file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> Self {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets row comparator.
    pub fn with_comparator<Q: RowComparator>(self, comparator: Q) -> RowSorterBuilder<Q, C> {
        RowSorterBuilder {
            capacity: self.capacity,
            keys: self.keys,
            unique: self.unique,
            compress: self.compress,
            tmp_dir: self.tmp_dir,
            prefix: self.prefix,
            rw_buf_size: self.rw_buf_size,
            comparator,
            codec: self.codec,
        }
    }

    /// Sets spill file row codec.
    pub fn with_codec<D: RowCodec>(self, codec: D) -> RowSorterBuilder<P, D> {
        RowSorterBuilder {
            capacity: self.capacity,
            keys: self.keys,
            unique: self.unique,
            compress: self.compress,
            tmp_dir: self.tmp_dir,
            prefix: self.prefix,
            rw_buf_size: self.rw_buf_size,
            comparator: self.comparator,
            codec,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Cancelled,
}

/// Sorted rows ready to be drained.
enum SortedRun<'a, C, F>
where
    C: RowCodec,
    F: Fn(&Row, &Row) -> Ordering,
{
    /// All the input fit in memory, no spill files were created.
    InMemory(std::vec::IntoIter<Row>),
    /// Input was spilled to disk.
    Spilled(SpillMerger<'a, C, F>),
}

impl<'a, C, F> SortedRun<'a, C, F>
where
    C: RowCodec,
    F: Fn(&Row, &Row) -> Ordering,
{
    fn next_row(&mut self, metrics: &mut dyn SortMetrics) -> Result<Option<Row>, SortError> {
        match self {
            SortedRun::InMemory(rows) => Ok(rows.next()),
            SortedRun::Spilled(merger) => merger.next_row(metrics),
        }
    }

    fn close(self) {
        if let SortedRun::Spilled(merger) = self {
            merger.close();
        }
    }
}

/// External row sorter.
///
/// Sorts an unbounded row stream keeping at most `capacity` rows in memory. Rows that don't fit
/// are sorted in runs and spilled to temporary files which are merged back when the upstream is
/// exhausted. Rows with equal keys keep their input order. A sorter is driven on the calling
/// thread and never spawns threads of its own.
pub struct RowSorter<P = KeyComparator, C = RmpCodec>
where
    P: RowComparator,
    C: RowCodec,
{
    capacity: usize,
    keys: KeySpec,
    unique: bool,
    compress: bool,
    tmp_dir: PathBuf,
    prefix: String,
    rw_buf_size: Option<usize>,
    comparator: P,
    codec: C,
    cancel: CancelToken,
}

impl RowSorter {
    /// Creates a sorter using the default comparator and codec.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of rows kept in memory
    /// * `keys` - Fields rows are sorted by
    /// * `unique` - Pass only rows with unique keys
    /// * `compress` - Compress spill files
    /// * `tmp_dir` - Directory to be used to store spill files
    /// * `prefix` - Spill file name prefix
    pub fn configure(
        capacity: usize,
        keys: KeySpec,
        unique: bool,
        compress: bool,
        tmp_dir: &Path,
        prefix: &str,
    ) -> Result<Self, SortError> {
        RowSorterBuilder::new()
            .with_capacity(capacity)
            .with_keys(keys)
            .with_unique(unique)
            .with_compression(compress)
            .with_tmp_dir(tmp_dir)
            .with_file_prefix(prefix)
            .build()
    }
}

impl<P, C> RowSorter<P, C>
where
    P: RowComparator,
    C: RowCodec,
{
    /// Creates a new row sorter instance.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of rows kept in memory, must be positive
    /// * `keys` - Fields rows are sorted by
    /// * `unique` - Pass only rows with unique keys
    /// * `compress` - Compress spill files
    /// * `tmp_path` - Directory to be used to store spill files. If parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `prefix` - Spill file name prefix
    /// * `rw_buf_size` - Spill file read/write buffer size
    /// * `comparator` - Row comparator
    /// * `codec` - Spill file row codec
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capacity: usize,
        keys: KeySpec,
        unique: bool,
        compress: bool,
        tmp_path: Option<&Path>,
        prefix: String,
        rw_buf_size: Option<usize>,
        comparator: P,
        codec: C,
    ) -> Result<Self, SortError> {
        if capacity == 0 {
            return Err(SortError::Config("sort capacity must be positive".to_owned()));
        }
        if rw_buf_size == Some(0) {
            return Err(SortError::Config("read/write buffer size must be positive".to_owned()));
        }
        keys.validate().map_err(SortError::InvalidKeys)?;

        let tmp_dir = Self::init_tmp_directory(tmp_path)?;
        log::info!(
            "sorter configured (capacity: {}, keys: {}, unique: {}, compress: {})",
            capacity,
            keys.fields().len(),
            unique,
            compress
        );

        return Ok(RowSorter {
            capacity,
            keys,
            unique,
            compress,
            tmp_dir,
            prefix,
            rw_buf_size,
            comparator,
            codec,
            cancel: CancelToken::new(),
        });
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<PathBuf, SortError> {
        let tmp_dir = match tmp_path {
            Some(tmp_path) => tmp_path.to_path_buf(),
            None => std::env::temp_dir(),
        };

        if !tmp_dir.is_dir() {
            return Err(SortError::TempDir(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", tmp_dir.display()),
            )));
        }

        log::info!("using {} as a temporary directory", tmp_dir.display());

        return Ok(tmp_dir);
    }

    /// Returns a token that can be used to cancel a running sort from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Requests the running sort to stop. Once cancelled, the sorter stays cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Sorts rows pulled from the `source` pushing them to the `sink` in key order.
    /// Returns sorting summary. A cancelled run returns successfully with
    /// [`SortStats::cancelled`] set and without signalling the end of stream to the `sink`.
    ///
    /// # Arguments
    /// * `source` - Upstream rows are pulled from
    /// * `sink` - Downstream sorted rows are pushed to
    pub fn run<S, K>(&self, source: &mut S, sink: &mut K) -> Result<SortStats, SortError>
    where
        S: RowSource,
        K: RowSink,
    {
        self.run_with_metrics(source, sink, &mut crate::metrics::NoopMetrics)
    }

    /// Same as [`RowSorter::run`] additionally reporting progress to the `metrics` sink.
    pub fn run_with_metrics<S, K>(
        &self,
        source: &mut S,
        sink: &mut K,
        metrics: &mut dyn SortMetrics,
    ) -> Result<SortStats, SortError>
    where
        S: RowSource,
        K: RowSink,
    {
        let mut stats = SortStats::default();

        let result = self.execute(source, sink, &mut Tee(&mut stats, metrics));
        match result {
            Ok(outcome) => {
                stats.cancelled = outcome == Outcome::Cancelled;
                if stats.cancelled {
                    log::info!("sorting cancelled (rows read: {}, written: {})", stats.rows_read, stats.rows_written);
                } else {
                    log::info!(
                        "sorting done (rows read: {}, written: {}, spills: {})",
                        stats.rows_read,
                        stats.rows_written,
                        stats.spills
                    );
                }
                Ok(stats)
            }
            Err(err) => {
                log::error!("sorting failed: {}", err);
                Err(err)
            }
        }
    }

    fn execute<S, K>(&self, source: &mut S, sink: &mut K, metrics: &mut dyn SortMetrics) -> Result<Outcome, SortError>
    where
        S: RowSource,
        K: RowSink,
    {
        let compare = |a: &Row, b: &Row| self.comparator.compare(a, b, &self.keys);

        let run = match self.ingest(source, &compare, metrics)? {
            Some(run) => run,
            None => return Ok(Outcome::Cancelled),
        };

        return self.drain(run, sink, &compare, metrics);
    }

    /// Pulls all the rows from the upstream spilling full buffers to disk.
    /// Returns [`None`] if cancelled.
    fn ingest<'a, S, F>(
        &'a self,
        source: &mut S,
        compare: F,
        metrics: &mut dyn SortMetrics,
    ) -> Result<Option<SortedRun<'a, C, F>>, SortError>
    where
        S: RowSource,
        F: Fn(&Row, &Row) -> Ordering + Copy,
    {
        let writer = SpillWriter::new(&self.tmp_dir, &self.prefix, self.compress, self.rw_buf_size, &self.codec);
        let mut buffer = RowBuffer::new(self.capacity);
        let mut spills: Vec<SpillFile> = Vec::new();
        let mut arity_checked = false;

        loop {
            if self.cancelled(&mut spills) {
                return Ok(None);
            }

            let row = match source.pull().map_err(|err| SortError::InputError(Box::new(err)))? {
                Some(row) => row,
                None => break,
            };

            if !arity_checked {
                self.keys.validate_arity(row.len()).map_err(SortError::InvalidKeys)?;
                arity_checked = true;
            }

            metrics.row_read();
            buffer.push(row);

            if buffer.is_full() {
                if self.cancelled(&mut spills) {
                    return Ok(None);
                }
                spills.push(self.spill(&writer, &mut buffer, compare, metrics)?);
            }
        }

        log::debug!("upstream exhausted ({} spills, {} rows buffered)", spills.len(), buffer.len());

        if spills.is_empty() {
            buffer.sort_by(compare);
            return Ok(Some(SortedRun::InMemory(buffer.take().into_iter())));
        }

        if !buffer.is_empty() {
            if self.cancelled(&mut spills) {
                return Ok(None);
            }
            spills.push(self.spill(&writer, &mut buffer, compare, metrics)?);
        }

        return Ok(Some(SortedRun::Spilled(SpillMerger::new(
            spills,
            &self.codec,
            compare,
            self.rw_buf_size,
        ))));
    }

    /// Pushes sorted rows downstream dropping duplicates if only unique rows are requested.
    fn drain<K, F>(
        &self,
        mut run: SortedRun<'_, C, F>,
        sink: &mut K,
        compare: F,
        metrics: &mut dyn SortMetrics,
    ) -> Result<Outcome, SortError>
    where
        K: RowSink,
        F: Fn(&Row, &Row) -> Ordering + Copy,
    {
        let mut previous: Option<Row> = None;

        loop {
            if self.cancel.is_cancelled() {
                run.close();
                return Ok(Outcome::Cancelled);
            }

            let row = match run.next_row(metrics)? {
                Some(row) => row,
                None => break,
            };

            if self.unique {
                if let Some(previous) = &previous {
                    if compare(previous, &row) == Ordering::Equal {
                        metrics.duplicate_dropped();
                        continue;
                    }
                }
                previous = Some(row.clone());
            }

            sink.push(row).map_err(|err| SortError::OutputError(Box::new(err)))?;
            metrics.row_written();
        }

        sink.finish().map_err(|err| SortError::OutputError(Box::new(err)))?;

        return Ok(Outcome::Finished);
    }

    /// Sorts buffered rows and writes them to a new spill file leaving the buffer empty.
    fn spill<F>(
        &self,
        writer: &SpillWriter<'_, C>,
        buffer: &mut RowBuffer,
        compare: F,
        metrics: &mut dyn SortMetrics,
    ) -> Result<SpillFile, SortError>
    where
        F: Fn(&Row, &Row) -> Ordering + Copy,
    {
        log::debug!("sorting {} rows ...", buffer.len());
        buffer.sort_by(compare);

        if self.unique {
            // runs from different spills are deduplicated again on output
            for _ in 0..buffer.dedup_by(compare) {
                metrics.duplicate_dropped();
            }
        }

        log::debug!("saving spill data");
        let spill = writer.write(buffer.take())?;
        metrics.spill_written(spill.rows(), spill.bytes());

        return Ok(spill);
    }

    /// Checks for a cancel request removing spill files created so far if there is one.
    fn cancelled(&self, spills: &mut Vec<SpillFile>) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }

        for spill in spills.drain(..) {
            if let Err(err) = spill.delete() {
                log::warn!("spill file removal failed: {}", err);
            }
        }

        return true;
    }
}
