//! `row-sort` is an external merge sort stage for row oriented streaming pipelines.
//!
//! The sorter pulls rows from an upstream one at a time, keeps at most a configured number of them
//! in memory and spills sorted runs to temporary files when the buffer gets full. Once the upstream
//! is exhausted the runs are merged back and pushed downstream in key order. If the whole input fits
//! in memory no spill files are created at all. For more information see
//! [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `row-sort` supports the following features:
//!
//! * **Composite keys:**
//!   rows are ordered by a list of key fields, each ascending or descending and optionally case insensitive.
//!   A custom [`RowComparator`] can be plugged in.
//! * **Stable output:**
//!   rows with equal keys are emitted in their input order.
//! * **Unique rows:**
//!   only the first row of each group of rows with equal keys can be passed downstream.
//! * **Compression:**
//!   spill files can be gzip compressed trading CPU time for disk space.
//! * **Serialization format agnostic:**
//!   the library uses `MessagePack` for spill files by default, but a custom [`RowCodec`] can be used instead.
//! * **Cancellation:**
//!   a running sort can be stopped from another thread through a [`CancelToken`]. Spill files are always
//!   removed, whether a run finishes, fails or is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use row_sort::{row, IterSource, KeyField, Row, RowSorterBuilder};
//!
//! fn main() {
//!     let input = vec![row![3, "c"], row![1, "a"], row![2, "b"]];
//!     let mut source = IterSource::new(input.into_iter().map(Ok::<_, std::io::Error>));
//!     let mut output: Vec<Row> = Vec::new();
//!
//!     let sorter = RowSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_capacity(100_000)
//!         .with_keys(vec![KeyField::asc(0)])
//!         .with_compression(true)
//!         .build()
//!         .unwrap();
//!
//!     sorter.run(&mut source, &mut output).unwrap();
//!     assert_eq!(output, vec![row![1, "a"], row![2, "b"], row![3, "c"]]);
//! }
//! ```

#[macro_use]
pub mod row;

pub mod buffer;
pub mod codec;
pub mod key;
pub mod merger;
pub mod metrics;
pub mod pipeline;
pub mod sort;
pub mod spill;

pub use buffer::RowBuffer;
pub use codec::{RmpCodec, RowCodec};
pub use key::{KeyComparator, KeyField, KeySpec, KeySpecError, RowComparator};
pub use merger::SpillMerger;
pub use metrics::{NoopMetrics, SortMetrics, SortStats};
pub use pipeline::{channel, ChannelSink, ChannelSource, IterSource, RowSink, RowSource};
pub use row::{Row, Value};
pub use sort::{CancelToken, RowSorter, RowSorterBuilder, SortError};
pub use spill::{MergeCursor, SpillFile, SpillWriter};
