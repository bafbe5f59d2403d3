//! Spill files merger.

use std::cmp::Ordering;

use crate::codec::RowCodec;
use crate::metrics::{NoopMetrics, SortMetrics};
use crate::row::Row;
use crate::sort::SortError;
use crate::spill::{MergeCursor, SpillFile};

/// K-way spill merger.
/// Merges multiple sorted spill files into a single sorted output keeping one look-ahead row per spill.
/// Rows comparing equal are taken from the earliest created spill first, so the output is stable
/// with respect to spill creation order. Fully consumed spill files are removed right away.
pub struct SpillMerger<'a, C, F>
where
    C: RowCodec,
    F: Fn(&Row, &Row) -> Ordering,
{
    spills: Vec<SpillFile>,
    cursors: Vec<MergeCursor>,
    codec: &'a C,
    compare: F,
    buf_size: Option<usize>,
    initiated: bool,
}

impl<'a, C, F> SpillMerger<'a, C, F>
where
    C: RowCodec,
    F: Fn(&Row, &Row) -> Ordering,
{
    /// Creates an instance of a merger using spills as inputs.
    /// Spill rows should be sorted in ascending order according to `compare` otherwise the result is undefined.
    /// Spills are opened on the first row request.
    ///
    /// # Arguments
    /// * `spills` - Spill files in creation order
    /// * `codec` - Codec spill files were written with
    /// * `compare` - Function to be used to compare rows
    /// * `buf_size` - Spill file read buffer size
    pub fn new(spills: Vec<SpillFile>, codec: &'a C, compare: F, buf_size: Option<usize>) -> Self {
        return SpillMerger {
            cursors: Vec::with_capacity(spills.len()),
            spills,
            codec,
            compare,
            buf_size,
            initiated: false,
        };
    }

    /// Number of spill files not consumed yet.
    pub fn live(&self) -> usize {
        self.spills.len() + self.cursors.len()
    }

    /// Returns the next row in ascending order or [`None`] if all the spills are consumed.
    pub fn next_row(&mut self, metrics: &mut dyn SortMetrics) -> Result<Option<Row>, SortError> {
        if !self.initiated {
            self.initiated = true;
            log::debug!("opening {} spill files", self.spills.len());

            for spill in self.spills.drain(..) {
                match MergeCursor::open(spill, self.codec, self.buf_size)? {
                    Some(cursor) => self.cursors.push(cursor),
                    None => metrics.spill_consumed(),
                }
            }
        }

        let mut selected: Option<(usize, &Row)> = None;
        for (idx, cursor) in self.cursors.iter().enumerate() {
            let head = match cursor.head() {
                Some(head) => head,
                None => continue,
            };
            match selected {
                // strict comparison keeps the earliest cursor on ties
                Some((_, best)) if (self.compare)(head, best) != Ordering::Less => {}
                _ => selected = Some((idx, head)),
            }
        }

        let idx = match selected {
            Some((idx, _)) => idx,
            None => return Ok(None),
        };

        let row = self.cursors[idx].pop(self.codec)?;
        if self.cursors[idx].is_exhausted() {
            let cursor = self.cursors.remove(idx);
            cursor.close().map_err(SortError::IO)?;
            metrics.spill_consumed();
        }

        return Ok(row);
    }

    /// Closes every open stream and removes all the spill files left.
    /// Removal errors are logged but not reported.
    pub fn close(self) {
        let files = self.live();
        for cursor in self.cursors {
            if let Err(err) = cursor.close() {
                log::warn!("spill file removal failed: {}", err);
            }
        }
        for spill in self.spills {
            if let Err(err) = spill.delete() {
                log::warn!("spill file removal failed: {}", err);
            }
        }

        if files > 0 {
            log::debug!("{} spill files removed", files);
        }
    }
}

impl<'a, C, F> Iterator for SpillMerger<'a, C, F>
where
    C: RowCodec,
    F: Fn(&Row, &Row) -> Ordering,
{
    type Item = Result<Row, SortError>;

    /// Returns the next row from the spills in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        self.next_row(&mut NoopMetrics).transpose()
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;
    use std::fs;

    use rstest::*;

    use super::SpillMerger;
    use crate::codec::RmpCodec;
    use crate::row::{Row, Value};
    use crate::spill::{SpillFile, SpillWriter};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn key(row: &Row) -> i64 {
        match row.get(0) {
            Some(Value::Integer(value)) => *value,
            _ => panic!("integer key expected"),
        }
    }

    fn by_key(a: &Row, b: &Row) -> Ordering {
        key(a).cmp(&key(b))
    }

    fn spills(dir: &tempfile::TempDir, runs: Vec<Vec<(i64, &str)>>) -> Vec<SpillFile> {
        let writer = SpillWriter::new(dir.path(), "run", false, None, &RmpCodec);
        runs.into_iter()
            .map(|run| writer.write(run.into_iter().map(|(k, tag)| row![k, tag])).unwrap())
            .collect()
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![vec![], vec![]], vec![])]
    #[case(
        vec![
            vec![(4, "a"), (5, "a"), (7, "a")],
            vec![(1, "b"), (6, "b")],
            vec![(3, "c")],
            vec![],
        ],
        vec![(1, "b"), (3, "c"), (4, "a"), (5, "a"), (6, "b"), (7, "a")],
    )]
    #[case(
        vec![
            vec![(1, "a"), (2, "a")],
            vec![(1, "b"), (2, "b")],
            vec![(1, "c")],
        ],
        vec![(1, "a"), (1, "b"), (1, "c"), (2, "a"), (2, "b")],
    )]
    fn test_merger(
        tmp_dir: tempfile::TempDir,
        #[case] runs: Vec<Vec<(i64, &str)>>,
        #[case] expected: Vec<(i64, &str)>,
    ) {
        let merger = SpillMerger::new(spills(&tmp_dir, runs), &RmpCodec, by_key, None);

        let actual: Result<Vec<Row>, _> = merger.collect();
        let expected: Vec<Row> = expected.into_iter().map(|(k, tag)| row![k, tag]).collect();

        assert_eq!(actual.unwrap(), expected);
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }

    #[rstest]
    fn test_consumed_spill_removed(tmp_dir: tempfile::TempDir) {
        let runs = vec![vec![(1, "a")], vec![(2, "b"), (3, "b")]];
        let mut merger = SpillMerger::new(spills(&tmp_dir, runs), &RmpCodec, by_key, None);

        assert_eq!(merger.live(), 2);
        assert_eq!(merger.next().unwrap().unwrap(), row![1, "a"]);
        assert_eq!(merger.live(), 1);
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 1);

        merger.close();
        assert_eq!(fs::read_dir(tmp_dir.path()).unwrap().count(), 0);
    }
}
