//! Spill files: sorted runs of rows flushed from memory to temporary storage.

use std::fmt;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::codec::RowCodec;
use crate::row::Row;
use crate::sort::SortError;

/// Temporary file holding a sorted run of serialized rows.
/// The file is removed from the file system when the handle is closed or dropped.
pub struct SpillFile {
    path: tempfile::TempPath,
    rows: u64,
    bytes: u64,
    compressed: bool,
}

impl SpillFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows written to the file.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// File size on disk.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Removes the file.
    pub fn delete(self) -> io::Result<()> {
        log::debug!("removing spill file {}", self.path.display());
        self.path.close()
    }
}

impl fmt::Debug for SpillFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillFile")
            .field("path", &self.path.display())
            .field("rows", &self.rows)
            .field("bytes", &self.bytes)
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// Spill file writer. Serializes already sorted rows to a new temporary file.
pub struct SpillWriter<'a, C: RowCodec> {
    dir: &'a Path,
    prefix: &'a str,
    compress: bool,
    buf_size: Option<usize>,
    codec: &'a C,
}

impl<'a, C: RowCodec> SpillWriter<'a, C> {
    /// Creates a spill writer.
    ///
    /// # Arguments
    /// * `dir` - Directory spill files are created in
    /// * `prefix` - Spill file name prefix
    /// * `compress` - Gzip spill file content
    /// * `buf_size` - File write buffer size, default buffer size is used if [`None`]
    /// * `codec` - Row codec
    pub fn new(dir: &'a Path, prefix: &'a str, compress: bool, buf_size: Option<usize>, codec: &'a C) -> Self {
        SpillWriter {
            dir,
            prefix,
            compress,
            buf_size,
            codec,
        }
    }

    /// Writes rows to a new spill file. Rows are expected to be sorted.
    /// The file is removed if writing fails.
    pub fn write(&self, rows: impl IntoIterator<Item = Row>) -> Result<SpillFile, SortError> {
        let tmp_file = tempfile::Builder::new()
            .prefix(self.prefix)
            .suffix(".tmp")
            .tempfile_in(self.dir)
            .map_err(SortError::TempDir)?;
        let (file, path) = tmp_file.into_parts();

        let writer = match self.buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        let rows = if self.compress {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            let rows = self.dump(&mut encoder, rows)?;
            Self::close(encoder.finish().map_err(SortError::IO)?)?;
            rows
        } else {
            let mut writer = writer;
            let rows = self.dump(&mut writer, rows)?;
            Self::close(writer)?;
            rows
        };

        let bytes = fs::metadata(&path).map_err(SortError::IO)?.len();
        log::debug!("spill file {} written (rows: {}, bytes: {})", path.display(), rows, bytes);

        return Ok(SpillFile {
            path,
            rows,
            bytes,
            compressed: self.compress,
        });
    }

    fn dump<W: Write>(&self, writer: &mut W, rows: impl IntoIterator<Item = Row>) -> Result<u64, SortError> {
        let mut count = 0;
        for row in rows.into_iter() {
            self.codec
                .encode(&row, writer)
                .map_err(|err| SortError::SerializationError(Box::new(err)))?;
            count += 1;
        }

        return Ok(count);
    }

    fn close(writer: io::BufWriter<fs::File>) -> Result<(), SortError> {
        let file = writer.into_inner().map_err(|err| SortError::IO(err.into_error()))?;
        file.sync_data().map_err(SortError::IO)?;

        return Ok(());
    }
}

/// Spill file read state: decoded row stream and a single look-ahead row.
pub struct MergeCursor {
    // must drop before `spill`: the read handle is closed before the file is removed
    reader: Box<dyn Read>,
    spill: SpillFile,
    remaining: u64,
    head: Option<Row>,
}

impl MergeCursor {
    /// Opens a spill file and reads its first row.
    /// A spill without rows is removed without being opened, [`None`] is returned in that case.
    pub fn open<C: RowCodec>(
        spill: SpillFile,
        codec: &C,
        buf_size: Option<usize>,
    ) -> Result<Option<Self>, SortError> {
        if spill.rows() == 0 {
            spill.delete().map_err(SortError::IO)?;
            return Ok(None);
        }

        let file = fs::File::open(spill.path()).map_err(SortError::IO)?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };
        let reader: Box<dyn Read> = if spill.is_compressed() {
            Box::new(GzDecoder::new(reader))
        } else {
            Box::new(reader)
        };

        let mut cursor = MergeCursor {
            remaining: spill.rows(),
            spill,
            reader,
            head: None,
        };
        cursor.head = cursor.read_next(codec)?;

        return Ok(Some(cursor));
    }

    /// Look-ahead row, [`None`] if the spill is exhausted.
    pub fn head(&self) -> Option<&Row> {
        self.head.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.head.is_none()
    }

    /// Takes the look-ahead row and refills it from the stream.
    pub fn pop<C: RowCodec>(&mut self, codec: &C) -> Result<Option<Row>, SortError> {
        let next = self.read_next(codec)?;
        return Ok(std::mem::replace(&mut self.head, next));
    }

    /// Closes the stream and removes the spill file.
    pub fn close(self) -> io::Result<()> {
        let MergeCursor { spill, reader, .. } = self;
        drop(reader);
        spill.delete()
    }

    fn read_next<C: RowCodec>(&mut self, codec: &C) -> Result<Option<Row>, SortError> {
        if self.remaining == 0 {
            return Ok(None);
        }

        match codec
            .decode(&mut self.reader)
            .map_err(|err| SortError::DeserializationError(Box::new(err)))?
        {
            Some(row) => {
                self.remaining -= 1;
                Ok(Some(row))
            }
            None => Err(SortError::IO(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "spill file {} truncated: {} of {} rows missing",
                    self.spill.path().display(),
                    self.remaining,
                    self.spill.rows()
                ),
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use rstest::*;

    use super::{MergeCursor, SpillWriter};
    use crate::codec::RmpCodec;
    use crate::row::Row;
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn files_in(dir: &tempfile::TempDir) -> usize {
        fs::read_dir(dir.path()).unwrap().count()
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_spill_roundtrip(tmp_dir: tempfile::TempDir, #[case] compress: bool) {
        let saved: Vec<Row> = (0..100).map(|i: i64| row![i, format!("row-{}", i)]).collect();

        let writer = SpillWriter::new(tmp_dir.path(), "spill", compress, None, &RmpCodec);
        let spill = writer.write(saved.clone()).unwrap();
        assert_eq!(spill.rows(), 100);
        assert!(spill.path().file_name().unwrap().to_str().unwrap().starts_with("spill"));
        assert_eq!(files_in(&tmp_dir), 1);

        let mut cursor = MergeCursor::open(spill, &RmpCodec, Some(64)).unwrap().unwrap();
        let mut restored = Vec::new();
        while let Some(row) = cursor.pop(&RmpCodec).unwrap() {
            restored.push(row);
        }
        assert!(cursor.is_exhausted());
        cursor.close().unwrap();

        assert_eq!(restored, saved);
        assert_eq!(files_in(&tmp_dir), 0);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_dropped_cursor_removes_spill(tmp_dir: tempfile::TempDir, #[case] compress: bool) {
        let rows: Vec<Row> = (0..10).map(|i: i64| row![i]).collect();
        let spill = SpillWriter::new(tmp_dir.path(), "spill", compress, None, &RmpCodec)
            .write(rows)
            .unwrap();

        let mut cursor = MergeCursor::open(spill, &RmpCodec, None).unwrap().unwrap();
        assert_eq!(cursor.pop(&RmpCodec).unwrap(), Some(row![0]));
        assert_eq!(cursor.head(), Some(&row![1]));
        drop(cursor);

        assert_eq!(files_in(&tmp_dir), 0);
    }

    #[rstest]
    fn test_empty_spill_not_opened(tmp_dir: tempfile::TempDir) {
        let spill = SpillWriter::new(tmp_dir.path(), "spill", false, None, &RmpCodec)
            .write(Vec::new())
            .unwrap();

        assert!(MergeCursor::open(spill, &RmpCodec, None).unwrap().is_none());
        assert_eq!(files_in(&tmp_dir), 0);
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_truncated_spill(tmp_dir: tempfile::TempDir, #[case] compress: bool) {
        let rows: Vec<Row> = (0..50).map(|i: i64| row![i, "some padding to make rows longer"]).collect();
        let spill = SpillWriter::new(tmp_dir.path(), "spill", compress, None, &RmpCodec)
            .write(rows)
            .unwrap();

        let file = fs::OpenOptions::new().write(true).open(spill.path()).unwrap();
        file.set_len(spill.bytes() / 2).unwrap();
        drop(file);

        let result = MergeCursor::open(spill, &RmpCodec, None).and_then(|cursor| {
            let mut cursor = cursor.unwrap();
            while cursor.pop(&RmpCodec)?.is_some() {}
            Ok(())
        });

        assert!(matches!(
            result,
            Err(SortError::IO(_)) | Err(SortError::DeserializationError(_))
        ));
        assert_eq!(files_in(&tmp_dir), 0);
    }

    #[test]
    fn test_missing_directory() {
        let writer = SpillWriter::new(Path::new("./no/such/dir"), "spill", false, None, &RmpCodec);
        assert!(matches!(writer.write(vec![row![1]]), Err(SortError::TempDir(_))));
    }
}
