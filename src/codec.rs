//! Row serialization used by spill files.

use std::error::Error;
use std::io;
use std::io::prelude::*;

use crate::row::Row;

/// Row codec interface. Provides methods for writing rows to a spill stream and reading them back.
pub trait RowCodec {
    /// Row serialization error.
    type SerializationError: Error + Send + Sync + 'static;
    /// Row deserialization error.
    type DeserializationError: Error + Send + Sync + 'static;

    /// Writes a row to the stream.
    fn encode<W: Write>(&self, row: &Row, writer: &mut W) -> Result<(), Self::SerializationError>;

    /// Reads the next row from the stream.
    /// Returns [`None`] if the stream ended on a row boundary.
    fn decode<R: Read>(&self, reader: &mut R) -> Result<Option<Row>, Self::DeserializationError>;
}

/// RMP (Rust MessagePack) row codec.
/// It uses MessagePack as a data serialization format.
/// For more information see https://msgpack.org/.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmpCodec;

impl RowCodec for RmpCodec {
    type SerializationError = rmp_serde::encode::Error;
    type DeserializationError = rmp_serde::decode::Error;

    fn encode<W: Write>(&self, row: &Row, writer: &mut W) -> Result<(), Self::SerializationError> {
        rmp_serde::encode::write(writer, row)
    }

    fn decode<R: Read>(&self, reader: &mut R) -> Result<Option<Row>, Self::DeserializationError> {
        match rmp_serde::decode::from_read(reader) {
            Ok(row) => Ok(Some(row)),
            // nothing at all was read for the leading marker
            Err(rmp_serde::decode::Error::InvalidMarkerRead(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::{RmpCodec, RowCodec};
    use crate::row::{Row, Value};

    #[test]
    fn test_rmp_codec() {
        let rows = vec![
            row![1, "one", 1.5],
            row![Value::Null, Value::Binary(vec![1, 2]), Value::Date(-7)],
            Row::default(),
        ];

        let mut buf = Vec::new();
        for row in &rows {
            RmpCodec.encode(row, &mut buf).unwrap();
        }

        let mut reader = Cursor::new(buf);
        let mut restored = Vec::new();
        while let Some(row) = RmpCodec.decode(&mut reader).unwrap() {
            restored.push(row);
        }

        assert_eq!(restored, rows);
    }

    #[test]
    fn test_rmp_codec_truncated() {
        let mut buf = Vec::new();
        RmpCodec.encode(&row!["a long enough string value"], &mut buf).unwrap();
        buf.truncate(buf.len() - 3);

        let result = RmpCodec.decode(&mut Cursor::new(buf));
        assert!(result.is_err());
    }
}
