//! Bounded row buffer.

use std::cmp::Ordering;

use crate::row::Row;

/// Buffer limited by rows count. Accumulates rows until a spill is due.
pub struct RowBuffer {
    limit: usize,
    inner: Vec<Row>,
}

impl RowBuffer {
    pub fn new(limit: usize) -> Self {
        RowBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    /// Adds a new row to the buffer.
    pub fn push(&mut self, row: Row) {
        debug_assert!(self.inner.len() < self.limit, "row buffer overflow");
        self.inner.push(row);
    }

    /// Returns buffer length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Stable sorts buffered rows, rows comparing equal keep their insertion order.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&Row, &Row) -> Ordering,
    {
        self.inner.sort_by(compare);
    }

    /// Removes consecutive rows comparing equal keeping the first row of each run.
    /// Returns number of removed rows.
    pub fn dedup_by<F>(&mut self, mut compare: F) -> usize
    where
        F: FnMut(&Row, &Row) -> Ordering,
    {
        let before = self.inner.len();
        self.inner.dedup_by(|next, prev| compare(&*prev, &*next) == Ordering::Equal);

        before - self.inner.len()
    }

    /// Takes buffered rows out leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Row> {
        let capacity = self.limit.min(self.inner.capacity());
        std::mem::replace(&mut self.inner, Vec::with_capacity(capacity))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.inner.iter()
    }
}

impl IntoIterator for RowBuffer {
    type Item = Row;
    type IntoIter = <Vec<Row> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::RowBuffer;
    use crate::row::Value;

    fn first(row: &crate::Row) -> i64 {
        match row.get(0) {
            Some(Value::Integer(value)) => *value,
            _ => panic!("integer expected"),
        }
    }

    #[test]
    fn test_row_buffer() {
        let mut buffer = RowBuffer::new(2);

        buffer.push(row![0]);
        assert_eq!(buffer.is_full(), false);
        buffer.push(row![1]);
        assert_eq!(buffer.is_full(), true);

        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![row![0], row![1]]);
    }

    #[test]
    fn test_stable_sort_and_dedup() {
        let mut buffer = RowBuffer::new(6);
        for (key, tag) in [(2, "a"), (1, "b"), (2, "c"), (1, "d"), (3, "e"), (2, "f")] {
            buffer.push(row![key, tag]);
        }

        buffer.sort_by(|a, b| first(a).cmp(&first(b)));
        let tags: Vec<_> = buffer.iter().map(|row| row.get(1).unwrap().to_string()).collect();
        assert_eq!(tags, vec!["b", "d", "a", "c", "f", "e"]);

        let removed = buffer.dedup_by(|a, b| first(a).cmp(&first(b)));
        assert_eq!(removed, 3);
        assert_eq!(buffer.take(), vec![row![1, "b"], row![2, "a"], row![3, "e"]]);
        assert!(buffer.is_empty());
    }
}
