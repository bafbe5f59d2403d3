//! Upstream and downstream pipeline interfaces.

use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::sync::mpsc;

use crate::row::Row;

/// Upstream row producer.
pub trait RowSource {
    type Error: Error + Send + Sync + 'static;

    /// Pulls the next row, blocking until one is available.
    /// Returns [`None`] at the end of the stream.
    fn pull(&mut self) -> Result<Option<Row>, Self::Error>;
}

/// Downstream row consumer.
pub trait RowSink {
    type Error: Error + Send + Sync + 'static;

    /// Pushes a row, blocking while the consumer is not ready to accept it.
    fn push(&mut self, row: Row) -> Result<(), Self::Error>;

    /// Signals the end of the stream.
    fn finish(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Row source backed by an iterator of fallible rows.
pub struct IterSource<I> {
    inner: I,
}

impl<I, E> IterSource<I>
where
    I: Iterator<Item = Result<Row, E>>,
{
    pub fn new(input: impl IntoIterator<IntoIter = I>) -> Self {
        IterSource {
            inner: input.into_iter(),
        }
    }
}

impl<I, E> RowSource for IterSource<I>
where
    I: Iterator<Item = Result<Row, E>>,
    E: Error + Send + Sync + 'static,
{
    type Error = E;

    fn pull(&mut self) -> Result<Option<Row>, Self::Error> {
        self.inner.next().transpose()
    }
}

impl RowSink for Vec<Row> {
    type Error = Infallible;

    fn push(&mut self, row: Row) -> Result<(), Self::Error> {
        Vec::push(self, row);
        Ok(())
    }
}

/// Message passed through a row channel.
enum Message {
    Row(Row),
    End,
}

/// Channel peer hung up before the end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

impl Error for Disconnected {}

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row channel disconnected")
    }
}

/// Creates a bounded row channel. Pushing blocks once `bound` rows are queued.
pub fn channel(bound: usize) -> (ChannelSink, ChannelSource) {
    let (sender, receiver) = mpsc::sync_channel(bound);
    (ChannelSink { sender }, ChannelSource { receiver })
}

/// Receiving half of a row channel.
pub struct ChannelSource {
    receiver: mpsc::Receiver<Message>,
}

impl RowSource for ChannelSource {
    type Error = Disconnected;

    fn pull(&mut self) -> Result<Option<Row>, Self::Error> {
        match self.receiver.recv() {
            Ok(Message::Row(row)) => Ok(Some(row)),
            Ok(Message::End) => Ok(None),
            Err(mpsc::RecvError) => Err(Disconnected),
        }
    }
}

impl Iterator for ChannelSource {
    type Item = Result<Row, Disconnected>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull().transpose()
    }
}

/// Sending half of a row channel.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::SyncSender<Message>,
}

impl RowSink for ChannelSink {
    type Error = Disconnected;

    fn push(&mut self, row: Row) -> Result<(), Self::Error> {
        self.sender.send(Message::Row(row)).map_err(|_| Disconnected)
    }

    fn finish(&mut self) -> Result<(), Self::Error> {
        self.sender.send(Message::End).map_err(|_| Disconnected)
    }
}

#[cfg(test)]
mod test {
    use std::io;
    use std::thread;

    use super::{channel, Disconnected, IterSource, RowSink, RowSource};

    #[test]
    fn test_iter_source() {
        let mut source = IterSource::new(vec![Ok(row![1]), Err(io::Error::new(io::ErrorKind::Other, "boom"))]);

        assert_eq!(source.pull().unwrap(), Some(row![1]));
        assert!(source.pull().is_err());
        assert!(source.pull().unwrap().is_none());
    }

    #[test]
    fn test_channel() {
        let (mut sink, source) = channel(1);

        let producer = thread::spawn(move || {
            for i in 0..10 {
                sink.push(row![i]).unwrap();
            }
            sink.finish().unwrap();
        });

        let rows: Result<Vec<_>, _> = source.collect();
        producer.join().unwrap();

        assert_eq!(rows.unwrap(), (0..10).map(|i| row![i]).collect::<Vec<_>>());
    }

    #[test]
    fn test_channel_disconnected() {
        let (sink, mut source) = channel(1);
        drop(sink);

        assert_eq!(source.pull(), Err(Disconnected));
    }
}
