//! A bounded in-memory byte pipe for streaming input into a build.
//!
//! A producer thread writes into the [`PipeWriter`] while the building thread
//! reads the [`PipeReader`]. The writer blocks once `capacity` chunks are
//! queued; the reader blocks until data arrives. Dropping the writer ends the
//! stream, and [`PipeWriter::abort`] makes the reader fail instead.
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//! use xmlom::builder::{pipe, Builder};
//!
//! let (mut writer, reader) = pipe(4);
//! let producer = std::thread::spawn(move || {
//!     writer.write_all(b"<root>").unwrap();
//!     writer.write_all(b"streamed</root>").unwrap();
//! });
//! let doc = Builder::new().build_reader(reader).unwrap();
//! producer.join().unwrap();
//! assert_eq!(doc.value(doc.root_element()), "streamed");
//! ```

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};

type Chunk = Result<Vec<u8>, String>;

/// Creates a connected writer/reader pair holding at most `capacity` queued
/// writes. A capacity of 0 makes every write wait for the reader.
#[must_use]
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (sender, receiver) = mpsc::sync_channel(capacity);
    (
        PipeWriter { sender },
        PipeReader {
            receiver,
            current: Vec::new(),
            offset: 0,
            finished: false,
        },
    )
}

/// The producing end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    sender: SyncSender<Chunk>,
}

impl PipeWriter {
    /// Ends the stream with an error: the reader returns an I/O error
    /// carrying `message` once it has drained the data written before.
    pub fn abort(self, message: impl Into<String>) {
        let message = message.into();
        log::debug!("pipe aborted by producer: {message}");
        // A reader that is already gone has nothing left to fail.
        let _ = self.sender.send(Err(message));
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.sender
            .send(Ok(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader was dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// The consuming end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    receiver: Receiver<Chunk>,
    current: Vec<u8>,
    offset: usize,
    finished: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.offset == self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.offset = 0;
                }
                Ok(Err(message)) => {
                    self.finished = true;
                    return Err(io::Error::other(message));
                }
                // Every writer was dropped: end of stream.
                Err(_) => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }
        let available = &self.current[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn test_bytes_arrive_in_order() {
        let (mut writer, mut reader) = pipe(1);
        let producer = thread::spawn(move || {
            let chunks: [&[u8]; 4] = [b"ab", b"", b"cde", b"f"];
            for chunk in chunks {
                writer.write_all(chunk).unwrap();
            }
        });
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        producer.join().unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn test_small_read_buffer() {
        let (mut writer, mut reader) = pipe(2);
        writer.write_all(b"hello").unwrap();
        drop(writer);
        let mut buf = [0u8; 2];
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"he");
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "llo");
    }

    #[test]
    fn test_abort_surfaces_as_io_error() {
        let (mut writer, mut reader) = pipe(4);
        writer.write_all(b"<root>").unwrap();
        writer.abort("producer failed");
        let mut first = [0u8; 16];
        assert_eq!(reader.read(&mut first).unwrap(), 6);
        let err = reader.read(&mut first).unwrap_err();
        assert_eq!(err.to_string(), "producer failed");
        assert_eq!(reader.read(&mut first).unwrap(), 0);
    }

    #[test]
    fn test_write_after_reader_dropped() {
        let (mut writer, reader) = pipe(1);
        drop(reader);
        let err = writer.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
