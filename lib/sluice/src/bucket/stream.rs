//! Byte source over a non-blocking reader, typically a socket.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line};
use crate::buffer::Buffer;
use crate::status::{Error, Result};
use std::io;
use weir::logging::{self, trace, Logger};

const READ_BUF_SIZE: usize = 65536;

/// Stages bytes from a non-blocking `io::Read` into a buffer window and
/// serves them through the bucket protocol. `WouldBlock` maps to `Wait`, a
/// zero-length read latches EOF, anything else is surfaced as `Io`.
pub struct StreamBucket<R> {
    reader: R,
    window: Buffer,
    out: Vec<u8>,
    eof: bool,
    log: Logger,
}

impl StreamBucket<mio::net::TcpStream> {
    /// Wrap a non-blocking TCP stream registered with the caller's poll
    /// loop.
    pub fn from_tcp<'l, L: Into<Option<&'l Logger>>>(
        stream: mio::net::TcpStream,
        log: L,
    ) -> StreamBucket<mio::net::TcpStream> {
        StreamBucket::new(stream, log)
    }
}

impl<R: io::Read> StreamBucket<R> {
    pub fn new<'l, L: Into<Option<&'l Logger>>>(reader: R, log: L) -> StreamBucket<R> {
        StreamBucket {
            reader,
            window: Buffer::new(READ_BUF_SIZE),
            out: Vec::new(),
            eof: false,
            log: logging::child(log),
        }
    }

    /// Pull whatever the reader has into the window, stopping at the first
    /// block, the window limit, or the stream end.
    fn top_up(&mut self) -> Result<()> {
        while !self.eof && self.window.free_capacity() > 0 {
            match self.window.fill_from(&mut self.reader) {
                Ok(0) => {
                    self.eof = true;
                    trace!(self.log, "stream end reached"; "context" => "top_up",
                           "buffered" => self.window.len());
                }
                Ok(count) => {
                    trace!(self.log, "received data"; "context" => "top_up", "count" => count);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::Io(err.kind())),
            }
        }
        Ok(())
    }

    /// Move `take` staged bytes into the serve buffer.
    fn serve(&mut self, take: usize) -> Fill {
        self.out.clear();
        self.out.extend_from_slice(&self.window.read_slice()[..take]);
        self.window.move_head(take);

        if self.eof && self.window.is_empty() {
            Fill::Eof
        } else {
            Fill::More
        }
    }

    #[inline]
    fn blocked(&self) -> Result<()> {
        if self.window.is_empty() && !self.eof {
            return Err(Error::Wait);
        }
        Ok(())
    }
}

impl<R: io::Read> Bucket for StreamBucket<R> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.top_up()?;
        self.blocked()?;

        let take = self.window.len().min(max);
        let fill = self.serve(take);

        Ok(Chunk {
            data: &self.out,
            fill,
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.top_up()?;
        self.blocked()?;

        let (take, end) = scan_line(self.window.read_slice(), accept);
        let fill = self.serve(take);

        Ok(Line {
            data: &self.out,
            end,
            fill,
        })
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.top_up()?;

        Ok(Chunk {
            data: self.window.read_slice(),
            fill: if self.eof { Fill::Eof } else { Fill::More },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{LineEnd, REQUEST_ALL, TERM_CRLF};
    use std::cmp::min;

    /// Reader that yields data in fixed chunks with scripted blocks, the
    /// shape a non-blocking socket presents.
    struct MockChannel {
        data: Vec<u8>,
        cursor: usize,
        chunk: usize,
        block_at: Vec<usize>,
        closed: bool,
    }

    impl MockChannel {
        fn new(data: Vec<u8>, chunk: usize) -> MockChannel {
            MockChannel {
                data,
                cursor: 0,
                chunk,
                block_at: Vec::new(),
                closed: true,
            }
        }

        fn open_ended(mut self) -> MockChannel {
            self.closed = false;
            self
        }

        fn block_at(mut self, offset: usize) -> MockChannel {
            self.block_at.push(offset);
            self
        }
    }

    impl io::Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if let Some(idx) = self.block_at.iter().position(|&o| o == self.cursor) {
                self.block_at.remove(idx);
                return Err(io::ErrorKind::WouldBlock.into());
            }

            if self.cursor == self.data.len() {
                if self.closed {
                    return Ok(0);
                }
                return Err(io::ErrorKind::WouldBlock.into());
            }

            let offset = min(min(self.chunk, buf.len()), self.data.len() - self.cursor);
            buf[..offset].copy_from_slice(&self.data[self.cursor..(self.cursor + offset)]);
            self.cursor += offset;
            Ok(offset)
        }
    }

    #[test]
    fn test_reads_until_block_then_waits() {
        let channel = MockChannel::new(b"abcdef".to_vec(), 2)
            .open_ended()
            .block_at(4);
        let mut bucket = StreamBucket::new(channel, None);

        // Two 2-byte reads land before the scripted block.
        let chunk = bucket.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"abcd");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = bucket.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"ef");
        assert_eq!(chunk.fill, Fill::More);

        assert_eq!(bucket.read(REQUEST_ALL).unwrap_err(), Error::Wait);
    }

    #[test]
    fn test_closed_stream_reports_eof() {
        let channel = MockChannel::new(b"payload".to_vec(), 64);
        let mut bucket = StreamBucket::new(channel, None);

        let chunk = bucket.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"payload");
        assert_eq!(chunk.fill, Fill::Eof);

        assert!(bucket.read(1).unwrap().is_drained());
    }

    #[test]
    fn test_bounded_read_leaves_rest_staged() {
        let channel = MockChannel::new(b"abcdef".to_vec(), 64);
        let mut bucket = StreamBucket::new(channel, None);

        let chunk = bucket.read(2).unwrap();
        assert_eq!(chunk.data, b"ab");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = bucket.peek().unwrap();
        assert_eq!(chunk.data, b"cdef");
        assert_eq!(chunk.fill, Fill::Eof);
    }

    #[test]
    fn test_readline_over_stream() {
        let channel = MockChannel::new(b"one\r\ntwo\r\n".to_vec(), 64);
        let mut bucket = StreamBucket::new(channel, None);

        let line = bucket.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"one\r\n");
        assert_eq!(line.end, LineEnd::Crlf);

        let line = bucket.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"two\r\n");
        assert_eq!(line.fill, Fill::Eof);
    }

    #[test]
    fn test_hard_error_surfaces_as_io() {
        struct Broken;
        impl io::Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::ConnectionReset.into())
            }
        }

        let mut bucket = StreamBucket::new(Broken, None);
        assert_eq!(
            bucket.read(REQUEST_ALL).unwrap_err(),
            Error::Io(io::ErrorKind::ConnectionReset)
        );
    }
}
