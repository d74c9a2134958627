//! Transfer-Encoding: chunked framing.

use crate::bucket::linebuf::{Fetch, LineBuffer};
use crate::bucket::{Bucket, Fill, TERM_CRLF};
use crate::status::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ChunkState {
    /// Expecting a `<hex-size> [";" ext]* CRLF` line.
    Size,
    /// Inside a chunk's payload.
    Payload { left: u64 },
    /// Expecting the CRLF that closes a chunk's payload.
    PayloadEnd,
    /// The zero-size chunk arrived; trailers belong to the caller.
    Terminal,
}

/// What the decoder wants next. `Bytes(n)` means up to `n` payload bytes
/// can be read straight off the underlying stream; report the outcome
/// back through [`ChunkedDecoder::consume`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Span {
    Bytes(usize),
    Terminal,
}

/// Decodes chunk framing against an underlying stream. The decoder owns
/// only the protocol scaffolding (size lines, payload terminators); the
/// payload bytes themselves never pass through it, so the containing
/// reader keeps its zero-copy path.
pub struct ChunkedDecoder {
    state: ChunkState,
    linebuf: LineBuffer,
}

impl ChunkedDecoder {
    pub fn new() -> ChunkedDecoder {
        ChunkedDecoder {
            state: ChunkState::Size,
            linebuf: LineBuffer::new(),
        }
    }

    /// True once the terminal chunk has been consumed. Trailing headers
    /// (and the final blank line) are still pending on the stream.
    #[inline]
    pub fn finished(&self) -> bool {
        self.state == ChunkState::Terminal
    }

    /// Advance the protocol scaffolding as far as the stream allows and
    /// say what comes next. The stream ending inside a size line, payload
    /// or payload terminator is a truncated response, never a clean end.
    pub fn plan(&mut self, stream: &mut dyn Bucket, max: usize) -> Result<Span> {
        loop {
            match self.state {
                ChunkState::Size => match self.linebuf.fetch(stream, TERM_CRLF)? {
                    Fetch::End => return Err(Error::TruncatedResponse),
                    Fetch::Line => {
                        let size = parse_chunk_size(self.linebuf.line())?;
                        if size == 0 {
                            self.state = ChunkState::Terminal;
                        } else {
                            self.state = ChunkState::Payload { left: size };
                        }
                    }
                },
                ChunkState::Payload { left } => {
                    return Ok(Span::Bytes((left as usize).min(max).max(1)));
                }
                ChunkState::PayloadEnd => match self.linebuf.fetch(stream, TERM_CRLF)? {
                    Fetch::End => return Err(Error::TruncatedResponse),
                    Fetch::Line => {
                        if !self.linebuf.line().is_empty() {
                            return Err(Error::TruncatedResponse);
                        }
                        self.state = ChunkState::Size;
                    }
                },
                ChunkState::Terminal => return Ok(Span::Terminal),
            }
        }
    }

    /// Record the outcome of a payload read planned by [`plan`]. A read
    /// that produced nothing at stream end means the payload was cut off.
    pub fn consume(&mut self, count: usize, fill: Fill) -> Result<()> {
        if let ChunkState::Payload { ref mut left } = self.state {
            *left -= count as u64;
            if *left == 0 {
                self.state = ChunkState::PayloadEnd;
            } else if count == 0 && fill == Fill::Eof {
                return Err(Error::TruncatedResponse);
            }
        }
        Ok(())
    }
}

/// Parse the hex size prefix of a chunk-size line. Extensions after `;`
/// are tolerated and ignored; an empty prefix parses as zero, which lets a
/// bare blank line terminate a body.
fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    let mut size: u64 = 0;

    for &byte in line {
        let digit = match byte {
            b'0'..=b'9' => u64::from(byte - b'0'),
            b'a'..=b'f' => u64::from(byte - b'a') + 10,
            b'A'..=b'F' => u64::from(byte - b'A') + 10,
            _ => break,
        };

        size = size
            .checked_mul(16)
            .and_then(|size| size.checked_add(digit))
            .ok_or(Error::BadResponse)?;
    }

    Ok(size)
}
