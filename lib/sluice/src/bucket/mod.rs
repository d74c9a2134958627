//! The universal bucket contract and the structural bucket kinds.

pub mod aggregate;
pub mod databuf;
pub mod headers;
pub mod iovec;
pub mod linebuf;
pub mod mock;
pub mod simple;
pub mod stream;

use crate::status::Result;
use weir::config::Config;

/// Request "whatever is immediately available" from a read.
pub const REQUEST_ALL: usize = usize::MAX;

/// Acceptable line-terminator kinds for `readline`, combined bitwise.
pub const TERM_CR: u8 = 0b001;
pub const TERM_LF: u8 = 0b010;
pub const TERM_CRLF: u8 = 0b100;
pub const TERM_ANY: u8 = TERM_CR | TERM_LF | TERM_CRLF;

/// Whether more data may follow the bytes just returned. `Eof` is terminal:
/// once returned, every subsequent operation yields `Eof` with no bytes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Fill {
    More,
    Eof,
}

/// One read's worth of borrowed bytes. The slice is valid until the next
/// operation on the same bucket.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub data: &'a [u8],
    pub fill: Fill,
}

impl<'a> Chunk<'a> {
    #[inline]
    pub fn eof() -> Chunk<'static> {
        Chunk {
            data: &[],
            fill: Fill::Eof,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when this chunk exhausts the bucket and carries nothing.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.data.is_empty() && self.fill == Fill::Eof
    }
}

/// The line terminator a `readline` call found, if any. `CrSplit` means the
/// data ended exactly on a CR while CRLF was acceptable: the CR is included
/// in the returned data and the consumer must `peek` (or `read`) to learn
/// whether a paired LF follows.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LineEnd {
    None,
    Cr,
    Lf,
    Crlf,
    CrSplit,
}

/// One `readline` result. `data` includes the terminator when one was
/// found.
#[derive(Debug, Clone, Copy)]
pub struct Line<'a> {
    pub data: &'a [u8],
    pub end: LineEnd,
    pub fill: Fill,
}

impl<'a> Line<'a> {
    #[inline]
    pub fn eof() -> Line<'static> {
        Line {
            data: &[],
            end: LineEnd::None,
            fill: Fill::Eof,
        }
    }
}

/// A `read_iovec` result: up to `max_vecs` non-contiguous ranges in source
/// order.
#[derive(Debug)]
pub struct IoVecs<'a> {
    pub vecs: Vec<&'a [u8]>,
    pub fill: Fill,
}

impl<'a> IoVecs<'a> {
    #[inline]
    pub fn total_len(&self) -> usize {
        self.vecs.iter().map(|vec| vec.len()).sum()
    }
}

/// A polymorphic streaming byte source.
///
/// Single ownership: the consumer holds the bucket and drops it exactly
/// once; dropping recursively releases any owned children. Buckets are not
/// shareable across concurrent readers. Reads never block; `Err(Wait)` and
/// `Err(WaitConn)` signal "retry later" without losing state.
pub trait Bucket {
    /// Return up to `max` bytes (`REQUEST_ALL` for whatever is ready). A
    /// zero-length slice is only returned together with `Fill::Eof`;
    /// "no data right now" is `Err(Wait)`.
    fn read(&mut self, max: usize) -> Result<Chunk<'_>>;

    /// Scan for a line terminator in `accept`; unacceptable terminator
    /// kinds are scanned through as ordinary bytes. Without a terminator in
    /// the visible data, the partial line is returned with `LineEnd::None`.
    fn readline(&mut self, accept: u8) -> Result<Line<'_>>;

    /// Show the currently visible bytes without consuming them.
    /// `Fill::Eof` here means "what you see is all there is", even when
    /// data is visible.
    fn peek(&mut self) -> Result<Chunk<'_>>;

    /// Like `read`, but may return several non-contiguous ranges. The
    /// default gathers a single range through `read`.
    fn read_iovec(&mut self, max: usize, max_vecs: usize) -> Result<IoVecs<'_>> {
        if max_vecs == 0 {
            return Ok(IoVecs {
                vecs: Vec::new(),
                fill: Fill::More,
            });
        }

        let chunk = self.read(max)?;
        let mut vecs = Vec::with_capacity(1);
        if !chunk.data.is_empty() {
            vecs.push(chunk.data);
        }

        Ok(IoVecs {
            vecs,
            fill: chunk.fill,
        })
    }

    /// Propagate per-connection configuration down the tree. Best effort;
    /// buckets without tunables ignore it.
    fn set_config(&mut self, _config: &Config) {}
}

/// Scans `data` for the first acceptable terminator. Returns the number of
/// bytes the line occupies (terminator included) and the terminator kind;
/// `(data.len(), LineEnd::None)` when no acceptable terminator is present.
/// A trailing CR with CRLF acceptable is undecidable and yields `CrSplit`.
pub fn scan_line(data: &[u8], accept: u8) -> (usize, LineEnd) {
    let mut pos = 0;

    while pos < data.len() {
        match data[pos] {
            b'\n' if accept & TERM_LF != 0 => return (pos + 1, LineEnd::Lf),
            b'\r' => {
                if accept & TERM_CRLF != 0 {
                    if pos + 1 == data.len() {
                        return (data.len(), LineEnd::CrSplit);
                    }
                    if data[pos + 1] == b'\n' {
                        return (pos + 2, LineEnd::Crlf);
                    }
                }
                if accept & TERM_CR != 0 {
                    return (pos + 1, LineEnd::Cr);
                }
            }
            _ => (),
        }
        pos += 1;
    }

    (data.len(), LineEnd::None)
}
