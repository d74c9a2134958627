//! A bucket over a fixed vector of byte ranges.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, IoVecs, Line};
use crate::status::Result;

/// Serves a sequence of non-contiguous ranges in order. Single-range reads
/// never cross a range boundary; `read_iovec` hands out several ranges at
/// once without copying.
pub struct IovecBucket<'a> {
    vecs: Vec<&'a [u8]>,
    // Index of the active range and the offset consumed within it.
    idx: usize,
    pos: usize,
}

impl<'a> IovecBucket<'a> {
    #[inline]
    pub fn new(vecs: Vec<&'a [u8]>) -> IovecBucket<'a> {
        IovecBucket {
            vecs,
            idx: 0,
            pos: 0,
        }
    }

    /// Skip exhausted or empty ranges.
    #[inline]
    fn advance(&mut self) {
        while self.idx < self.vecs.len() && self.pos == self.vecs[self.idx].len() {
            self.idx += 1;
            self.pos = 0;
        }
    }

    #[inline]
    fn fill_state(&self) -> Fill {
        let mut idx = self.idx;
        let mut pos = self.pos;
        while idx < self.vecs.len() {
            if pos < self.vecs[idx].len() {
                return Fill::More;
            }
            idx += 1;
            pos = 0;
        }
        Fill::Eof
    }
}

impl<'a> Bucket for IovecBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.advance();

        if self.idx == self.vecs.len() {
            return Ok(Chunk::eof());
        }

        let active = self.vecs[self.idx];
        let take = (active.len() - self.pos).min(max);
        let start = self.pos;
        self.pos += take;

        let fill = self.fill_state();
        Ok(Chunk {
            data: &active[start..start + take],
            fill,
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.advance();

        if self.idx == self.vecs.len() {
            return Ok(Line::eof());
        }

        let active = self.vecs[self.idx];
        let (take, end) = scan_line(&active[self.pos..], accept);
        let start = self.pos;
        self.pos += take;

        let fill = self.fill_state();
        Ok(Line {
            data: &active[start..start + take],
            end,
            fill,
        })
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.advance();

        if self.idx == self.vecs.len() {
            return Ok(Chunk::eof());
        }

        let last = self
            .vecs
            .iter()
            .skip(self.idx + 1)
            .all(|vec| vec.is_empty());

        Ok(Chunk {
            data: &self.vecs[self.idx][self.pos..],
            fill: if last { Fill::Eof } else { Fill::More },
        })
    }

    fn read_iovec(&mut self, max: usize, max_vecs: usize) -> Result<IoVecs<'_>> {
        self.advance();

        let mut out: Vec<&[u8]> = Vec::new();
        let mut remaining = max;

        while self.idx < self.vecs.len() && out.len() < max_vecs && remaining > 0 {
            let active = self.vecs[self.idx];
            let take = (active.len() - self.pos).min(remaining);
            if take > 0 {
                out.push(&active[self.pos..self.pos + take]);
                remaining -= take;
            }
            self.pos += take;
            if self.pos < active.len() {
                break;
            }
            self.idx += 1;
            self.pos = 0;
        }

        let fill = self.fill_state();
        Ok(IoVecs { vecs: out, fill })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{LineEnd, REQUEST_ALL, TERM_CRLF};

    #[test]
    fn test_read_stays_within_range() {
        let mut bucket = IovecBucket::new(vec![&b"abc"[..], &b"defg"[..]]);

        let chunk = bucket.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"abc");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = bucket.read(2).unwrap();
        assert_eq!(chunk.data, b"de");

        let chunk = bucket.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"fg");
        assert_eq!(chunk.fill, Fill::Eof);

        assert!(bucket.read(1).unwrap().is_drained());
    }

    #[test]
    fn test_read_iovec_gathers_ranges() {
        let mut bucket = IovecBucket::new(vec![&b"abc"[..], &b""[..], &b"defg"[..], &b"hi"[..]]);

        let vecs = bucket.read_iovec(REQUEST_ALL, 2).unwrap();
        assert_eq!(vecs.vecs, vec![&b"abc"[..], &b"defg"[..]]);
        assert_eq!(vecs.fill, Fill::More);

        let vecs = bucket.read_iovec(REQUEST_ALL, 8).unwrap();
        assert_eq!(vecs.vecs, vec![&b"hi"[..]]);
        assert_eq!(vecs.fill, Fill::Eof);
    }

    #[test]
    fn test_read_iovec_byte_limit_trims() {
        let mut bucket = IovecBucket::new(vec![&b"abc"[..], &b"defg"[..]]);

        let vecs = bucket.read_iovec(5, 8).unwrap();
        assert_eq!(vecs.vecs, vec![&b"abc"[..], &b"de"[..]]);
        assert_eq!(vecs.total_len(), 5);
        assert_eq!(vecs.fill, Fill::More);
    }

    #[test]
    fn test_readline_within_range() {
        let mut bucket = IovecBucket::new(vec![&b"one\r\ntw"[..], &b"o\r\n"[..]]);

        let line = bucket.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"one\r\n");
        assert_eq!(line.end, LineEnd::Crlf);

        // Partial: the rest of the line lives in the next range.
        let line = bucket.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"tw");
        assert_eq!(line.end, LineEnd::None);
        assert_eq!(line.fill, Fill::More);

        let line = bucket.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"o\r\n");
        assert_eq!(line.end, LineEnd::Crlf);
        assert_eq!(line.fill, Fill::Eof);
    }

    #[test]
    fn test_peek_head_range_only() {
        let mut bucket = IovecBucket::new(vec![&b"abc"[..], &b"def"[..]]);

        let chunk = bucket.peek().unwrap();
        assert_eq!(chunk.data, b"abc");
        assert_eq!(chunk.fill, Fill::More);

        bucket.read(REQUEST_ALL).unwrap();
        let chunk = bucket.peek().unwrap();
        assert_eq!(chunk.data, b"def");
        assert_eq!(chunk.fill, Fill::Eof);
    }
}
