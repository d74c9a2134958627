//! A bucket over one contiguous byte range.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line};
use crate::status::Result;

enum SimpleData<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> SimpleData<'a> {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        match self {
            SimpleData::Borrowed(data) => data,
            SimpleData::Owned(data) => data,
        }
    }
}

/// Wraps a single in-memory byte range with declared ownership: borrowed
/// from the caller, copied at construction, or transferred in.
pub struct SimpleBucket<'a> {
    data: SimpleData<'a>,
    pos: usize,
}

impl<'a> SimpleBucket<'a> {
    /// The caller keeps ownership; the bytes must outlive the bucket.
    #[inline]
    pub fn borrowed(data: &'a [u8]) -> SimpleBucket<'a> {
        SimpleBucket {
            data: SimpleData::Borrowed(data),
            pos: 0,
        }
    }

    /// Copies the bytes into the bucket.
    #[inline]
    pub fn copied(data: &[u8]) -> SimpleBucket<'static> {
        SimpleBucket {
            data: SimpleData::Owned(data.to_vec()),
            pos: 0,
        }
    }

    /// Takes ownership of the bytes.
    #[inline]
    pub fn owned(data: Vec<u8>) -> SimpleBucket<'static> {
        SimpleBucket {
            data: SimpleData::Owned(data),
            pos: 0,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.data.as_slice().len() - self.pos
    }

    #[inline]
    fn fill_state(&self) -> Fill {
        if self.remaining() == 0 {
            Fill::Eof
        } else {
            Fill::More
        }
    }
}

impl<'a> Bucket for SimpleBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        let take = self.remaining().min(max);
        let start = self.pos;
        self.pos += take;

        Ok(Chunk {
            data: &self.data.as_slice()[start..start + take],
            fill: self.fill_state(),
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        let rest = &self.data.as_slice()[self.pos..];
        let (take, end) = scan_line(rest, accept);
        let start = self.pos;
        self.pos += take;

        Ok(Line {
            data: &self.data.as_slice()[start..start + take],
            end,
            fill: self.fill_state(),
        })
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        Ok(Chunk {
            data: &self.data.as_slice()[self.pos..],
            fill: Fill::Eof,
        })
    }
}
