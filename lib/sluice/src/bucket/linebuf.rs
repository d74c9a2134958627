//! Incremental line reader tolerant of CR, LF, CRLF and of a CRLF split
//! across two arrivals.

use crate::bucket::{Bucket, Fill, LineEnd};
use crate::status::{Error, Result};

// A logical line longer than this is a protocol violation.
const LINE_LIMIT: usize = 8000;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LineState {
    /// Nothing accumulated yet.
    Empty,
    /// A prefix of a line is buffered; the terminator has not been seen.
    Partial,
    /// One complete logical line is buffered, terminator stripped.
    Ready,
    /// The line's terminating CR was consumed at the end of the available
    /// data; whether a paired LF follows must be resolved on the next
    /// fetch.
    CrlfSplit,
}

/// What a completed fetch found.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Fetch {
    /// A line is ready.
    Line,
    /// The source ended. Anything accumulated is an unterminated tail;
    /// `len()` tells whether there is one.
    End,
}

/// Accumulates one logical line at a time from a bucket. A fetch that
/// returns `Err(Wait)` leaves the accumulated state untouched and is
/// resumed by calling `fetch` again.
pub struct LineBuffer {
    line: Vec<u8>,
    state: LineState,
}

impl LineBuffer {
    #[inline]
    pub fn new() -> LineBuffer {
        LineBuffer {
            line: Vec::new(),
            state: LineState::Empty,
        }
    }

    #[inline]
    pub fn state(&self) -> LineState {
        self.state
    }

    /// Content of the completed line, without its terminator. Valid in
    /// `Ready`; mid-accumulation it exposes the partial content.
    #[inline]
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.line.len()
    }

    /// Drive one logical line out of `source`. A previous `Ready` line is
    /// discarded first. Returns `Fetch::Line` once a terminator (from
    /// `accept`) completed a line, `Fetch::End` at source end.
    pub fn fetch(&mut self, source: &mut dyn Bucket, accept: u8) -> Result<Fetch> {
        if self.state == LineState::Ready {
            self.line.clear();
            self.state = LineState::Empty;
        }

        loop {
            match self.state {
                LineState::Ready => return Ok(Fetch::Line),
                LineState::CrlfSplit => self.resolve_split(source)?,
                LineState::Empty | LineState::Partial => {
                    let done = self.accumulate(source, accept)?;
                    if done {
                        return Ok(Fetch::End);
                    }
                }
            }
        }
    }

    /// Pull the next piece of the line. Returns true when the source is
    /// exhausted without completing one.
    fn accumulate(&mut self, source: &mut dyn Bucket, accept: u8) -> Result<bool> {
        let line = source.readline(accept)?;

        let (content, next_state) = match line.end {
            LineEnd::None => (line.data, LineState::Partial),
            LineEnd::Cr | LineEnd::Lf => (&line.data[..line.data.len() - 1], LineState::Ready),
            LineEnd::Crlf => (&line.data[..line.data.len() - 2], LineState::Ready),
            LineEnd::CrSplit => (&line.data[..line.data.len() - 1], LineState::CrlfSplit),
        };

        if self.line.len() + content.len() > LINE_LIMIT {
            return Err(Error::LineTooLong);
        }

        self.line.extend_from_slice(content);
        self.state = next_state;

        if self.state == LineState::Partial && line.fill == Fill::Eof {
            // Source ended mid-line; report it and leave the tail visible.
            if line.data.is_empty() && self.line.is_empty() {
                self.state = LineState::Empty;
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Decide CR vs CRLF by looking at the next visible byte. At a true
    /// source end no byte can ever arrive, so the lone CR counts as a full
    /// terminator and the line completes.
    fn resolve_split(&mut self, source: &mut dyn Bucket) -> Result<()> {
        let consume_lf = {
            let next = source.peek()?;
            if next.data.is_empty() {
                match next.fill {
                    Fill::Eof => false,
                    Fill::More => return Err(Error::Wait),
                }
            } else {
                next.data[0] == b'\n'
            }
        };

        if consume_lf {
            source.read(1)?;
        }
        self.state = LineState::Ready;
        Ok(())
    }
}
