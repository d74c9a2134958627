//! Scripted byte source for exercising consumers against arrival patterns
//! a live transport produces: partial segments, stalls, failures, EOF.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line};
use crate::status::{Error, Result};
use std::collections::VecDeque;

enum Step {
    Data(Vec<u8>),
    Wait,
    Fail(Error),
}

/// Plays back a script of data segments, one-shot stalls and one-shot
/// failures, then reports EOF forever. Segments are never merged: a read
/// stops at a segment boundary the way a socket read stops at a datagram
/// or TLS-record boundary.
pub struct MockBucket {
    script: VecDeque<Step>,
    current: Vec<u8>,
    pos: usize,
}

impl MockBucket {
    #[inline]
    pub fn new() -> MockBucket {
        MockBucket {
            script: VecDeque::new(),
            current: Vec::new(),
            pos: 0,
        }
    }

    /// Queue a data segment.
    pub fn data(mut self, bytes: &[u8]) -> MockBucket {
        self.script.push_back(Step::Data(bytes.to_vec()));
        self
    }

    /// Queue one `Wait`: the next operation reports it and the script
    /// moves on, modelling data that arrives on a later loop iteration.
    pub fn wait(mut self) -> MockBucket {
        self.script.push_back(Step::Wait);
        self
    }

    /// Queue one failure status.
    pub fn fail(mut self, err: Error) -> MockBucket {
        self.script.push_back(Step::Fail(err));
        self
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.current.len() - self.pos
    }

    /// Ensure the active segment has bytes, consuming stall/failure steps
    /// encountered on the way.
    fn pump(&mut self) -> Result<Fill> {
        while self.remaining() == 0 {
            match self.script.pop_front() {
                None => return Ok(Fill::Eof),
                Some(Step::Data(bytes)) => {
                    self.current = bytes;
                    self.pos = 0;
                }
                Some(Step::Wait) => return Err(Error::Wait),
                Some(Step::Fail(err)) => return Err(err),
            }
        }
        Ok(Fill::More)
    }

    #[inline]
    fn fill_state(&self) -> Fill {
        if self.remaining() == 0 && self.script.is_empty() {
            Fill::Eof
        } else {
            Fill::More
        }
    }
}

impl Bucket for MockBucket {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        if self.pump()? == Fill::Eof {
            return Ok(Chunk::eof());
        }

        let take = self.remaining().min(max);
        let start = self.pos;
        self.pos += take;

        Ok(Chunk {
            data: &self.current[start..start + take],
            fill: self.fill_state(),
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        if self.pump()? == Fill::Eof {
            return Ok(Line::eof());
        }

        let (take, end) = scan_line(&self.current[self.pos..], accept);
        let start = self.pos;
        self.pos += take;

        Ok(Line {
            data: &self.current[start..start + take],
            end,
            fill: self.fill_state(),
        })
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        if self.pump()? == Fill::Eof {
            return Ok(Chunk::eof());
        }

        Ok(Chunk {
            data: &self.current[self.pos..],
            fill: if self.script.is_empty() {
                Fill::Eof
            } else {
                Fill::More
            },
        })
    }
}
