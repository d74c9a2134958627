//! An ordered queue of child buckets drained front to back.

use crate::bucket::{Bucket, Chunk, Fill, IoVecs, Line};
use crate::status::Result;
use std::collections::VecDeque;
use weir::config::Config;

/// Concatenates child buckets. Children are owned; a child that reports a
/// drained `Eof` is dropped inside the same call so a reader never sees a
/// spurious end between segments.
pub struct AggregateBucket<'a> {
    children: VecDeque<Box<dyn Bucket + 'a>>,
}

impl<'a> AggregateBucket<'a> {
    #[inline]
    pub fn new() -> AggregateBucket<'a> {
        AggregateBucket {
            children: VecDeque::new(),
        }
    }

    /// Add a child at the tail; its content follows everything already
    /// queued.
    #[inline]
    pub fn append(&mut self, child: Box<dyn Bucket + 'a>) {
        self.children.push_back(child);
    }

    /// Add a child at the head; its content precedes everything already
    /// queued.
    #[inline]
    pub fn prepend(&mut self, child: Box<dyn Bucket + 'a>) {
        self.children.push_front(child);
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Drop leading children that have nothing left. A child whose peek
    /// fails transiently is kept; the subsequent read will surface the
    /// status.
    fn drop_exhausted(&mut self) {
        while let Some(head) = self.children.front_mut() {
            let drained = match head.peek() {
                Ok(chunk) => chunk.is_drained(),
                Err(_) => false,
            };

            if !drained {
                return;
            }
            self.children.pop_front();
        }
    }

    /// True while more children follow the head, in which case a
    /// head-local `Eof` must not leak out as the aggregate's own end.
    #[inline]
    fn head_is_last(&self) -> bool {
        self.children.len() <= 1
    }
}

impl<'a> Bucket for AggregateBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.drop_exhausted();
        let last = self.head_is_last();

        match self.children.front_mut() {
            None => Ok(Chunk::eof()),
            Some(head) => {
                let mut chunk = head.read(max)?;
                if chunk.fill == Fill::Eof && !last {
                    chunk.fill = Fill::More;
                }
                Ok(chunk)
            }
        }
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.drop_exhausted();
        let last = self.head_is_last();

        match self.children.front_mut() {
            None => Ok(Line::eof()),
            Some(head) => {
                let mut line = head.readline(accept)?;
                if line.fill == Fill::Eof && !last {
                    line.fill = Fill::More;
                }
                Ok(line)
            }
        }
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.drop_exhausted();
        let last = self.head_is_last();

        match self.children.front_mut() {
            None => Ok(Chunk::eof()),
            Some(head) => {
                let mut chunk = head.peek()?;
                if chunk.fill == Fill::Eof && !last {
                    chunk.fill = Fill::More;
                }
                Ok(chunk)
            }
        }
    }

    fn read_iovec(&mut self, max: usize, max_vecs: usize) -> Result<IoVecs<'_>> {
        self.drop_exhausted();
        let last = self.head_is_last();

        match self.children.front_mut() {
            None => Ok(IoVecs {
                vecs: Vec::new(),
                fill: Fill::Eof,
            }),
            Some(head) => {
                let mut vecs = head.read_iovec(max, max_vecs)?;
                if vecs.fill == Fill::Eof && !last {
                    vecs.fill = Fill::More;
                }
                Ok(vecs)
            }
        }
    }

    fn set_config(&mut self, config: &Config) {
        for child in &mut self.children {
            child.set_config(config);
        }
    }
}
