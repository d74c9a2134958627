//! Adapter turning a "fill this buffer" callback into the full bucket
//! read contract.

use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line};
use crate::buffer::Buffer;
use crate::status::Result;

const WINDOW_SIZE: usize = 65536;

/// The filler is handed a scratch window and reports how many bytes it
/// produced plus whether more can ever follow. `Err(Wait)` is transparent:
/// nothing is buffered and the call is simply repeated later.
pub type FillFn<'a> = Box<dyn FnMut(&mut [u8]) -> Result<(usize, Fill)> + 'a>;

/// Synthesizes `read`/`readline`/`peek` on top of a fill callback. Bytes
/// are staged in a window and handed out through a serve buffer so a
/// returned slice stays valid until the next operation.
pub struct DataBuf<F> {
    fill: F,
    window: Buffer,
    out: Vec<u8>,
    done: bool,
}

impl<F> DataBuf<F>
where
    F: FnMut(&mut [u8]) -> Result<(usize, Fill)>,
{
    pub fn new(fill: F) -> DataBuf<F> {
        DataBuf {
            fill,
            window: Buffer::new(WINDOW_SIZE),
            out: Vec::new(),
            done: false,
        }
    }

    /// Run the callback once if the window is empty and the source has not
    /// ended.
    fn top_up(&mut self) -> Result<()> {
        if self.done || !self.window.is_empty() {
            return Ok(());
        }

        let (count, fill) = (self.fill)(self.window.write_slice())?;
        self.window.move_tail(count);

        if fill == Fill::Eof {
            self.done = true;
        }
        Ok(())
    }

    /// Move `take` bytes from the window into the serve buffer.
    fn serve(&mut self, take: usize) -> Fill {
        self.out.clear();
        self.out.extend_from_slice(&self.window.read_slice()[..take]);
        self.window.move_head(take);

        if self.done && self.window.is_empty() {
            Fill::Eof
        } else {
            Fill::More
        }
    }
}

impl<F> Bucket for DataBuf<F>
where
    F: FnMut(&mut [u8]) -> Result<(usize, Fill)>,
{
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.top_up()?;

        let take = self.window.len().min(max);
        let fill = self.serve(take);

        Ok(Chunk {
            data: &self.out,
            fill,
        })
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.top_up()?;

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
            fill: if self.done { Fill::Eof } else { Fill::More },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{LineEnd, REQUEST_ALL, TERM_CRLF};
    use crate::status::Error;

    #[test]
    fn test_serves_callback_output() {
        let mut feed: Vec<&[u8]> = vec![b"abc", b"defg"];
        feed.reverse();

        let mut databuf = DataBuf::new(move |buf: &mut [u8]| match feed.pop() {
            Some(data) => {
                buf[..data.len()].copy_from_slice(data);
                let fill = if feed.is_empty() { Fill::Eof } else { Fill::More };
                Ok((data.len(), fill))
            }
            None => Ok((0, Fill::Eof)),
        });

        let chunk = databuf.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"abc");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = databuf.read(2).unwrap();
        assert_eq!(chunk.data, b"de");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = databuf.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"fg");
        assert_eq!(chunk.fill, Fill::Eof);

        assert!(databuf.read(1).unwrap().is_drained());
    }

    #[test]
    fn test_wait_is_transparent() {
        let mut calls = 0;
        let mut databuf = DataBuf::new(move |buf: &mut [u8]| {
            calls += 1;
            match calls {
                1 => Err(Error::Wait),
                2 => {
                    buf[..5].copy_from_slice(b"later");
                    Ok((5, Fill::Eof))
                }
                _ => Ok((0, Fill::Eof)),
            }
        });

        assert_eq!(databuf.read(REQUEST_ALL).unwrap_err(), Error::Wait);

        let chunk = databuf.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"later");
        assert_eq!(chunk.fill, Fill::Eof);
    }

    #[test]
    fn test_eof_is_sticky() {
        let mut databuf = DataBuf::new(|_buf: &mut [u8]| Ok((0, Fill::Eof)));

        assert!(databuf.read(REQUEST_ALL).unwrap().is_drained());
        // The callback must not be consulted again; a second read still
        // reports the end.
        assert!(databuf.read(REQUEST_ALL).unwrap().is_drained());
        assert!(databuf.peek().unwrap().is_drained());
    }

    #[test]
    fn test_readline_over_window() {
        let mut sent = false;
        let mut databuf = DataBuf::new(move |buf: &mut [u8]| {
            if sent {
                return Ok((0, Fill::Eof));
            }
            sent = true;
            let data = b"one\r\ntwo";
            buf[..data.len()].copy_from_slice(data);
            Ok((data.len(), Fill::Eof))
        });

        let line = databuf.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"one\r\n");
        assert_eq!(line.end, LineEnd::Crlf);
        assert_eq!(line.fill, Fill::More);

        let line = databuf.readline(TERM_CRLF).unwrap();
        assert_eq!(line.data, b"two");
        assert_eq!(line.end, LineEnd::None);
        assert_eq!(line.fill, Fill::Eof);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut sent = false;
        let mut databuf = DataBuf::new(move |buf: &mut [u8]| {
            if sent {
                return Ok((0, Fill::Eof));
            }
            sent = true;
            buf[..3].copy_from_slice(b"abc");
            Ok((3, Fill::More))
        });

        let chunk = databuf.peek().unwrap();
        assert_eq!(chunk.data, b"abc");
        assert_eq!(chunk.fill, Fill::More);

        let chunk = databuf.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, b"abc");
    }
}
