//! HTTP/1.x response parser over a raw byte stream.

use crate::bucket::aggregate::AggregateBucket;
use crate::bucket::headers::HeadersBucket;
use crate::bucket::linebuf::{Fetch, LineBuffer};
use crate::bucket::simple::SimpleBucket;
use crate::bucket::{scan_line, Bucket, Chunk, Fill, Line, LineEnd, TERM_ANY};
use crate::http::chunked::{ChunkedDecoder, Span};
use crate::status::{Error, Result};
use weir::config::Config;
use weir::logging::{self, debug, trace, Logger};

/// Parsed status line. `version` packs the dotted pair as
/// `major * 1000 + minor`, so HTTP/1.1 is 1001.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusLine {
    pub version: u32,
    pub code: u16,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum ParseState {
    StatusLine,
    Headers,
    Body,
    Trailers,
    Done,
}

enum Framing {
    ContentLength { left: u64 },
    Chunked(ChunkedDecoder),
    CloseDelimited,
}

/// Parses a response incrementally: status line, headers, then the body
/// under the framing the headers selected. Body reads are served straight
/// from the underlying stream. All operations return `Err(Wait)` while
/// the input needed to make progress has not arrived; a parse failure
/// kills the bucket.
pub struct ResponseBucket<'a> {
    stream: Box<dyn Bucket + 'a>,
    linebuf: LineBuffer,
    state: ParseState,
    status: Option<StatusLine>,
    raw_status_line: Vec<u8>,
    headers: HeadersBucket,
    framing: Option<Framing>,
    log: Logger,
}

impl<'a> ResponseBucket<'a> {
    pub fn new<'l, L: Into<Option<&'l Logger>>>(
        stream: Box<dyn Bucket + 'a>,
        log: L,
    ) -> ResponseBucket<'a> {
        ResponseBucket {
            stream,
            linebuf: LineBuffer::new(),
            state: ParseState::StatusLine,
            status: None,
            raw_status_line: Vec::new(),
            headers: HeadersBucket::new(),
            framing: None,
            log: logging::child(log),
        }
    }

    /// Drive the parser until the status line is available.
    pub fn status(&mut self) -> Result<&StatusLine> {
        while self.state == ParseState::StatusLine {
            self.step()?;
        }
        Ok(self
            .status
            .as_ref()
            .expect("Status line must be parsed past STATUS_LINE"))
    }

    /// Drive the parser until the headers block is complete and body
    /// framing is decided.
    pub fn wait_for_headers(&mut self) -> Result<()> {
        while matches!(self.state, ParseState::StatusLine | ParseState::Headers) {
            self.step()?;
        }
        Ok(())
    }

    /// The parsed headers. Trailing headers of a chunked body are merged
    /// in once the body has been drained. Valid once `wait_for_headers`
    /// has returned `Ok`.
    #[inline]
    pub fn headers(&self) -> &HeadersBucket {
        &self.headers
    }

    /// Convert into an aggregate that re-emits the response as raw bytes:
    /// original status line, serialized headers, blank line, then the
    /// remaining (undecoded) body. Call once the headers have been parsed;
    /// parts not yet parsed are emitted as part of the remaining stream.
    pub fn into_aggregate(self) -> AggregateBucket<'a> {
        let mut raw = self.raw_status_line.clone();
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&self.headers.to_bytes());

        let mut aggregate = AggregateBucket::new();
        aggregate.append(Box::new(SimpleBucket::owned(raw)));
        aggregate.append(self.stream);
        aggregate
    }

    /// One state-machine step: consume one logical line.
    fn step(&mut self) -> Result<()> {
        match self.state {
            ParseState::StatusLine => {
                match self.linebuf.fetch(&mut *self.stream, TERM_ANY)? {
                    Fetch::End => return Err(Error::TruncatedResponse),
                    Fetch::Line => {
                        self.raw_status_line = self.linebuf.line().to_vec();
                        let status = parse_status_line(self.linebuf.line())?;

                        debug!(self.log, "status line parsed";
                               "context" => "step",
                               "version" => status.version,
                               "code" => status.code);

                        self.status = Some(status);
                        self.state = ParseState::Headers;
                    }
                }
            }
            ParseState::Headers => match self.linebuf.fetch(&mut *self.stream, TERM_ANY)? {
                Fetch::End => return Err(Error::TruncatedResponse),
                Fetch::Line => {
                    if self.linebuf.line().is_empty() {
                        let framing = self.select_framing()?;
                        self.framing = Some(framing);
                        self.state = ParseState::Body;

                        debug!(self.log, "headers complete";
                               "context" => "step",
                               "count" => self.headers.len());
                    } else {
                        let (name, value) = parse_header_line(self.linebuf.line())?;
                        self.headers.set(&name, &value);
                    }
                }
            },
            ParseState::Body | ParseState::Trailers | ParseState::Done => (),
        }
        Ok(())
    }

    /// Ensure the parser is past the headers; body reads are not legal
    /// earlier.
    fn run(&mut self) -> Result<()> {
        self.wait_for_headers()
    }

    /// Decide how the body ends. Chunked transfer wins over a length;
    /// without either the body runs to the connection close.
    fn select_framing(&self) -> Result<Framing> {
        if let Some(encoding) = self.headers.get("Transfer-Encoding") {
            if value_has_token(encoding, "chunked") {
                return Ok(Framing::Chunked(ChunkedDecoder::new()));
            }
        }

        if let Some(length) = self.headers.get("Content-Length") {
            let left = parse_content_length(length)?;
            return Ok(Framing::ContentLength { left });
        }

        Ok(Framing::CloseDelimited)
    }

    /// Parse trailing headers into the header map until the final blank
    /// line. The stream ending early completes the response: the terminal
    /// chunk already ended the body proper.
    fn read_trailers(&mut self) -> Result<()> {
        while self.state == ParseState::Trailers {
            match self.linebuf.fetch(&mut *self.stream, TERM_ANY)? {
                Fetch::End => self.state = ParseState::Done,
                Fetch::Line => {
                    if self.linebuf.line().is_empty() {
                        self.state = ParseState::Done;
                    } else {
                        let (name, value) = parse_header_line(self.linebuf.line())?;
                        trace!(self.log, "trailing header";
                               "context" => "read_trailers",
                               "name" => name.as_str());
                        self.headers.set(&name, &value);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_content_length(&mut self, max: usize) -> Result<Chunk<'_>> {
        let left = match self.framing {
            Some(Framing::ContentLength { left }) => left,
            _ => unreachable!("Framing must be length-delimited"),
        };

        if left == 0 {
            self.state = ParseState::Done;
            return Ok(Chunk::eof());
        }

        let want = (left as usize).min(max);
        let chunk = self.stream.read(want)?;
        let served = chunk.data.len() as u64;

        if chunk.fill == Fill::Eof && served < left {
            if chunk.data.is_empty() {
                return Err(Error::TruncatedResponse);
            }
            // Surface the bytes now; the shortfall is reported on the
            // next read.
            self.framing = Some(Framing::ContentLength { left: left - served });
            return Ok(Chunk {
                data: chunk.data,
                fill: Fill::More,
            });
        }

        let left = left - served;
        self.framing = Some(Framing::ContentLength { left });
        let fill = if left == 0 {
            self.state = ParseState::Done;
            Fill::Eof
        } else {
            Fill::More
        };

        Ok(Chunk {
            data: chunk.data,
            fill,
        })
    }

    fn read_chunked(&mut self, max: usize) -> Result<Chunk<'_>> {
        let span = {
            let decoder = match self.framing {
                Some(Framing::Chunked(ref mut decoder)) => decoder,
                _ => unreachable!("Framing must be chunked"),
            };
            decoder.plan(&mut *self.stream, max)?
        };

        match span {
            Span::Terminal => {
                self.state = ParseState::Trailers;
                self.read_trailers()?;
                Ok(Chunk::eof())
            }
            Span::Bytes(want) => {
                let ResponseBucket {
                    stream, framing, ..
                } = self;

                let chunk = stream.read(want)?;
                if let Some(Framing::Chunked(decoder)) = framing {
                    decoder.consume(chunk.data.len(), chunk.fill)?;
                }

                Ok(Chunk {
                    data: chunk.data,
                    fill: Fill::More,
                })
            }
        }
    }

    fn read_close_delimited(&mut self, max: usize) -> Result<Chunk<'_>> {
        let chunk = self.stream.read(max)?;
        if chunk.fill == Fill::Eof {
            self.state = ParseState::Done;
        }
        Ok(chunk)
    }
}

impl<'a> Bucket for ResponseBucket<'a> {
    fn read(&mut self, max: usize) -> Result<Chunk<'_>> {
        self.run()?;

        match self.state {
            ParseState::Trailers => {
                self.read_trailers()?;
                Ok(Chunk::eof())
            }
            ParseState::Done => Ok(Chunk::eof()),
            _ => match self.framing {
                Some(Framing::ContentLength { .. }) => self.read_content_length(max),
                Some(Framing::Chunked(_)) => self.read_chunked(max),
                Some(Framing::CloseDelimited) => self.read_close_delimited(max),
                None => unreachable!("Framing must be set past HEADERS"),
            },
        }
    }

    fn readline(&mut self, accept: u8) -> Result<Line<'_>> {
        self.run()?;

        match self.state {
            ParseState::Trailers => {
                self.read_trailers()?;
                Ok(Line::eof())
            }
            ParseState::Done => Ok(Line::eof()),
            _ => match self.framing {
                Some(Framing::CloseDelimited) => {
                    let line = self.stream.readline(accept)?;
                    if line.fill == Fill::Eof {
                        self.state = ParseState::Done;
                    }
                    Ok(line)
                }
                _ => {
                    // Bounded framing: scan the visible window, then take
                    // exactly the line's bytes through the framed read
                    // path.
                    let take = {
                        let visible = self.peek()?;
                        if visible.data.is_empty() {
                            0
                        } else {
                            let (take, _) = scan_line(visible.data, accept);
                            take
                        }
                    };

                    if take == 0 {
                        // Nothing visible: let the framed read surface the
                        // real status (end, truncation, or stall).
                        let chunk = self.read(1)?;
                        return Ok(Line {
                            data: chunk.data,
                            end: LineEnd::None,
                            fill: chunk.fill,
                        });
                    }

                    let chunk = self.read(take)?;
                    let (_, end) = scan_line(chunk.data, accept);
                    Ok(Line {
                        data: chunk.data,
                        end,
                        fill: chunk.fill,
                    })
                }
            },
        }
    }

    fn peek(&mut self) -> Result<Chunk<'_>> {
        self.run()?;

        match self.state {
            ParseState::Trailers | ParseState::Done => Ok(Chunk::eof()),
            _ => match self.framing {
                Some(Framing::ContentLength { left }) => {
                    if left == 0 {
                        return Ok(Chunk::eof());
                    }
                    let chunk = self.stream.peek()?;
                    let visible = (chunk.data.len() as u64).min(left) as usize;
                    let fill = if (visible as u64) == left {
                        Fill::Eof
                    } else {
                        Fill::More
                    };
                    Ok(Chunk {
                        data: &chunk.data[..visible],
                        fill,
                    })
                }
                Some(Framing::Chunked(_)) => {
                    let span = {
                        let decoder = match self.framing {
                            Some(Framing::Chunked(ref mut decoder)) => decoder,
                            _ => unreachable!(),
                        };
                        decoder.plan(&mut *self.stream, usize::MAX)?
                    };

                    match span {
                        Span::Terminal => Ok(Chunk {
                            data: &[],
                            fill: Fill::More,
                        }),
                        Span::Bytes(want) => {
                            let chunk = self.stream.peek()?;
                            let visible = chunk.data.len().min(want);
                            Ok(Chunk {
                                data: &chunk.data[..visible],
                                fill: Fill::More,
                            })
                        }
                    }
                }
                Some(Framing::CloseDelimited) => self.stream.peek(),
                None => unreachable!("Framing must be set past HEADERS"),
            },
        }
    }

    fn set_config(&mut self, config: &Config) {
        self.stream.set_config(config);
    }
}

/// `HTTP/<d>.<d> <ddd> <reason>`; anything else is a bad response.
fn parse_status_line(line: &[u8]) -> Result<StatusLine> {
    if line.len() < 12 || !line.starts_with(b"HTTP/") {
        return Err(Error::BadResponse);
    }

    let major = line[5];
    let minor = line[7];
    if !major.is_ascii_digit() || line[6] != b'.' || !minor.is_ascii_digit() || line[8] != b' ' {
        return Err(Error::BadResponse);
    }

    let mut code: u16 = 0;
    for &byte in &line[9..12] {
        if !byte.is_ascii_digit() {
            return Err(Error::BadResponse);
        }
        code = code * 10 + u16::from(byte - b'0');
    }

    let reason = match line.len() {
        12 => String::new(),
        _ => {
            if line[12] != b' ' {
                return Err(Error::BadResponse);
            }
            String::from_utf8_lossy(&line[13..]).into_owned()
        }
    };

    Ok(StatusLine {
        version: u32::from(major - b'0') * 1000 + u32::from(minor - b'0'),
        code,
        reason,
    })
}

/// Split `<name> ":" [LWS] <value>`; a line without a colon is a bad
/// header.
fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let colon = line
        .iter()
        .position(|&byte| byte == b':')
        .ok_or(Error::BadHeader)?;

    let name = trim_lws(&line[..colon]);
    let mut value = &line[colon + 1..];
    while let Some((&first, rest)) = value.split_first() {
        if first != b' ' && first != b'\t' {
            break;
        }
        value = rest;
    }

    Ok((
        String::from_utf8_lossy(name).into_owned(),
        String::from_utf8_lossy(value).into_owned(),
    ))
}

fn trim_lws(mut bytes: &[u8]) -> &[u8] {
    while let Some((&first, rest)) = bytes.split_first() {
        if first != b' ' && first != b'\t' {
            break;
        }
        bytes = rest;
    }
    while let Some((&last, rest)) = bytes.split_last() {
        if last != b' ' && last != b'\t' {
            break;
        }
        bytes = rest;
    }
    bytes
}

/// Strict decimal: non-empty, unsigned, in range.
fn parse_content_length(value: &str) -> Result<u64> {
    if value.is_empty() || !value.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(Error::BadResponse);
    }
    value.parse::<u64>().map_err(|_| Error::BadResponse)
}

/// Case-insensitive token search in a comma-separated header value.
fn value_has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::mock::MockBucket;
    use crate::bucket::simple::SimpleBucket;
    use crate::bucket::REQUEST_ALL;

    fn response_over(input: &[u8]) -> ResponseBucket<'static> {
        ResponseBucket::new(Box::new(SimpleBucket::copied(input)), None)
    }

    fn drain_body(response: &mut ResponseBucket<'_>) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match response.read(REQUEST_ALL) {
                Ok(chunk) => {
                    out.extend_from_slice(chunk.data);
                    if chunk.fill == Fill::Eof {
                        return Ok(out);
                    }
                }
                Err(Error::Wait) => continue,
                Err(err) => return Err(err),
            }
        }
    }

    #[test]
    fn test_status_line_triple() {
        let mut response = response_over(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

        let status = response.status().unwrap();
        assert_eq!(status.version, 1001);
        assert_eq!(status.code, 200);
        assert_eq!(status.reason, "OK");
    }

    #[test]
    fn test_reason_preserved_verbatim() {
        let mut response =
            response_over(b"HTTP/1.0 404 Not  Found (weird)\r\nContent-Length: 0\r\n\r\n");

        let status = response.status().unwrap();
        assert_eq!(status.version, 1000);
        assert_eq!(status.code, 404);
        assert_eq!(status.reason, "Not  Found (weird)");
    }

    #[test]
    fn test_missing_reason() {
        let mut response = response_over(b"HTTP/1.1 204\r\n\r\n");
        let status = response.status().unwrap();
        assert_eq!(status.code, 204);
        assert_eq!(status.reason, "");
    }

    #[test]
    fn test_garbage_status_line() {
        let mut response = response_over(b"ICY 200 OK\r\n\r\n");
        assert_eq!(response.status().unwrap_err(), Error::BadResponse);
    }

    #[test]
    fn test_content_length_body() {
        let mut response =
            response_over(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nabc1234");

        assert_eq!(drain_body(&mut response).unwrap(), b"abc1234");
        assert!(response.read(1).unwrap().is_drained());
    }

    #[test]
    fn test_body_before_headers_is_wait() {
        let mut response = ResponseBucket::new(
            Box::new(MockBucket::new().data(b"HTTP/1.1 200 OK\r\nConte").wait().data(
                b"nt-Length: 3\r\n\r\nabc",
            )),
            None,
        );

        assert_eq!(response.read(REQUEST_ALL).unwrap_err(), Error::Wait);
        assert_eq!(drain_body(&mut response).unwrap(), b"abc");
    }

    #[test]
    fn test_headers_parsed() {
        let mut response = response_over(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nX-Dup: a\r\nx-dup: b\r\nContent-Length: 0\r\n\r\n",
        );

        response.wait_for_headers().unwrap();
        let headers = response.headers();
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("X-DUP"), Some("a,b"));
    }

    #[test]
    fn test_header_without_colon() {
        let mut response = response_over(b"HTTP/1.1 200 OK\r\nBroken header line\r\n\r\n");
        assert_eq!(response.wait_for_headers().unwrap_err(), Error::BadHeader);
    }

    #[test]
    fn test_header_lws_stripping() {
        let mut response = response_over(
            b"HTTP/1.1 200 OK\r\nPadded:  \tvalue with spaces\r\nContent-Length: 0\r\n\r\n",
        );

        response.wait_for_headers().unwrap();
        assert_eq!(response.headers().get("padded"), Some("value with spaces"));
    }

    #[test]
    fn test_truncated_content_length() {
        let body = vec![b'x'; 60];
        let mut input = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n".to_vec();
        input.extend_from_slice(&body);

        let mut response = response_over(&input);

        // The available bytes come out first, then the shortfall.
        let chunk = response.read(REQUEST_ALL).unwrap();
        assert_eq!(chunk.data, &body[..]);
        assert_eq!(chunk.fill, Fill::More);

        assert_eq!(
            response.read(REQUEST_ALL).unwrap_err(),
            Error::TruncatedResponse
        );
    }

    #[test]
    fn test_chunked_with_trailer() {
        let mut response = response_over(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n4\r\n1234\r\n0\r\nFooter: value\r\n\r\n",
        );

        assert_eq!(drain_body(&mut response).unwrap(), b"abc1234");
        assert_eq!(response.headers().get("Footer"), Some("value"));
    }

    #[test]
    fn test_chunked_split_crlf_arrival() {
        let mut response = ResponseBucket::new(
            Box::new(
                MockBucket::new()
                    .data(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n6\r")
                    .wait()
                    .data(b"\nblabla\r\n\r\n"),
            ),
            None,
        );

        assert_eq!(drain_body(&mut response).unwrap(), b"blabla");
    }

    #[test]
    fn test_close_delimited_body() {
        let mut response = response_over(b"HTTP/1.1 200 OK\r\n\r\nuntil the end");
        assert_eq!(drain_body(&mut response).unwrap(), b"until the end");
    }

    #[test]
    fn test_transfer_encoding_wins_over_length() {
        let mut response = response_over(
            b"HTTP/1.1 200 OK\r\nContent-Length: 999\r\nTransfer-Encoding: gzip, chunked\r\n\r\n2\r\nok\r\n0\r\n\r\n",
        );

        assert_eq!(drain_body(&mut response).unwrap(), b"ok");
    }

    #[test]
    fn test_malformed_content_length() {
        let mut response = response_over(b"HTTP/1.1 200 OK\r\nContent-Length: -1\r\n\r\n");
        assert_eq!(response.wait_for_headers().unwrap_err(), Error::BadResponse);
    }

    #[test]
    fn test_peek_bounded_by_length() {
        let mut response = response_over(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbodyEXTRA");

        let chunk = response.peek().unwrap();
        assert_eq!(chunk.data, b"body");
        assert_eq!(chunk.fill, Fill::Eof);

        assert_eq!(drain_body(&mut response).unwrap(), b"body");
    }

    #[test]
    fn test_readline_in_body() {
        let mut response =
            response_over(b"HTTP/1.1 200 OK\r\nContent-Length: 12\r\n\r\nline1\r\nline2EXTRA");

        let line = response.readline(crate::bucket::TERM_CRLF).unwrap();
        assert_eq!(line.data, b"line1\r\n");
        assert_eq!(line.end, LineEnd::Crlf);

        let line = response.readline(crate::bucket::TERM_CRLF).unwrap();
        assert_eq!(line.data, b"line2");
        assert_eq!(line.end, LineEnd::None);
        assert_eq!(line.fill, Fill::Eof);
    }

    #[test]
    fn test_into_aggregate_reemits_response() {
        let mut response =
            response_over(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nabc1234");
        response.wait_for_headers().unwrap();

        let mut raw = response.into_aggregate();
        let mut out = Vec::new();
        loop {
            let chunk = raw.read(REQUEST_ALL).unwrap();
            out.extend_from_slice(chunk.data);
            if chunk.fill == Fill::Eof {
                break;
            }
        }

        assert_eq!(
            out,
            b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nabc1234".to_vec()
        );
    }

    #[test]
    fn test_status_across_arrivals() {
        let mut response = ResponseBucket::new(
            Box::new(
                MockBucket::new()
                    .data(b"HTTP/1.1 30")
                    .wait()
                    .data(b"2 Found\r\nLocation: /else")
                    .wait()
                    .data(b"where\r\nContent-Length: 0\r\n\r\n"),
            ),
            None,
        );

        assert_eq!(response.status().unwrap_err(), Error::Wait);
        let status = response.status().unwrap();
        assert_eq!(status.code, 302);

        assert_eq!(response.wait_for_headers().unwrap_err(), Error::Wait);
        response.wait_for_headers().unwrap();
        assert_eq!(response.headers().get("Location"), Some("/elsewhere"));
    }

    #[test]
    fn test_eof_before_any_byte_is_truncation() {
        let mut response = response_over(b"");
        assert_eq!(response.status().unwrap_err(), Error::TruncatedResponse);
    }
}
