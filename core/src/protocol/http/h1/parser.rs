/*
 * parser.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Histofeed, a keep-alive HTTPS feed fetcher.
 *
 * Histofeed is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Histofeed is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Histofeed.  If not, see <http://www.gnu.org/licenses/>.
 */

//! HTTP/1.1 response push parser: status line, headers, body (Content-Length, chunked, or
//! until close).
//!
//! Malformed status and chunk-size lines are logged and skipped rather than failing the
//! exchange; only a line longer than `MAX_LINE` stops the parser.

use std::fmt;

use bytes::BytesMut;
use tracing::warn;

use crate::config::Verbosity;
use crate::protocol::http::h1::line::{read_line, LineError, LineRead};
use crate::protocol::http::handler::ResponseHandler;

/// Where the parser is in the response. Only moves forward, except for `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Nothing received yet.
    None,
    Status,
    Headers,
    Body,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::None => "READ_NONE",
            Phase::Status => "READ_STATUS",
            Phase::Headers => "READ_HEADERS",
            Phase::Body => "READ_BODY",
            Phase::Done => "READ_DONE",
        })
    }
}

/// Framing the parser cannot recover from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FramingError(pub String);

/// Result of looking for a chunk-size line.
enum ChunkHeader {
    Incomplete,
    Size(u64),
    Skipped,
}

/// Push parser for one HTTP/1.1 response. Feed bytes via `receive`; the handler gets headers
/// and body data as soon as they are complete.
#[derive(Debug)]
pub struct ResponseParser {
    phase: Phase,
    status: u16,
    status_line: Option<String>,
    /// Reason phrase of a non-200 status, surfaced as the request's error.
    reason: Option<String>,
    content_length: Option<u64>,
    consumed: u64,
    chunked: bool,
    /// None: need the next chunk-size line.
    chunk_size: Option<u64>,
    chunk_left: u64,
    no_body: bool,
    verbosity: Verbosity,
}

impl ResponseParser {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            phase: Phase::None,
            status: 0,
            status_line: None,
            reason: None,
            content_length: None,
            consumed: 0,
            chunked: false,
            chunk_size: None,
            chunk_left: 0,
            no_body: false,
            verbosity,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Parsed status code; 0 until a status line with a numeric code has been seen.
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_line(&self) -> Option<&str> {
        self.status_line.as_deref()
    }

    /// Reason phrase of a non-200 response (or its bare code when there is no phrase).
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Body bytes delivered so far (after chunk framing is removed).
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    /// The response carries no body whatever its headers say (answer to HEAD).
    pub fn expect_no_body(&mut self) {
        self.no_body = true;
    }

    /// Back to the initial state, for resending the request on a fresh connection.
    pub fn reset(&mut self) {
        let verbosity = self.verbosity;
        let no_body = self.no_body;
        *self = Self::new(verbosity);
        self.no_body = no_body;
    }

    fn set_phase(&mut self, phase: Phase) {
        verbose!(self.verbosity, Verbose, "read state {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Force the exchange to its end (EOF or a tolerated transport error).
    pub fn finish(&mut self) {
        if self.phase != Phase::Done {
            self.set_phase(Phase::Done);
        }
    }

    /// Consume and parse as much as possible from buf. Partial lines stay in buf.
    pub fn receive<H: ResponseHandler + ?Sized>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), FramingError> {
        if self.phase == Phase::None && !buf.is_empty() {
            self.set_phase(Phase::Status);
        }
        while self.phase == Phase::Status || self.phase == Phase::Headers {
            let line = match read_line(buf) {
                LineRead::Incomplete => return Ok(()),
                LineRead::Line(line) => line,
                LineRead::Malformed(e) => {
                    self.malformed_line(e)?;
                    continue;
                }
            };
            if self.phase == Phase::Status {
                // Tolerate the CRLF that may trail a previous chunked body on this connection.
                if line.is_empty() {
                    continue;
                }
                verbose!(self.verbosity, Verbose, "status line: '{}'", line);
                self.parse_status(&line);
                self.set_phase(Phase::Headers);
            } else if line.is_empty() {
                self.end_of_headers();
            } else {
                verbose!(self.verbosity, Verbose, "header line '{}'", line);
                self.handle_header(&line, handler);
            }
        }
        while self.phase == Phase::Body && !buf.is_empty() {
            let before = buf.len();
            self.drain_body(buf, handler)?;
            if self.phase == Phase::Body && buf.len() == before {
                // Partial chunk-size or trailer line; wait for more bytes.
                break;
            }
        }
        Ok(())
    }

    fn malformed_line(&mut self, e: LineError) -> Result<(), FramingError> {
        if e.is_fatal() {
            return Err(FramingError(format!("{} in {}", e, self.phase)));
        }
        warn!(phase = %self.phase, "skipping {}", e);
        if let LineError::NotUtf8(line) = e {
            if self.phase == Phase::Status {
                self.status_line = Some(line);
                self.set_phase(Phase::Headers);
            }
        }
        Ok(())
    }

    /// "HTTP/1.1 200 OK": the code follows the first space; for anything but 200 the rest of
    /// the line becomes the error reported to the consumer.
    fn parse_status(&mut self, line: &str) {
        self.status_line = Some(line.to_string());
        let Some(space) = line.find(' ') else {
            warn!("invalid status line '{}'", line);
            return;
        };
        let rest = &line[space + 1..];
        let (code, reason) = match rest.find(' ') {
            Some(i) => (&rest[..i], Some(&rest[i + 1..])),
            None => (rest, None),
        };
        let digits: &str = {
            let end = code
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(code.len());
            &code[..end]
        };
        match digits.parse::<u16>() {
            Ok(n) => self.status = n,
            Err(_) => warn!("invalid status code in '{}'", line),
        }
        if self.status != 200 {
            let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(code);
            self.reason = Some(reason.to_string());
        }
    }

    fn handle_header<H: ResponseHandler + ?Sized>(&mut self, line: &str, handler: &mut H) {
        let (name, value) = match line.find(':') {
            Some(i) => (&line[..i], line[i + 1..].trim_start_matches(' ')),
            None => (line, ""),
        };
        if name.eq_ignore_ascii_case("Content-Length") {
            match value.trim().parse::<u64>() {
                Ok(n) => self.content_length = Some(n),
                Err(_) => warn!("ignoring invalid Content-Length '{}'", value),
            }
        } else if name.eq_ignore_ascii_case("Transfer-Encoding") && is_chunked(value) {
            self.chunked = true;
            self.chunk_size = None;
            self.chunk_left = 0;
        }
        handler.header(name, value);
    }

    fn end_of_headers(&mut self) {
        self.set_phase(Phase::Body);
        let bodiless = self.no_body
            || self.status == 204
            || self.status == 304
            || (100..200).contains(&self.status);
        if bodiless || (!self.chunked && self.content_length == Some(0)) {
            self.set_phase(Phase::Done);
        }
    }

    /// Read one chunk-size line, skipping the blank line that ends the previous chunk.
    fn read_chunk_size(&mut self, buf: &mut BytesMut) -> Result<ChunkHeader, FramingError> {
        loop {
            let line = match read_line(buf) {
                LineRead::Incomplete => return Ok(ChunkHeader::Incomplete),
                LineRead::Line(line) => line,
                LineRead::Malformed(LineError::NotUtf8(line)) => {
                    warn!("bad chunk size '{}'", line);
                    return Ok(ChunkHeader::Skipped);
                }
                LineRead::Malformed(e) => return self.malformed_line(e).map(|_| ChunkHeader::Skipped),
            };
            if line.is_empty() {
                continue;
            }
            return Ok(match parse_chunk_size(&line) {
                Some(n) => {
                    verbose!(self.verbosity, Firehose, "chunk size: {}, from '{}'", n, line);
                    ChunkHeader::Size(n)
                }
                None => {
                    warn!("bad chunk size '{}'", line);
                    ChunkHeader::Skipped
                }
            });
        }
    }

    fn drain_body<H: ResponseHandler + ?Sized>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), FramingError> {
        if !self.chunked {
            let take = match self.content_length {
                Some(cl) => usize::try_from(cl.saturating_sub(self.consumed))
                    .unwrap_or(usize::MAX)
                    .min(buf.len()),
                None => buf.len(),
            };
            if take > 0 {
                let data = buf.split_to(take);
                handler.body_chunk(&data);
                self.consumed += take as u64;
            }
            if self.content_length.is_some_and(|cl| self.consumed >= cl) {
                self.set_phase(Phase::Done);
            }
            return Ok(());
        }

        if self.chunk_size.is_none() {
            match self.read_chunk_size(buf)? {
                ChunkHeader::Incomplete | ChunkHeader::Skipped => return Ok(()),
                ChunkHeader::Size(n) => {
                    self.chunk_size = Some(n);
                    self.chunk_left = n;
                }
            }
        }
        if self.chunk_size == Some(0) {
            // Stays here until the blank line closing the trailer section has been read.
            if self.consume_trailers(buf, handler)? {
                self.set_phase(Phase::Done);
            }
            return Ok(());
        }
        let take = usize::try_from(self.chunk_left)
            .unwrap_or(usize::MAX)
            .min(buf.len());
        if take > 0 {
            let data = buf.split_to(take);
            handler.body_chunk(&data);
            self.consumed += take as u64;
            self.chunk_left -= take as u64;
        }
        if self.chunk_left == 0 {
            // Chunk drained; the next call reads a new size line.
            self.chunk_size = None;
        }
        Ok(())
    }

    /// Trailer fields after the last chunk, as far as they are buffered. True once the closing
    /// blank line has been consumed.
    fn consume_trailers<H: ResponseHandler + ?Sized>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<bool, FramingError> {
        loop {
            match read_line(buf) {
                LineRead::Incomplete => return Ok(false),
                LineRead::Line(line) if line.is_empty() => return Ok(true),
                LineRead::Line(line) => {
                    verbose!(self.verbosity, Verbose, "trailer line '{}'", line);
                    let (name, value) = match line.find(':') {
                        Some(i) => (&line[..i], line[i + 1..].trim_start_matches(' ')),
                        None => (line.as_str(), ""),
                    };
                    handler.header(name, value);
                }
                LineRead::Malformed(e) => self.malformed_line(e)?,
            }
        }
    }
}

/// True when the last transfer coding is `chunked`.
fn is_chunked(value: &str) -> bool {
    value
        .rsplit(',')
        .next()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

/// Hex chunk size, ignoring chunk extensions after ';'.
fn parse_chunk_size(line: &str) -> Option<u64> {
    let hex = line.split(';').next().unwrap_or("").trim();
    if hex.is_empty() {
        return None;
    }
    u64::from_str_radix(hex, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::handler::BufferingHandler;
    use tracing_test::traced_test;

    fn parser() -> ResponseParser {
        ResponseParser::new(Verbosity::Normal)
    }

    fn feed(p: &mut ResponseParser, h: &mut BufferingHandler, bytes: &[u8], buf: &mut BytesMut) {
        buf.extend_from_slice(bytes);
        p.receive(buf, h).unwrap();
    }

    #[test]
    fn status_code_is_parsed() {
        for (line, code) in [
            ("HTTP/1.1 200 OK\r\n", 200),
            ("HTTP/1.0 404 Not Found\r\n", 404),
            ("HTTP/1.1 503 Service Unavailable\r\n", 503),
            ("HTTP/1.1 301 Moved Permanently\r\n", 301),
        ] {
            let mut p = parser();
            let mut h = BufferingHandler::new();
            let mut buf = BytesMut::new();
            feed(&mut p, &mut h, line.as_bytes(), &mut buf);
            assert_eq!(p.status(), code, "{}", line);
            assert_eq!(p.phase(), Phase::Headers);
        }
    }

    #[test]
    #[traced_test]
    fn status_line_without_space_leaves_status_zero() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"garbage\r\n", &mut buf);
        assert_eq!(p.status(), 0);
        assert_eq!(p.phase(), Phase::Headers);
        assert_eq!(p.status_line(), Some("garbage"));
        assert!(logs_contain("invalid status line"));
    }

    #[test]
    fn non_200_reason_is_captured() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"HTTP/1.1 401 NoLinkedYouTubeAccount\r\n", &mut buf);
        assert_eq!(p.status(), 401);
        assert_eq!(p.reason(), Some("NoLinkedYouTubeAccount"));

        let mut p = parser();
        feed(&mut p, &mut h, b"HTTP/1.1 200 OK\r\n", &mut buf);
        assert_eq!(p.reason(), None);
    }

    #[test]
    fn bare_code_becomes_reason() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"HTTP/1.1 500\r\n", &mut buf);
        assert_eq!(p.reason(), Some("500"));
    }

    #[test]
    fn chunked_hello() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n",
            &mut buf,
        );
        assert!(p.is_chunked());
        assert_eq!(p.phase(), Phase::Body);
        feed(&mut p, &mut h, b"5\r\nhello\r\n0\r\n\r\n", &mut buf);
        assert_eq!(h.deliveries, 1);
        assert_eq!(&h.body[..], b"hello");
        assert!(p.is_done());
        assert!(buf.is_empty());
    }

    #[test]
    fn chunked_split_everywhere() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4;ext=1\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\nX-Trailer: yes\r\n\r\n";
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        for (i, b) in wire.iter().enumerate() {
            assert!(!p.is_done(), "done early at byte {}", i);
            feed(&mut p, &mut h, &[*b], &mut buf);
        }
        assert!(p.is_done());
        assert_eq!(&h.body[..], b"Wikipedia in\r\n\r\nchunks.");
        assert_eq!(h.header_value("X-Trailer"), Some("yes"));
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_chunk_waits_for_closing_crlf() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r",
            &mut buf,
        );
        assert_eq!(p.phase(), Phase::Body);
        assert_eq!(&buf[..], b"\r");
        feed(&mut p, &mut h, b"\n", &mut buf);
        assert!(p.is_done());
        assert!(buf.is_empty());
        assert_eq!(&h.body[..], b"abc");
    }

    #[test]
    fn overlong_trailer_is_fatal() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n",
            &mut buf,
        );
        buf.extend_from_slice(&vec![b'x'; crate::protocol::http::h1::line::MAX_LINE + 10]);
        assert!(p.receive(&mut buf, &mut h).is_err());
    }

    #[test]
    #[traced_test]
    fn malformed_chunk_size_is_skipped() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n3\r\nabc\r\n0\r\n\r\n",
            &mut buf,
        );
        assert!(logs_contain("bad chunk size"));
        assert!(p.is_done());
        assert_eq!(&h.body[..], b"abc");
    }

    #[test]
    fn content_length_in_fragments() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhell",
            &mut buf,
        );
        assert_eq!(p.phase(), Phase::Body);
        assert_eq!(p.consumed(), 4);
        feed(&mut p, &mut h, b"o world", &mut buf);
        assert!(p.is_done());
        assert_eq!(p.consumed(), 11);
        assert_eq!(&h.body[..], b"hello world");
    }

    #[test]
    fn content_length_stops_at_declared_size() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabcEXTRA",
            &mut buf,
        );
        assert!(p.is_done());
        assert_eq!(&h.body[..], b"abc");
        assert_eq!(&buf[..], b"EXTRA");
    }

    #[test]
    fn headers_forwarded_in_wire_order() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nContent-Type:   text/xml\r\nX-Flag\r\nContent-Length: 0\r\n\r\n",
            &mut buf,
        );
        assert_eq!(
            h.headers,
            vec![
                ("Content-Type".to_string(), "text/xml".to_string()),
                ("X-Flag".to_string(), String::new()),
                ("Content-Length".to_string(), "0".to_string()),
            ]
        );
        assert!(p.is_done());
    }

    #[test]
    fn without_length_body_runs_until_finish() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"HTTP/1.1 200 OK\r\n\r\nsome", &mut buf);
        feed(&mut p, &mut h, b" more", &mut buf);
        assert_eq!(p.phase(), Phase::Body);
        p.finish();
        assert!(p.is_done());
        assert_eq!(&h.body[..], b"some more");
    }

    #[test]
    fn no_content_has_no_body() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"HTTP/1.1 204 No Content\r\n\r\n", &mut buf);
        assert!(p.is_done());
    }

    #[test]
    fn reset_returns_to_none() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 404 Nope\r\nTransfer-Encoding: chunked\r\n",
            &mut buf,
        );
        p.reset();
        assert_eq!(p.phase(), Phase::None);
        assert_eq!(p.status(), 0);
        assert!(!p.is_chunked());
        assert_eq!(p.reason(), None);
    }

    #[test]
    fn overlong_header_is_fatal() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\n"[..]);
        buf.extend_from_slice(&vec![b'x'; crate::protocol::http::h1::line::MAX_LINE + 10]);
        assert!(p.receive(&mut buf, &mut h).is_err());
    }

    #[test]
    fn leading_blank_line_is_ignored() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(&mut p, &mut h, b"\r\nHTTP/1.1 200 OK\r\n", &mut buf);
        assert_eq!(p.status(), 200);
    }

    #[test]
    fn oversized_lengths_deliver_what_is_buffered() {
        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1000000000\r\npartial",
            &mut buf,
        );
        assert_eq!(p.phase(), Phase::Body);
        assert_eq!(&h.body[..], b"partial");
        assert!(buf.is_empty());

        let mut p = parser();
        let mut h = BufferingHandler::new();
        let mut buf = BytesMut::new();
        feed(
            &mut p,
            &mut h,
            b"HTTP/1.1 200 OK\r\nContent-Length: 68719476736\r\n\r\nsome",
            &mut buf,
        );
        assert_eq!(p.content_length(), Some(1 << 36));
        assert_eq!(p.consumed(), 4);
        assert_eq!(p.phase(), Phase::Body);
    }

    #[test]
    fn chunk_size_parsing() {
        assert_eq!(parse_chunk_size("1a"), Some(26));
        assert_eq!(parse_chunk_size("FF;name=value"), Some(255));
        assert_eq!(parse_chunk_size(" 0 "), Some(0));
        assert_eq!(parse_chunk_size("xyz"), None);
        assert_eq!(parse_chunk_size(""), None);
        assert!(is_chunked("gzip, chunked"));
        assert!(!is_chunked("chunked, gzip"));
    }
}
