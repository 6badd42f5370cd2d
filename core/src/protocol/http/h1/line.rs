/*
 * line.rs
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

//! Incremental CRLF line reader over the receive buffer.
//!
//! Lines end with a strict CRLF; a bare LF does not terminate a line. Partial lines stay in
//! the buffer until more bytes arrive.

use bytes::BytesMut;

/// Longest status, header or chunk-size line accepted.
pub const MAX_LINE: usize = 16 * 1024;

/// Outcome of one `read_line` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// No complete line buffered yet; nothing consumed.
    Incomplete,
    /// One line, CRLF stripped and consumed.
    Line(String),
    /// A complete line that is not UTF-8 (consumed), or a line longer than `MAX_LINE`.
    Malformed(LineError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// Lossy rendering of the offending line, for diagnostics.
    #[error("non-UTF-8 line '{0}'")]
    NotUtf8(String),
    #[error("line of {0} bytes without CRLF")]
    TooLong(usize),
}

impl LineError {
    /// True when parsing cannot continue past this line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LineError::TooLong(_))
    }
}

/// Find CRLF in buf; return the offset of the CR, or None if not found.
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Take one line off the front of `buf`.
pub fn read_line(buf: &mut BytesMut) -> LineRead {
    let line_end = match find_crlf(buf) {
        Some(n) => n,
        None if buf.len() > MAX_LINE => {
            return LineRead::Malformed(LineError::TooLong(buf.len()));
        }
        None => return LineRead::Incomplete,
    };
    if line_end > MAX_LINE {
        return LineRead::Malformed(LineError::TooLong(line_end));
    }
    let line = buf.split_to(line_end + 2);
    match std::str::from_utf8(&line[..line_end]) {
        Ok(s) => LineRead::Line(s.to_string()),
        Err(_) => LineRead::Malformed(LineError::NotUtf8(
            String::from_utf8_lossy(&line[..line_end]).into_owned(),
        )),
    }
}
