/*
 * error.rs
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

//! Request errors. Every error is scoped to one request and handed to `ResponseHandler::done`.

use std::collections::TryReserveError;
use std::io;
use std::time::Duration;

/// Terminal error of one request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No connection could be set up; the request was never sent.
    #[error("failed to set up connection to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The request body could not be copied.
    #[error("out of memory copying {len} byte request body")]
    Allocation {
        len: usize,
        #[source]
        source: TryReserveError,
    },

    /// Non-200 status; `reason` is the rest of the status line, surfaced verbatim.
    #[error("{reason}")]
    Status { code: u16, reason: String },

    /// Transport failure with no status line parsed.
    #[error("socket error talking to {host}: {source}")]
    Socket {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Transport failure after a non-200 status line.
    #[error("{host} hung up after \"{status_line}\": {source}")]
    Interrupted {
        host: String,
        status_line: String,
        #[source]
        source: io::Error,
    },

    /// A stale connection could not be replaced.
    #[error("reconnect to {host}:{port} failed: {source}")]
    Reconnect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// Response framing the parser cannot recover from.
    #[error("malformed response from {host}: {message}")]
    Protocol { host: String, message: String },

    #[error("no activity from {host} for {timeout:?}")]
    TimedOut { host: String, timeout: Duration },
}

impl RequestError {
    /// HTTP status code, for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for failures of the underlying connection (as opposed to HTTP-level errors).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RequestError::Connect { .. }
                | RequestError::Socket { .. }
                | RequestError::Interrupted { .. }
                | RequestError::Reconnect { .. }
                | RequestError::TimedOut { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_is_reason_verbatim() {
        let e = RequestError::Status {
            code: 401,
            reason: "NoLinkedYouTubeAccount".to_string(),
        };
        assert_eq!(e.to_string(), "NoLinkedYouTubeAccount");
        assert_eq!(e.status(), Some(401));
        assert!(!e.is_transport());
    }

    #[test]
    fn interrupted_names_host_and_status_line() {
        let e = RequestError::Interrupted {
            host: "api.example.com".to_string(),
            status_line: "HTTP/1.1 500 Internal Server Error".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"),
        };
        let s = e.to_string();
        assert!(s.contains("api.example.com"));
        assert!(s.contains("HTTP/1.1 500 Internal Server Error"));
        assert!(s.contains("reset by peer"));
        assert!(e.is_transport());
    }
}
