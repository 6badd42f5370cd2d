/*
 * handler.rs
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

//! HTTP response handler trait and the consumers shipped with the engine.
//!
//! Events: header (×n, wire order) → body_chunk (×n) → done (exactly once).
//!
//! Consumers pick one of:
//! - `BufferingHandler`: collect headers and body in memory.
//! - `PassThrough`: copy body bytes to any `std::io::Write`.
//! - `SinkHandler`: feed body bytes to a `FeedSink` decoder (e.g. the feed transcoder).

use std::io::Write;

use bytes::BytesMut;

use crate::protocol::http::error::RequestError;

/// Handler for HTTP response events (push model). The engine drives this as data arrives.
pub trait ResponseHandler {
    /// Called for each piece of body data, in order. Chunk boundaries carry no meaning; the
    /// final call may be a flush of whatever was still buffered when the exchange ended.
    fn body_chunk(&mut self, data: &[u8]);

    /// Called once per response header line, in wire order. Optional.
    fn header(&mut self, name: &str, value: &str) {
        let _ = (name, value);
    }

    /// Called exactly once when the exchange is over. `None` means success.
    fn done(&mut self, error: Option<RequestError>);
}

impl<H: ResponseHandler + ?Sized> ResponseHandler for &mut H {
    fn body_chunk(&mut self, data: &[u8]) {
        (**self).body_chunk(data);
    }

    fn header(&mut self, name: &str, value: &str) {
        (**self).header(name, value);
    }

    fn done(&mut self, error: Option<RequestError>) {
        (**self).done(error);
    }
}

impl<H: ResponseHandler + ?Sized> ResponseHandler for Box<H> {
    fn body_chunk(&mut self, data: &[u8]) {
        (**self).body_chunk(data);
    }

    fn header(&mut self, name: &str, value: &str) {
        (**self).header(name, value);
    }

    fn done(&mut self, error: Option<RequestError>) {
        (**self).done(error);
    }
}

/// Collects the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferingHandler {
    pub headers: Vec<(String, String)>,
    pub body: BytesMut,
    /// Number of `body_chunk` calls received.
    pub deliveries: usize,
    outcome: Option<Option<RequestError>>,
}

impl BufferingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `done` has been called.
    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// The error passed to `done`, if any.
    pub fn error(&self) -> Option<&RequestError> {
        self.outcome.as_ref().and_then(|o| o.as_ref())
    }

    /// First header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body on success, the error otherwise; None if `done` has not been called yet.
    pub fn into_result(self) -> Option<Result<BytesMut, RequestError>> {
        match self.outcome? {
            None => Some(Ok(self.body)),
            Some(e) => Some(Err(e)),
        }
    }
}

impl ResponseHandler for BufferingHandler {
    fn body_chunk(&mut self, data: &[u8]) {
        self.deliveries += 1;
        self.body.extend_from_slice(data);
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    fn done(&mut self, error: Option<RequestError>) {
        self.outcome = Some(error);
    }
}

/// Copies body bytes straight to a writer. A write failure is remembered and further body
/// bytes are dropped; the request itself still runs to completion.
pub struct PassThrough<W: Write> {
    writer: W,
    written: u64,
    write_error: Option<std::io::Error>,
    outcome: Option<Option<RequestError>>,
}

impl<W: Write> PassThrough<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            write_error: None,
            outcome: None,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write_error(&self) -> Option<&std::io::Error> {
        self.write_error.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    /// Take the error passed to `done`, if any.
    pub fn take_error(&mut self) -> Option<RequestError> {
        self.outcome.as_mut().and_then(|o| o.take())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResponseHandler for PassThrough<W> {
    fn body_chunk(&mut self, data: &[u8]) {
        if self.write_error.is_some() {
            return;
        }
        match self.writer.write_all(data) {
            Ok(()) => self.written += data.len() as u64,
            Err(e) => {
                tracing::warn!(error = %e, "pass-through write failed; dropping rest of body");
                self.write_error = Some(e);
            }
        }
    }

    fn done(&mut self, error: Option<RequestError>) {
        if let Err(e) = self.writer.flush() {
            if self.write_error.is_none() {
                self.write_error = Some(e);
            }
        }
        self.outcome = Some(error);
    }
}

/// Streaming decoder fed with response body bytes (the feed transcoder implements this).
pub trait FeedSink {
    /// Consume a piece of the body. Errors stop further feeding.
    fn consume(&mut self, data: &[u8]) -> std::io::Result<()>;

    /// The body ended successfully; flush any pending output.
    fn finish(&mut self) -> std::io::Result<()>;
}

/// Adapts a `FeedSink` to `ResponseHandler`. `finish` is only called on success.
pub struct SinkHandler<S: FeedSink> {
    sink: S,
    sink_error: Option<std::io::Error>,
    outcome: Option<Option<RequestError>>,
}

impl<S: FeedSink> SinkHandler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            sink_error: None,
            outcome: None,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_error(&self) -> Option<&std::io::Error> {
        self.sink_error.as_ref()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.outcome.as_ref().and_then(|o| o.as_ref())
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<S: FeedSink> ResponseHandler for SinkHandler<S> {
    fn body_chunk(&mut self, data: &[u8]) {
        if self.sink_error.is_some() {
            return;
        }
        if let Err(e) = self.sink.consume(data) {
            tracing::warn!(error = %e, "feed sink rejected body data");
            self.sink_error = Some(e);
        }
    }

    fn done(&mut self, error: Option<RequestError>) {
        if error.is_none() && self.sink_error.is_none() {
            if let Err(e) = self.sink.finish() {
                self.sink_error = Some(e);
            }
        }
        self.outcome = Some(error);
    }
}
