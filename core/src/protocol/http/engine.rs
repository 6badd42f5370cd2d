/*
 * engine.rs
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

//! Request engine: one HTTP/1.1 exchange per `submit` on a connection leased from the stash.
//!
//! The request is serialized once, written, and then only read: bytes go into a receive
//! buffer that the `ResponseParser` drains into the handler. A transport failure before any
//! response byte means the pooled connection had gone stale; the engine swaps it via
//! `ConnectionStash::reconnect` and resends the same bytes without telling the handler.

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::warn;

use crate::config::{DirtyShutdown, EngineConfig};
use crate::net::{Connect, Connector};
use crate::protocol::http::error::RequestError;
use crate::protocol::http::h1::{FramingError, Phase, ResponseParser};
use crate::protocol::http::handler::{BufferingHandler, ResponseHandler};
use crate::protocol::http::request::{Method, Request};
use crate::protocol::http::stash::{ConnectionStash, PooledConnection};

const READ_CHUNK: usize = 8192;

/// How one attempt on one connection ended.
enum Exchange {
    /// Parser reached DONE.
    Complete,
    /// Peer closed the stream cleanly.
    Eof,
    Failed(io::Error),
    TimedOut(Duration),
    Framing(FramingError),
}

/// Await `fut`, giving up after `limit` when there is one.
async fn timed<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

/// Submits requests through a keep-alive `ConnectionStash`.
pub struct RequestEngine<C: Connect> {
    stash: ConnectionStash<C>,
    config: EngineConfig,
}

impl RequestEngine<Connector> {
    /// Engine over real sockets, TLS unless the config says otherwise.
    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(Connector::from_config(&config), config)
    }
}

impl<C: Connect> RequestEngine<C> {
    pub fn new(connector: C, config: EngineConfig) -> Self {
        let stash = ConnectionStash::new(connector, config.keep_alive, config.verbosity);
        Self { stash, config }
    }

    pub fn stash(&self) -> &ConnectionStash<C> {
        &self.stash
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Close all cached connections.
    pub fn close(&self) {
        self.stash.close_all();
    }

    /// Run one request to completion. `handler.done` is called exactly once, whatever happens.
    pub async fn submit<H: ResponseHandler + ?Sized>(&self, request: &Request, handler: &mut H) {
        let verbosity = self.config.verbosity;
        verbose!(verbosity, Normal, "{} {}{}", request.method, request.host, request.path);
        let mut conn = match self.stash.acquire(&request.host, request.port).await {
            Ok(conn) => conn,
            Err(source) => {
                warn!(error = %source, "connection to {}:{} failed", request.host, request.port);
                handler.done(Some(RequestError::Connect {
                    host: request.host.clone(),
                    port: request.port,
                    source,
                }));
                return;
            }
        };

        let wire = request.to_wire(self.stash.keep_alive());
        let mut parser = ResponseParser::new(verbosity);
        if request.method == Method::Head {
            parser.expect_no_body();
        }
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut restarts = 0;

        let outcome = loop {
            let outcome = self
                .exchange(&mut conn, &wire, &mut parser, &mut buf, handler)
                .await;
            let stale = match &outcome {
                Exchange::Failed(_) => parser.phase() == Phase::None,
                // A cached connection the peer has since closed reads as EOF.
                Exchange::Eof => parser.phase() == Phase::None && conn.is_reused(),
                _ => false,
            };
            if !stale || restarts >= self.config.max_restarts {
                break outcome;
            }
            restarts += 1;
            if let Exchange::Failed(e) = &outcome {
                verbose!(verbosity, Normal, "connection to {} failed before response ({}), restarting", request.host, e);
            } else {
                verbose!(verbosity, Normal, "connection to {} closed before response, restarting", request.host);
            }
            conn = match self.stash.reconnect(conn).await {
                Ok(conn) => conn,
                Err(source) => {
                    handler.done(Some(RequestError::Reconnect {
                        host: request.host.clone(),
                        port: request.port,
                        source,
                    }));
                    return;
                }
            };
            parser.reset();
            buf.clear();
        };

        let reusable = matches!(outcome, Exchange::Complete);
        let transport_error = match outcome {
            Exchange::Complete => None,
            Exchange::Eof => {
                verbose!(verbosity, Verbose, "{} closed the connection", request.host);
                None
            }
            Exchange::Failed(source) => self.classify_failure(request, &parser, source),
            Exchange::TimedOut(timeout) => {
                warn!("no response activity from {} for {:?}", request.host, timeout);
                Some(RequestError::TimedOut {
                    host: request.host.clone(),
                    timeout,
                })
            }
            Exchange::Framing(e) => {
                warn!("malformed response from {}: {}", request.host, e);
                Some(RequestError::Protocol {
                    host: request.host.clone(),
                    message: e.0,
                })
            }
        };
        parser.finish();

        if !buf.is_empty() {
            verbose!(verbosity, Verbose, "flushing {} residual bytes", buf.len());
            handler.body_chunk(&buf);
            buf.clear();
        }

        let error = transport_error.or_else(|| {
            parser.reason().map(|reason| RequestError::Status {
                code: parser.status(),
                reason: reason.to_string(),
            })
        });
        if let Some(e) = &error {
            verbose!(verbosity, Verbose, "request to {} failed: {}", request.host, e);
        }
        handler.done(error);

        if reusable {
            self.stash.release(conn);
        } else {
            self.stash.discard(conn);
        }
    }

    /// Submit and collect the whole body in memory.
    pub async fn fetch(&self, request: &Request) -> Result<BytesMut, RequestError> {
        let mut handler = BufferingHandler::new();
        self.submit(request, &mut handler).await;
        handler.into_result().unwrap_or_else(|| {
            Err(RequestError::Protocol {
                host: request.host.clone(),
                message: "exchange ended without completion".to_string(),
            })
        })
    }

    /// Write the request, then read and parse until the response is complete or the
    /// connection gives out.
    async fn exchange<H: ResponseHandler + ?Sized>(
        &self,
        conn: &mut PooledConnection<C::Stream>,
        wire: &Bytes,
        parser: &mut ResponseParser,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Exchange {
        let limit = self.config.io_timeout;
        let expired = || Exchange::TimedOut(limit.unwrap_or_default());
        verbose!(self.config.verbosity, Firehose, "writing {} bytes on connection {}", wire.len(), conn.id());
        let stream = conn.stream_mut();
        let sent = timed(limit, async {
            stream.write_all(wire).await?;
            stream.flush().await
        })
        .await;
        match sent {
            Some(Ok(())) => {}
            Some(Err(e)) => return Exchange::Failed(e),
            None => return expired(),
        }

        loop {
            buf.reserve(READ_CHUNK);
            let n = match timed(limit, stream.read_buf(buf)).await {
                Some(Ok(0)) => return Exchange::Eof,
                Some(Ok(n)) => n,
                Some(Err(e)) => return Exchange::Failed(e),
                None => return expired(),
            };
            verbose!(self.config.verbosity, Firehose, "read {} bytes", n);
            if let Err(e) = parser.receive(buf, handler) {
                return Exchange::Framing(e);
            }
            if parser.is_done() {
                return Exchange::Complete;
            }
        }
    }

    /// A transport error after the first response byte: tolerated after a 200 (unless the
    /// policy says otherwise), surfaced with the host and status line when there is one.
    fn classify_failure(
        &self,
        request: &Request,
        parser: &ResponseParser,
        source: io::Error,
    ) -> Option<RequestError> {
        let host = request.host.clone();
        if parser.phase() == Phase::None {
            warn!(error = %source, "socket error talking to {}", host);
            return Some(RequestError::Socket { host, source });
        }
        if parser.status() == 200 && self.config.dirty_shutdown == DirtyShutdown::Tolerate {
            verbose!(self.config.verbosity, Verbose, "ignoring dirty shutdown from {}: {}", host, source);
            return None;
        }
        warn!(error = %source, "{} hung up mid-response", host);
        match parser.status_line() {
            Some(line) => Some(RequestError::Interrupted {
                host,
                status_line: line.to_string(),
                source,
            }),
            None => Some(RequestError::Socket { host, source }),
        }
    }
}
