/*
 * mod.rs
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

//! HTTP/1.1 over pooled keep-alive connections.
//!
//! - `request`: `Request` builder and wire serialization.
//! - `h1`: incremental line reader and response push parser.
//! - `handler`: `ResponseHandler` callbacks and the provided consumers.
//! - `stash`: keep-alive connection cache.
//! - `engine`: drives one exchange per `submit`.

mod error;
mod handler;
mod request;

pub mod engine;
pub mod h1;
pub mod stash;

pub use engine::RequestEngine;
pub use error::RequestError;
pub use handler::{BufferingHandler, FeedSink, PassThrough, ResponseHandler, SinkHandler};
pub use request::{Method, Request, DEFAULT_CONTENT_TYPE};
pub use stash::{ConnId, ConnStatus, ConnectionStash, Endpoint, PooledConnection};
