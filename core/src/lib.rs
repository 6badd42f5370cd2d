/*
 * lib.rs
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

//! Histofeed core: a small HTTPS request engine for fetching paginated, authenticated feeds.
//!
//! - `net`: transport provider (TCP + rustls), behind the `Connect` trait.
//! - `protocol::http::stash`: keep-alive connection cache keyed by (host, port).
//! - `protocol::http::engine`: writes one HTTP/1.1 request and push-parses the response
//!   into a `ResponseHandler`.
//! - `config`: engine configuration and the XML config file.
//! - `uri`: URL splitting and feed pagination queries.

#[macro_use]
mod log;

pub mod config;
pub mod net;
pub mod protocol;
pub mod uri;

pub use config::{DirtyShutdown, EngineConfig, Verbosity};
pub use protocol::http::{
    ConnectionStash, PooledConnection, Request, RequestEngine, RequestError, ResponseHandler,
};
