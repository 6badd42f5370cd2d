/*
 * stash.rs
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

//! Keep-alive connection stash.
//!
//! Idle transport handles are cached per (host, port). A request leases one with `acquire`
//! and hands it back with `release` (or `reconnect`/`discard` when the socket went bad).
//! Every handle carries a stable id so the cache entry that refers to it can be found again
//! after the handle has been out on lease.
//!
//! The stash is single-threaded: the pool sits in a `RefCell` and is never borrowed across
//! an await.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;

use tracing::warn;

use crate::config::Verbosity;
use crate::net::Connect;

/// Stable identity of one transport handle.
pub type ConnId = u64;

/// Cache key: destination host and port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnStatus {
    Free,
    InUse,
}

/// A transport handle on lease from the stash.
pub struct PooledConnection<S> {
    id: ConnId,
    endpoint: Endpoint,
    stream: S,
    reused: bool,
}

impl<S> PooledConnection<S> {
    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.endpoint.host
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// True when this handle was taken from the cache rather than freshly connected.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S> fmt::Debug for PooledConnection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("reused", &self.reused)
            .finish()
    }
}

struct Entry<S> {
    id: ConnId,
    status: ConnStatus,
    /// Present while FREE; the handle is with the lessee while IN_USE.
    idle: Option<S>,
}

struct Pool<S> {
    entries: HashMap<Endpoint, Vec<Entry<S>>>,
    next_id: ConnId,
}

impl<S> Pool<S> {
    fn allocate_id(&mut self) -> ConnId {
        self.next_id += 1;
        self.next_id
    }

    fn find_mut(&mut self, endpoint: &Endpoint, id: ConnId) -> Option<&mut Entry<S>> {
        self.entries
            .get_mut(endpoint)
            .and_then(|list| list.iter_mut().find(|e| e.id == id))
    }

    fn remove(&mut self, endpoint: &Endpoint, id: ConnId) -> bool {
        let Some(list) = self.entries.get_mut(endpoint) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.entries.remove(endpoint);
        }
        removed
    }
}

/// Cache of transport handles, generic over the transport provider.
pub struct ConnectionStash<C: Connect> {
    connector: C,
    keep_alive: bool,
    verbosity: Verbosity,
    pool: RefCell<Pool<C::Stream>>,
}

impl<C: Connect> ConnectionStash<C> {
    pub fn new(connector: C, keep_alive: bool, verbosity: Verbosity) -> Self {
        Self {
            connector,
            keep_alive,
            verbosity,
            pool: RefCell::new(Pool {
                entries: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Lease a connection to (host, port): a FREE cached one if there is one, else a fresh
    /// connect.
    pub async fn acquire(&self, host: &str, port: u16) -> io::Result<PooledConnection<C::Stream>> {
        if let Some(conn) = self.checkout(host, port) {
            verbose!(self.verbosity, Verbose, "reusing connection {} to {}", conn.id, conn.endpoint);
            return Ok(conn);
        }
        let endpoint = Endpoint::new(host, port);
        verbose!(self.verbosity, Verbose, "connecting to {}", endpoint);
        let stream = self.connector.connect(host, port).await?;
        let id = self.pool.borrow_mut().allocate_id();
        verbose!(self.verbosity, Verbose, "new connection {} to {}", id, endpoint);
        Ok(PooledConnection {
            id,
            endpoint,
            stream,
            reused: false,
        })
    }

    fn checkout(&self, host: &str, port: u16) -> Option<PooledConnection<C::Stream>> {
        let mut pool = self.pool.borrow_mut();
        let endpoint = Endpoint::new(host, port);
        let entry = pool
            .entries
            .get_mut(&endpoint)?
            .iter_mut()
            .find(|e| e.status == ConnStatus::Free && e.idle.is_some())?;
        let stream = entry.idle.take()?;
        entry.status = ConnStatus::InUse;
        Some(PooledConnection {
            id: entry.id,
            endpoint,
            stream,
            reused: true,
        })
    }

    /// Return a leased connection. With keep-alive it is cached as FREE (inserted if the stash
    /// has not seen it before); without, it is closed.
    pub fn release(&self, conn: PooledConnection<C::Stream>) {
        if !self.keep_alive {
            verbose!(self.verbosity, Verbose, "closing connection {} to {}", conn.id, conn.endpoint);
            return;
        }
        let PooledConnection {
            id,
            endpoint,
            stream,
            ..
        } = conn;
        verbose!(self.verbosity, Verbose, "connection {} to {} is free", id, endpoint);
        let mut pool = self.pool.borrow_mut();
        let list = pool.entries.entry(endpoint).or_default();
        match list.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.status = ConnStatus::Free;
                entry.idle = Some(stream);
            }
            None => list.push(Entry {
                id,
                status: ConnStatus::Free,
                idle: Some(stream),
            }),
        }
    }

    /// Replace a failed connection with a fresh one to the same (host, port). The old handle
    /// is closed either way; the cache entry that referred to it now refers to the new handle,
    /// or is removed when the connect fails.
    pub async fn reconnect(
        &self,
        conn: PooledConnection<C::Stream>,
    ) -> io::Result<PooledConnection<C::Stream>> {
        let PooledConnection {
            id: old_id,
            endpoint,
            stream,
            ..
        } = conn;
        drop(stream);
        verbose!(self.verbosity, Normal, "reconnecting to {} (connection {})", endpoint, old_id);
        match self.connector.connect(&endpoint.host, endpoint.port).await {
            Ok(stream) => {
                let mut pool = self.pool.borrow_mut();
                let id = pool.allocate_id();
                if let Some(entry) = pool.find_mut(&endpoint, old_id) {
                    entry.id = id;
                    entry.status = ConnStatus::InUse;
                    entry.idle = None;
                }
                Ok(PooledConnection {
                    id,
                    endpoint,
                    stream,
                    reused: false,
                })
            }
            Err(e) => {
                warn!(error = %e, "reconnect to {} failed", endpoint);
                self.pool.borrow_mut().remove(&endpoint, old_id);
                Err(e)
            }
        }
    }

    /// Close a connection that must not be reused and forget its cache entry.
    pub fn discard(&self, conn: PooledConnection<C::Stream>) {
        verbose!(self.verbosity, Verbose, "discarding connection {} to {}", conn.id, conn.endpoint);
        self.pool.borrow_mut().remove(&conn.endpoint, conn.id);
    }

    /// Close every cached handle and drop all entries.
    pub fn close_all(&self) {
        let mut pool = self.pool.borrow_mut();
        let n: usize = pool.entries.values().map(Vec::len).sum();
        if n > 0 {
            verbose!(self.verbosity, Verbose, "closing {} cached connections", n);
        }
        pool.entries.clear();
    }

    /// Status of the cache entry for this id; None if the stash does not track it.
    pub fn status_of(&self, id: ConnId) -> Option<ConnStatus> {
        self.pool
            .borrow()
            .entries
            .values()
            .flat_map(|list| list.iter())
            .find(|e| e.id == id)
            .map(|e| e.status)
    }

    /// Number of FREE cached handles.
    pub fn idle_count(&self) -> usize {
        self.pool
            .borrow()
            .entries
            .values()
            .flat_map(|list| list.iter())
            .filter(|e| e.status == ConnStatus::Free)
            .count()
    }

    /// Number of cache entries, FREE or IN_USE.
    pub fn tracked_count(&self) -> usize {
        self.pool.borrow().entries.values().map(Vec::len).sum()
    }
}

impl<C: Connect> Drop for ConnectionStash<C> {
    fn drop(&mut self) {
        self.close_all();
    }
}
