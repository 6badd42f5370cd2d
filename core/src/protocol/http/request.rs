/*
 * request.rs
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

//! HTTP request: target, method, path, optional bearer token and body.
//!
//! The body is an owned copy taken when the request is built, so the caller's buffer can go
//! away before the request is sent (or resent after a reconnect).

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::http::error::RequestError;

/// Content type sent with a request body unless overridden.
pub const DEFAULT_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Other(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Other(s) => s,
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound request. Built by chaining: `Request::get(host, 443, path).bearer(token)`.
#[derive(Debug, Clone)]
pub struct Request {
    pub host: String,
    pub port: u16,
    pub method: Method,
    pub path: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            method,
            path: path.into(),
            token: None,
            content_type: None,
            body: None,
        }
    }

    pub fn get(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self::new(Method::Get, host, port, path)
    }

    pub fn post(host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self::new(Method::Post, host, port, path)
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Same as `bearer` but leaves the request unauthenticated for None.
    pub fn bearer_opt(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Take ownership of an already-owned body.
    pub fn body(mut self, data: impl Into<Bytes>) -> Self {
        self.body = Some(data.into());
        self
    }

    /// Copy `data` into request-owned storage. Fails instead of aborting when the copy
    /// cannot be allocated.
    pub fn body_slice(mut self, data: &[u8]) -> Result<Self, RequestError> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(data.len())
            .map_err(|source| RequestError::Allocation {
                len: data.len(),
                source,
            })?;
        copy.extend_from_slice(data);
        self.body = Some(Bytes::from(copy));
        Ok(self)
    }

    /// `Host` header value: the port is only included when it is not a default one.
    fn host_header(&self) -> String {
        if self.port == 443 || self.port == 80 {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Serialize request line, headers and body. Built once per submission so a resend after
    /// reconnecting is byte-for-byte identical.
    pub fn to_wire(&self, keep_alive: bool) -> Bytes {
        let body_len = self.body.as_ref().map(|b| b.len()).unwrap_or(0);
        let mut req = BytesMut::with_capacity(256 + body_len);
        req.put_slice(self.method.as_str().as_bytes());
        req.put_u8(b' ');
        req.put_slice(self.path.as_bytes());
        req.put_slice(b" HTTP/1.1\r\nHost: ");
        req.put_slice(self.host_header().as_bytes());
        req.put_slice(b"\r\nConnection: ");
        req.put_slice(if keep_alive { &b"Keep-Alive"[..] } else { &b"close"[..] });
        req.put_slice(b"\r\n");
        if let Some(token) = &self.token {
            req.put_slice(b"Authorization: Bearer ");
            req.put_slice(token.as_bytes());
            req.put_slice(b"\r\n");
        }
        if let Some(body) = &self.body {
            let content_type = self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
            req.put_slice(b"Content-Type: ");
            req.put_slice(content_type.as_bytes());
            req.put_slice(b"\r\n");
            req.put_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        req.put_slice(b"\r\n");
        if let Some(body) = &self.body {
            req.put_slice(body);
        }
        req.freeze()
    }
}
