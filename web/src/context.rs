//! Per-request context.
//!
//! A [`Context`] is created by the session pipeline for one request and handed
//! to the handler chain by `&mut`. It owns the request parts, the unread body,
//! the database session and a clone of the application state. Nothing is
//! stored on shared objects.

use crate::error::Failure;
use crate::middleware::CorrelationId;
use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, Uri};
use gatehouse_core::{DbSession, RequestError};
use serde_json::Value;
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

/// Everything a handler may touch for one request.
pub struct Context<S, T = ()> {
    parts: Parts,
    body: Option<Body>,
    body_limit: usize,
    pub(crate) session: S,
    state: T,
}

impl<S: DbSession, T> Context<S, T> {
    pub(crate) fn new(parts: Parts, body: Body, body_limit: usize, session: S, state: T) -> Self {
        Self {
            parts,
            body: Some(body),
            body_limit,
            session,
            state,
        }
    }

    /// The request's database session.
    pub fn session(&mut self) -> &mut S {
        &mut self.session
    }

    /// Application state.
    pub const fn state(&self) -> &T {
        &self.state
    }

    /// Request method.
    pub const fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Request URI.
    pub const fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Request headers.
    pub const fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// A header as text. Empty headers count as absent; bytes that are not
    /// UTF-8 are replaced.
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        self.parts
            .headers
            .get(name)
            .filter(|value| !value.is_empty())
            .map(|value| String::from_utf8_lossy(value.as_bytes()))
    }

    /// Peer address, when the server was started with connect info.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
    }

    /// Client address: first `X-Forwarded-For` entry, then `X-Real-IP`, then
    /// the peer address.
    pub fn client_ip(&self) -> Option<IpAddr> {
        client_ip(&self.parts.headers).or_else(|| self.remote_addr().map(|addr| addr.ip()))
    }

    /// Correlation id set by the correlation layer.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        CorrelationId::of(&self.parts.extensions)
    }

    /// Read the whole body, up to the configured limit.
    ///
    /// # Errors
    ///
    /// - [`Failure::Client`] if the transport fails or the limit is exceeded
    /// - [`Failure::Unexpected`] if the body was already read
    pub async fn read_body(&mut self) -> Result<axum::body::Bytes, Failure> {
        let body = self
            .body
            .take()
            .ok_or_else(|| anyhow::anyhow!("Request body read twice"))?;
        to_bytes(body, self.body_limit)
            .await
            .map_err(|e| Failure::client(e.to_string()))
    }

    /// Read and decode a JSON body.
    ///
    /// # Errors
    ///
    /// - `no_body` if the body is empty
    /// - [`Failure::Decode`] if it is not JSON
    /// - anything [`Context::read_body`] returns
    pub async fn read_json(&mut self) -> Result<Value, Failure> {
        let bytes = self.read_body().await?;
        if bytes.is_empty() {
            return Err(RequestError::no_body().into());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Client address from proxy headers.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|list| list.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded.or_else(|| {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}
