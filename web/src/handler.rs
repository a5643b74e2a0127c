//! Handler composition.
//!
//! A [`Handler`] receives the request [`Context`] and the values injected by
//! the adapters wrapped around it. Adapters are plain values built at route
//! registration time:
//!
//! ```text
//! with_auth(with_body(specs, handler))
//!     │          │
//!     │          └─ reads the body, validates it, appends the fields
//!     └─ checks User-ID / Authorization, injects the Identity
//! ```
//!
//! | Composition | Handler receives |
//! |---|---|
//! | `handler` | `()` |
//! | `with_body(specs, handler)` | `fields` |
//! | `with_auth(handler)` | `Identity` |
//! | `with_auth(with_body(specs, handler))` | `(Identity, fields)` |
//!
//! Plain functions are handlers when their signature is
//! `fn(&mut Context<S, T>, Args) -> HandlerFuture<'_>`.

use crate::context::Context;
use crate::error::Failure;
use crate::reply::Reply;
use gatehouse_core::validation::{self, FieldSet};
use gatehouse_core::{DbSession, Identity};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by handlers.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, Failure>> + Send + 'a>>;

/// A request handler over sessions `S` and application state `T`, receiving
/// injected arguments `A`.
pub trait Handler<S, T, A>: Send + Sync + 'static {
    /// Handle one request.
    fn call<'a>(&'a self, ctx: &'a mut Context<S, T>, args: A) -> HandlerFuture<'a>;
}

impl<S, T, A, F> Handler<S, T, A> for F
where
    F: for<'a> Fn(&'a mut Context<S, T>, A) -> HandlerFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context<S, T>, args: A) -> HandlerFuture<'a> {
        self(ctx, args)
    }
}

/// Arguments that can take one more injected value.
pub trait Append<V> {
    /// Arguments after appending.
    type Output;

    /// Append `value`.
    fn append(self, value: V) -> Self::Output;
}

impl<V> Append<V> for () {
    type Output = V;

    fn append(self, value: V) -> V {
        value
    }
}

impl<V> Append<V> for Identity {
    type Output = (Self, V);

    fn append(self, value: V) -> (Self, V) {
        (self, value)
    }
}

/// Adapter that validates the JSON body before calling the inner handler.
#[derive(Debug, Clone)]
pub struct WithBody<F, H> {
    specs: F,
    inner: H,
}

/// Read the body as JSON, validate it against `specs` and pass the typed
/// fields to `inner`.
///
/// Failures, in order: transport (`client_error`), empty body (`no_body`),
/// undecodable body (`invalid_json`), then the first missing or invalid field.
/// A body that is valid JSON but not an object is reported as an internal
/// failure.
pub const fn with_body<F, H>(specs: F, inner: H) -> WithBody<F, H> {
    WithBody { specs, inner }
}

impl<S, T, A, F, H> Handler<S, T, A> for WithBody<F, H>
where
    S: DbSession,
    T: Send + Sync + 'static,
    A: Append<F::Output> + Send + 'static,
    F: FieldSet + 'static,
    H: Handler<S, T, A::Output>,
{
    fn call<'a>(&'a self, ctx: &'a mut Context<S, T>, args: A) -> HandlerFuture<'a> {
        Box::pin(async move {
            let body = ctx.read_json().await?;
            let fields = validation::parse(&body, &self.specs)?;
            self.inner.call(ctx, args.append(fields)).await
        })
    }
}
