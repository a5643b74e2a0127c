//! Per-request database session pipeline.
//!
//! # Flow
//!
//! ```text
//! request ──► Database::begin ──► handler chain ──► Ok  ──► commit ──► shape
//!                  │                                 │         │
//!                  │                                 │         └─ failure ─┐
//!                  │                                 └ Err ──► rollback ───┤
//!                  └──────────── failure ──────────────────────────────────┴─► translate
//! ```
//!
//! The session is owned by the request's [`Context`] and dropped when the
//! request finishes, so its connection goes back to the pool exactly once on
//! every path, including when the request future itself is dropped.

use crate::context::Context;
use crate::error::Failure;
use crate::handler::Handler;
use crate::reply;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use gatehouse_core::{Database, DbSession};
use std::sync::Arc;

/// Default request body limit (64 KiB).
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

/// Shared per-route plumbing: the database and the application state every
/// request context is built from.
#[derive(Debug, Clone)]
pub struct Pipeline<D, T = ()> {
    db: D,
    state: T,
    body_limit: usize,
}

impl<D: Database> Pipeline<D, ()> {
    /// A pipeline without application state.
    #[must_use]
    pub const fn new(db: D) -> Self {
        Self::with_state(db, ())
    }
}

impl<D: Database, T: Clone + Send + Sync + 'static> Pipeline<D, T> {
    /// A pipeline whose contexts carry a clone of `state`.
    #[must_use]
    pub const fn with_state(db: D, state: T) -> Self {
        Self {
            db,
            state,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// Set the request body limit in bytes.
    #[must_use]
    pub const fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// The database.
    pub const fn database(&self) -> &D {
        &self.db
    }

    /// Run one request through `handler` inside its own transaction.
    pub async fn dispatch<H>(&self, handler: &H, request: Request) -> Response
    where
        H: Handler<D::Session, T, ()>,
    {
        let session = match self.db.begin().await {
            Ok(session) => session,
            Err(e) => return Failure::from(e).into_response(),
        };
        metrics::counter!("gatehouse.sessions.opened").increment(1);

        let (parts, body) = request.into_parts();
        let mut ctx = Context::new(parts, body, self.body_limit, session, self.state.clone());

        let outcome = match handler.call(&mut ctx, ()).await {
            Ok(reply) => match ctx.session.commit().await {
                Ok(()) => {
                    metrics::counter!("gatehouse.sessions.committed").increment(1);
                    Ok(reply)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Commit failed");
                    Err(Failure::from(e))
                }
            },
            Err(failure) => {
                if let Err(e) = ctx.session.rollback().await {
                    tracing::warn!(error = %e, "Rollback failed");
                }
                metrics::counter!("gatehouse.sessions.rolled_back").increment(1);
                Err(failure)
            }
        };

        // Returns the connection before the response is written.
        drop(ctx);

        match outcome {
            Ok(reply) => reply::shape(reply),
            Err(failure) => failure.into_response(),
        }
    }

    /// Turn `handler` into an axum handler.
    ///
    /// ```ignore
    /// let pipeline = Pipeline::new(db);
    /// let app = Router::new()
    ///     .route("/users/logout", delete(pipeline.serve(with_auth(logout))));
    /// ```
    pub fn serve<H>(
        &self,
        handler: H,
    ) -> impl Fn(Request) -> BoxFuture<'static, Response> + Clone + Send + Sync + 'static
    where
        H: Handler<D::Session, T, ()>,
    {
        let pipeline = self.clone();
        let handler = Arc::new(handler);
        move |request: Request| -> BoxFuture<'static, Response> {
            let pipeline = pipeline.clone();
            let handler = Arc::clone(&handler);
            Box::pin(async move { pipeline.dispatch(handler.as_ref(), request).await })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use crate::handler::HandlerFuture;
    use crate::reply::Reply;
    use axum::body::{Body, to_bytes};
    use axum::http::StatusCode;
    use gatehouse_core::{DbError, Procedure, RequestError};
    use gatehouse_testing::{InMemoryDatabase, InMemorySession};
    use serde_json::{Value, json};

    fn create(ctx: &mut Context<InMemorySession>, (): ()) -> HandlerFuture<'_> {
        Box::pin(async move {
            let id = ctx.session().create_object("user", &json!({})).await?;
            Ok(Reply::json(&json!({"id": id})))
        })
    }

    fn create_then_fail(ctx: &mut Context<InMemorySession>, (): ()) -> HandlerFuture<'_> {
        Box::pin(async move {
            ctx.session().create_object("user", &json!({})).await?;
            Err(RequestError::user_not_found().into())
        })
    }

    async fn run<H: Handler<InMemorySession, (), ()>>(
        db: &InMemoryDatabase,
        handler: H,
    ) -> (StatusCode, Value) {
        let response = Pipeline::new(db.clone())
            .dispatch(&handler, Request::new(Body::empty()))
            .await;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn success_commits() {
        let db = InMemoryDatabase::new();
        let (status, _) = run(&db, create).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(db.object_count(), 1);
        assert_eq!(db.committed(), 1);
        assert_eq!(db.available(), db.capacity());
    }

    #[tokio::test]
    async fn failure_rolls_back() {
        let db = InMemoryDatabase::new();
        let (status, body) = run(&db, create_then_fail).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["name"], "user_not_found");
        assert_eq!(db.object_count(), 0);
        assert_eq!(db.rolled_back(), 1);
        assert_eq!(db.available(), db.capacity());
    }

    #[tokio::test]
    async fn unexpected_database_failure_is_server_exception() {
        let db = InMemoryDatabase::new();
        db.fail_next(Procedure::CreateObject, DbError::Backend("disk full".into()));
        let (status, body) = run(&db, create).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["name"], "server_exception");
        assert_eq!(db.available(), db.capacity());
    }

    #[tokio::test]
    async fn raised_error_is_translated() {
        let db = InMemoryDatabase::new();
        db.fail_next(
            Procedure::CreateObject,
            DbError::Raised("identity_exists a@b.com".into()),
        );
        let (status, body) = run(&db, create).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["desc"], "Identity a@b.com is already registered");
    }

    #[tokio::test]
    async fn session_open_failure_is_translated() {
        let db = InMemoryDatabase::with_connections(0)
            .with_acquire_timeout(std::time::Duration::from_millis(10));
        let (status, body) = run(&db, create).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["name"], "server_exception");
        assert_eq!(db.opened(), 0);
    }
}
