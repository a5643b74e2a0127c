//! Axum request pipeline for Gatehouse.
//!
//! Every endpoint runs through the same chain:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Pipeline::dispatch                           │  ← one DB session + transaction
//! │  ┌────────────────────────────────────────┐  │
//! │  │ with_auth      (User-ID, Authorization)│  │  ← injects Identity
//! │  │  ┌──────────────────────────────────┐  │  │
//! │  │  │ with_body (read, decode, validate)│  │  │  ← injects typed fields
//! │  │  │  ┌────────────────────────────┐  │  │  │
//! │  │  │  │ handler → Reply            │  │  │  │
//! │  │  │  └────────────────────────────┘  │  │  │
//! │  │  └──────────────────────────────────┘  │  │
//! │  └────────────────────────────────────────┘  │
//! │ commit / rollback → shape / translate        │  ← single failure boundary
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gatehouse_web::{Pipeline, with_auth, with_body};
//! use axum::{Router, routing::{delete, post}};
//!
//! let pipeline = Pipeline::new(db);
//! let app = Router::new()
//!     .route("/users", post(pipeline.serve(with_body(create_specs(), create_user))))
//!     .route("/users/logout", delete(pipeline.serve(with_auth(logout))));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod error;
pub mod guard;
pub mod handler;
pub mod handlers;
pub mod middleware;
pub mod reply;
pub mod session;

// Re-export key types for convenience
pub use context::Context;
pub use error::{ErrorEnvelope, Failure, translate};
pub use guard::{USER_ID_HEADER, authenticate, with_auth};
pub use handler::{Append, Handler, HandlerFuture, with_body};
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId, correlation_id_layer};
pub use reply::{Reply, shape};
pub use session::Pipeline;
