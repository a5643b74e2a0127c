//! `PostgreSQL` sessions for Gatehouse.
//!
//! This crate implements the [`Database`] and [`DbSession`] traits from
//! `gatehouse-core` with sqlx:
//!
//! - Connection pooling with a bounded acquire timeout
//! - Every stored-procedure statement prepared once per connection
//! - One transaction per session, rolled back on drop
//! - Procedure `RAISE EXCEPTION` messages surfaced as [`DbError::Raised`]
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_core::{Database, DbSession};
//! use gatehouse_postgres::{PgDatabase, PoolConfig};
//!
//! # async fn example() -> Result<(), gatehouse_core::DbError> {
//! let db = PgDatabase::connect(&PoolConfig::new("postgres://localhost/accounts")).await?;
//!
//! let mut session = db.begin().await?;
//! let found = session.get_user_by_identifier("a@b.com").await?;
//! session.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Database`]: gatehouse_core::Database
//! [`DbSession`]: gatehouse_core::DbSession
//! [`DbError::Raised`]: gatehouse_core::DbError::Raised

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
pub mod pool;
pub mod session;
pub mod statements;

pub use error::map_sqlx_error;
pub use pool::{PgDatabase, PoolConfig};
pub use session::PgSession;
