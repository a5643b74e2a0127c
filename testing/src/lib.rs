//! # Gatehouse Testing
//!
//! Testing utilities for the Gatehouse request pipeline.
//!
//! This crate provides:
//! - [`InMemoryDatabase`]: a transactional, pool-bounded in-memory [`Database`]
//! - [`helpers`]: seeding helpers for accounts and sessions
//! - [`init_test_tracing`]: log capture for tests
//!
//! ## Example
//!
//! ```
//! use gatehouse_testing::{InMemoryDatabase, helpers};
//!
//! # async fn example() -> Result<(), gatehouse_core::DbError> {
//! let db = InMemoryDatabase::new();
//! let account = helpers::seed_account(&db, "a@b.com", "secret-hash").await?;
//! let token = helpers::issue_token(&db, account).await?;
//!
//! assert_eq!(db.identity_count(), 1);
//! assert!(!token.token.is_empty());
//! # Ok(())
//! # }
//! ```
//!
//! [`Database`]: gatehouse_core::Database

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod database;

pub use database::{InMemoryDatabase, InMemorySession};

/// Install a test subscriber writing to the test harness output.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatehouse=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Seeding helpers.
///
/// Each helper runs in its own committed session, so the seeded rows are
/// visible to every session opened afterwards.
pub mod helpers {
    use gatehouse_core::database::{Database, DbError, DbSession, SessionToken};
    use gatehouse_core::LoginMethod;
    use serde_json::json;
    use uuid::Uuid;

    /// Create a user with one email identity whose secret is stored as given.
    ///
    /// # Errors
    ///
    /// Returns the database error of the first failing call.
    pub async fn seed_account<D: Database>(
        db: &D,
        identifier: &str,
        secret: &str,
    ) -> Result<Uuid, DbError> {
        let mut session = db.begin().await?;
        let user_id = session
            .create_object("user", &json!({"full_name": "Test User", "data": {}}))
            .await?;
        session
            .add_identity(user_id, LoginMethod::Email, identifier, secret)
            .await?;
        session.commit().await?;
        Ok(user_id)
    }

    /// Issue a session token for an existing account.
    ///
    /// # Errors
    ///
    /// Returns the database error of the first failing call.
    pub async fn issue_token<D: Database>(db: &D, user_id: Uuid) -> Result<SessionToken, DbError> {
        let mut session = db.begin().await?;
        let token = session.login(user_id).await?;
        session.commit().await?;
        Ok(token)
    }
}
