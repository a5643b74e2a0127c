//! Database collaborator interface.
//!
//! Account business rules live in stored procedures. This module describes the
//! procedures the service relies on and the session abstraction that binds one
//! pooled connection, inside one transaction, to one request.
//!
//! # Lifecycle
//!
//! ```text
//! Database::begin()  ──►  DbSession (connection + open transaction)
//!                              │  procedure calls ...
//!                              ├─► commit()    on success
//!                              └─► rollback()  on failure
//!                         drop  ──► connection back to the pool
//! ```
//!
//! Dropping a session that was neither committed nor rolled back discards the
//! transaction; the connection is returned to the pool either way.
//!
//! # Dyn Compatibility
//!
//! Session methods return `Pin<Box<dyn Future>>` so a session can be used as a
//! trait object and so handler futures stay `Send`.

use crate::identity::LoginMethod;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Boxed future returned by session operations.
pub type DbFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'a>>;

/// Errors produced by the database collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// A stored procedure raised a domain error.
    ///
    /// The message has the form `"<catalog key> <arg> <arg> ..."`.
    #[error("Raised by procedure: {0}")]
    Raised(String),

    /// No connection became available in time.
    #[error("Timed out waiting for a database connection")]
    PoolTimeout,

    /// The session was already committed or rolled back.
    #[error("Database session already finished")]
    SessionFinished,

    /// Any other database failure (connection loss, SQL error, decode error).
    #[error("Database error: {0}")]
    Backend(String),
}

/// Stored procedures registered on every session.
///
/// The registry is fixed; each entry is prepared once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// Create an object of a kind with JSON attributes, returning its id.
    CreateObject,
    /// Look up an account by login identifier, returning its credentials.
    GetUserByIdentifier,
    /// Open a session for an account, returning a token and its expiry.
    Login,
    /// Revoke one session token.
    Logout,
    /// Check a session token.
    ValidateToken,
    /// Attach a login identity (method, identifier, secret) to an account.
    AddIdentity,
}

impl Procedure {
    /// Every registered procedure.
    pub const ALL: [Self; 6] = [
        Self::CreateObject,
        Self::GetUserByIdentifier,
        Self::Login,
        Self::Logout,
        Self::ValidateToken,
        Self::AddIdentity,
    ];

    /// Procedure name as defined in the database.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateObject => "create_object",
            Self::GetUserByIdentifier => "get_user_by_identifier",
            Self::Login => "login",
            Self::Logout => "logout",
            Self::ValidateToken => "validate_token",
            Self::AddIdentity => "add_identity",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stored credentials for one login identity, with the profile of the account
/// it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    /// Account the identity belongs to.
    pub user_id: Uuid,
    /// How the identifier is interpreted.
    pub method: LoginMethod,
    /// Password hash.
    pub secret: String,
    /// Account display name.
    pub name: String,
    /// Free-form account attributes; an empty object when none were stored.
    pub data: Value,
    /// When the account was created.
    pub created: DateTime<Utc>,
    /// When the account was last changed.
    pub last_updated: DateTime<Utc>,
}

/// A freshly issued session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    /// Opaque bearer token.
    pub token: String,
    /// Expiry instant.
    pub expires: DateTime<Utc>,
}

/// A source of per-request sessions (a connection pool).
///
/// Implementations are cheap to clone and shared by every request task.
pub trait Database: Clone + Send + Sync + 'static {
    /// Session type bound to one connection.
    type Session: DbSession;

    /// Acquire a connection and open a transaction on it.
    ///
    /// # Errors
    ///
    /// - [`DbError::PoolTimeout`] if no connection frees up in time
    /// - [`DbError::Backend`] if the connection or `BEGIN` fails
    fn begin(&self) -> impl Future<Output = Result<Self::Session, DbError>> + Send;
}

/// One request's database session.
///
/// Exclusively owns a pooled connection with an open transaction. Never shared
/// across requests or tasks.
pub trait DbSession: Send + 'static {
    /// `create_object(kind, attributes) -> id`
    fn create_object<'a>(&'a mut self, kind: &'a str, attributes: &'a Value) -> DbFuture<'a, Uuid>;

    /// `get_user_by_identifier(identifier) -> credentials?`
    fn get_user_by_identifier<'a>(
        &'a mut self,
        identifier: &'a str,
    ) -> DbFuture<'a, Option<Credentials>>;

    /// `login(user) -> (token, expiry)`
    fn login(&mut self, user_id: Uuid) -> DbFuture<'_, SessionToken>;

    /// `logout(user, token)`
    fn logout<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, ()>;

    /// `validate_token(user, token) -> valid`
    fn validate_token<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, bool>;

    /// `add_identity(user, method, identifier, secret)`
    fn add_identity<'a>(
        &'a mut self,
        user_id: Uuid,
        method: LoginMethod,
        identifier: &'a str,
        secret: &'a str,
    ) -> DbFuture<'a, ()>;

    /// Commit the transaction. Further calls fail with
    /// [`DbError::SessionFinished`].
    fn commit(&mut self) -> DbFuture<'_, ()>;

    /// Roll the transaction back. Further calls fail with
    /// [`DbError::SessionFinished`].
    fn rollback(&mut self) -> DbFuture<'_, ()>;
}
