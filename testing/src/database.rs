//! In-memory database for fast, deterministic tests.
//!
//! [`InMemoryDatabase`] implements [`Database`] with the same observable
//! behaviour as the account stored procedures:
//!
//! - `add_identity` raises `identity_exists <identifier>` for a taken identifier
//!   and `user_not_found` for an unknown account
//! - `login` raises `user_not_found` for an unknown account
//! - `logout` raises `invalid_token <token>` for a token the account does not own
//! - `validate_token` is false for unknown, foreign or expired tokens
//!
//! Each session works on a private copy of the data and records its writes;
//! `commit` replays the writes onto the shared state, `rollback` (or dropping
//! the session) discards them. Connections are modelled by a semaphore, so
//! tests can assert that every session gave its connection back.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use gatehouse_core::database::{
    Credentials, Database, DbError, DbFuture, DbSession, Procedure, SessionToken,
};
use gatehouse_core::LoginMethod;
use rand::RngCore;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

/// Default number of simulated connections.
pub const DEFAULT_CONNECTIONS: usize = 4;

#[derive(Clone, Debug)]
struct StoredObject {
    kind: String,
    attributes: Value,
    created: DateTime<Utc>,
}

#[derive(Clone, Debug)]
struct StoredIdentity {
    user_id: Uuid,
    method: LoginMethod,
    secret: String,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    objects: HashMap<Uuid, StoredObject>,
    identities: HashMap<String, StoredIdentity>,
    tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
}

#[derive(Clone, Debug)]
enum Write {
    Object { id: Uuid, object: StoredObject },
    Identity { identifier: String, identity: StoredIdentity },
    Token { token: String, user_id: Uuid, expires: DateTime<Utc> },
    RevokeToken { token: String },
}

impl Tables {
    fn apply(&mut self, write: Write) -> Result<(), DbError> {
        match write {
            Write::Object { id, object } => {
                self.objects.insert(id, object);
            }
            Write::Identity { identifier, identity } => {
                if self.identities.contains_key(&identifier) {
                    return Err(DbError::Raised(format!("identity_exists {identifier}")));
                }
                self.identities.insert(identifier, identity);
            }
            Write::Token { token, user_id, expires } => {
                self.tokens.insert(token, (user_id, expires));
            }
            Write::RevokeToken { token } => {
                self.tokens.remove(&token);
            }
        }
        Ok(())
    }

    /// An identity joined with its account's profile.
    fn credentials(&self, identifier: &str) -> Option<Credentials> {
        let identity = self.identities.get(identifier)?;
        let account = self.objects.get(&identity.user_id)?;
        let data = match account.attributes.get("data") {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(data) => data.clone(),
        };
        Some(Credentials {
            user_id: identity.user_id,
            method: identity.method,
            secret: identity.secret.clone(),
            name: account
                .attributes
                .get("full_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            data,
            created: account.created,
            last_updated: account.created,
        })
    }
}

/// Take a lock, ignoring poisoning left behind by a panicked test.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<Tables>,
    connections: Arc<Semaphore>,
    capacity: usize,
    acquire_timeout: std::time::Duration,
    token_ttl: Duration,
    failures: Mutex<HashMap<Procedure, DbError>>,
    opened: AtomicUsize,
    committed: AtomicUsize,
    rolled_back: AtomicUsize,
}

/// In-memory [`Database`] with transactional sessions.
///
/// # Example
///
/// ```
/// use gatehouse_core::{Database, DbSession};
/// use gatehouse_testing::InMemoryDatabase;
/// use serde_json::json;
///
/// # async fn example() -> Result<(), gatehouse_core::DbError> {
/// let db = InMemoryDatabase::new();
///
/// let mut session = db.begin().await?;
/// session.create_object("user", &json!({"full_name": "A B"})).await?;
/// session.commit().await?;
/// drop(session);
///
/// assert_eq!(db.object_count(), 1);
/// assert_eq!(db.available(), db.capacity());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    /// Create an empty database with [`DEFAULT_CONNECTIONS`] connections.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connections(DEFAULT_CONNECTIONS)
    }

    /// Create an empty database with `capacity` connections.
    #[must_use]
    pub fn with_connections(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables::default()),
                connections: Arc::new(Semaphore::new(capacity)),
                capacity,
                acquire_timeout: std::time::Duration::from_secs(5),
                token_ttl: Duration::hours(24),
                failures: Mutex::new(HashMap::new()),
                opened: AtomicUsize::new(0),
                committed: AtomicUsize::new(0),
                rolled_back: AtomicUsize::new(0),
            }),
        }
    }

    /// Set how long `begin` waits for a free connection.
    ///
    /// Must be called before the database is cloned.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: std::time::Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.acquire_timeout = timeout;
        }
        self
    }

    /// Set the lifetime of tokens issued by `login`. A negative TTL issues
    /// tokens that are already expired.
    ///
    /// Must be called before the database is cloned.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.token_ttl = ttl;
        }
        self
    }

    /// Make the next call of `procedure` (in any session) fail with `error`.
    pub fn fail_next(&self, procedure: Procedure, error: DbError) {
        lock(&self.shared.failures).insert(procedure, error);
    }

    /// Total simulated connections.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Connections currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.shared.connections.available_permits()
    }

    /// Sessions opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Sessions committed so far.
    #[must_use]
    pub fn committed(&self) -> usize {
        self.shared.committed.load(Ordering::SeqCst)
    }

    /// Sessions explicitly rolled back so far.
    #[must_use]
    pub fn rolled_back(&self) -> usize {
        self.shared.rolled_back.load(Ordering::SeqCst)
    }

    /// Committed objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        lock(&self.shared.tables).objects.len()
    }

    /// Committed object attributes.
    #[must_use]
    pub fn object(&self, id: Uuid) -> Option<(String, Value)> {
        lock(&self.shared.tables)
            .objects
            .get(&id)
            .map(|object| (object.kind.clone(), object.attributes.clone()))
    }

    /// Committed identities.
    #[must_use]
    pub fn identity_count(&self) -> usize {
        lock(&self.shared.tables).identities.len()
    }

    /// Committed, unrevoked tokens (expired ones included).
    #[must_use]
    pub fn token_count(&self) -> usize {
        lock(&self.shared.tables).tokens.len()
    }
}

impl Database for InMemoryDatabase {
    type Session = InMemorySession;

    async fn begin(&self) -> Result<InMemorySession, DbError> {
        let permit = tokio::time::timeout(
            self.shared.acquire_timeout,
            Arc::clone(&self.shared.connections).acquire_owned(),
        )
        .await
        .map_err(|_| DbError::PoolTimeout)?
        .map_err(|e| DbError::Backend(e.to_string()))?;

        let working = lock(&self.shared.tables).clone();
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        Ok(InMemorySession {
            shared: Arc::clone(&self.shared),
            working,
            pending: Vec::new(),
            finished: false,
            _connection: permit,
        })
    }
}

/// A session of [`InMemoryDatabase`]; holds one simulated connection.
#[derive(Debug)]
pub struct InMemorySession {
    shared: Arc<Shared>,
    working: Tables,
    pending: Vec<Write>,
    finished: bool,
    _connection: OwnedSemaphorePermit,
}

impl InMemorySession {
    fn guard(&self, procedure: Procedure) -> Result<(), DbError> {
        if self.finished {
            return Err(DbError::SessionFinished);
        }
        match lock(&self.shared.failures).remove(&procedure) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn write(&mut self, write: Write) -> Result<(), DbError> {
        self.working.apply(write.clone())?;
        self.pending.push(write);
        Ok(())
    }

    fn require_user(&self, user_id: Uuid) -> Result<(), DbError> {
        match self.working.objects.get(&user_id) {
            Some(object) if object.kind == "user" => Ok(()),
            _ => Err(DbError::Raised("user_not_found".to_string())),
        }
    }

    fn new_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl DbSession for InMemorySession {
    fn create_object<'a>(&'a mut self, kind: &'a str, attributes: &'a Value) -> DbFuture<'a, Uuid> {
        Box::pin(async move {
            self.guard(Procedure::CreateObject)?;
            let id = Uuid::new_v4();
            self.write(Write::Object {
                id,
                object: StoredObject {
                    kind: kind.to_string(),
                    attributes: attributes.clone(),
                    created: Utc::now(),
                },
            })?;
            Ok(id)
        })
    }

    fn get_user_by_identifier<'a>(
        &'a mut self,
        identifier: &'a str,
    ) -> DbFuture<'a, Option<Credentials>> {
        Box::pin(async move {
            self.guard(Procedure::GetUserByIdentifier)?;
            Ok(self.working.credentials(identifier))
        })
    }

    fn login(&mut self, user_id: Uuid) -> DbFuture<'_, SessionToken> {
        Box::pin(async move {
            self.guard(Procedure::Login)?;
            self.require_user(user_id)?;
            let token = Self::new_token();
            let expires = Utc::now() + self.shared.token_ttl;
            self.write(Write::Token {
                token: token.clone(),
                user_id,
                expires,
            })?;
            Ok(SessionToken { token, expires })
        })
    }

    fn logout<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, ()> {
        Box::pin(async move {
            self.guard(Procedure::Logout)?;
            let owned = matches!(
                self.working.tokens.get(token),
                Some((owner, _)) if *owner == user_id
            );
            if !owned {
                return Err(DbError::Raised(format!("invalid_token {token}")));
            }
            self.write(Write::RevokeToken {
                token: token.to_string(),
            })
        })
    }

    fn validate_token<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, bool> {
        Box::pin(async move {
            self.guard(Procedure::ValidateToken)?;
            Ok(matches!(
                self.working.tokens.get(token),
                Some((owner, expires)) if *owner == user_id && *expires > Utc::now()
            ))
        })
    }

    fn add_identity<'a>(
        &'a mut self,
        user_id: Uuid,
        method: LoginMethod,
        identifier: &'a str,
        secret: &'a str,
    ) -> DbFuture<'a, ()> {
        Box::pin(async move {
            self.guard(Procedure::AddIdentity)?;
            self.require_user(user_id)?;
            self.write(Write::Identity {
                identifier: identifier.to_string(),
                identity: StoredIdentity {
                    user_id,
                    method,
                    secret: secret.to_string(),
                },
            })
        })
    }

    fn commit(&mut self) -> DbFuture<'_, ()> {
        Box::pin(async move {
            if self.finished {
                return Err(DbError::SessionFinished);
            }
            self.finished = true;

            let writes = self.pending.len();
            let mut tables = lock(&self.shared.tables);
            let mut next = tables.clone();
            for write in self.pending.drain(..) {
                next.apply(write)?;
            }
            *tables = next;
            drop(tables);

            self.shared.committed.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(writes, "In-memory session committed");
            Ok(())
        })
    }

    fn rollback(&mut self) -> DbFuture<'_, ()> {
        Box::pin(async move {
            if self.finished {
                return Err(DbError::SessionFinished);
            }
            self.finished = true;
            tracing::debug!(discarded = self.pending.len(), "In-memory session rolled back");
            self.pending.clear();
            self.shared.rolled_back.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde_json::json;

    async fn user(db: &InMemoryDatabase, identifier: &str) -> Uuid {
        let mut session = db.begin().await.unwrap();
        let id = session
            .create_object("user", &json!({"full_name": "A B"}))
            .await
            .unwrap();
        session
            .add_identity(id, LoginMethod::Email, identifier, "hash")
            .await
            .unwrap();
        session.commit().await.unwrap();
        id
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let db = InMemoryDatabase::new();
        let id = user(&db, "a@b.com").await;

        let mut session = db.begin().await.unwrap();
        let credentials = session.get_user_by_identifier("a@b.com").await.unwrap().unwrap();
        assert_eq!(credentials.user_id, id);
        assert_eq!(credentials.secret, "hash");
        assert_eq!(db.committed(), 1);
    }

    #[tokio::test]
    async fn credentials_carry_the_account_profile() {
        let db = InMemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        let id = session
            .create_object("user", &json!({"full_name": "Ada", "data": {"plan": "free"}}))
            .await
            .unwrap();
        session
            .add_identity(id, LoginMethod::Email, "ada@b.com", "hash")
            .await
            .unwrap();
        let bare = session.create_object("user", &json!({"full_name": "Bob"})).await.unwrap();
        session
            .add_identity(bare, LoginMethod::Email, "bob@b.com", "hash")
            .await
            .unwrap();

        let ada = session.get_user_by_identifier("ada@b.com").await.unwrap().unwrap();
        assert_eq!(ada.name, "Ada");
        assert_eq!(ada.data, json!({"plan": "free"}));
        assert_eq!(ada.created, ada.last_updated);

        let bob = session.get_user_by_identifier("bob@b.com").await.unwrap().unwrap();
        assert_eq!(bob.data, json!({}));
    }

    #[tokio::test]
    async fn dropped_session_leaves_no_partial_state() {
        let db = InMemoryDatabase::new();

        let mut session = db.begin().await.unwrap();
        let id = session.create_object("user", &json!({})).await.unwrap();
        session
            .add_identity(id, LoginMethod::Email, "a@b.com", "hash")
            .await
            .unwrap();
        drop(session);

        assert_eq!(db.object_count(), 0);
        assert_eq!(db.identity_count(), 0);
        assert_eq!(db.available(), db.capacity());
    }

    #[tokio::test]
    async fn failure_partway_then_rollback() {
        let db = InMemoryDatabase::new();
        user(&db, "taken@b.com").await;

        let mut session = db.begin().await.unwrap();
        let id = session.create_object("user", &json!({})).await.unwrap();
        let err = session
            .add_identity(id, LoginMethod::Email, "taken@b.com", "hash")
            .await
            .unwrap_err();
        assert_eq!(err, DbError::Raised("identity_exists taken@b.com".into()));
        session.rollback().await.unwrap();

        assert_eq!(db.object_count(), 1);
        assert_eq!(db.rolled_back(), 1);
    }

    #[tokio::test]
    async fn login_validate_logout() {
        let db = InMemoryDatabase::new();
        let id = user(&db, "a@b.com").await;

        let mut session = db.begin().await.unwrap();
        let issued = session.login(id).await.unwrap();
        assert!(issued.expires > Utc::now());
        assert!(session.validate_token(id, &issued.token).await.unwrap());
        assert!(!session.validate_token(Uuid::new_v4(), &issued.token).await.unwrap());

        session.logout(id, &issued.token).await.unwrap();
        assert!(!session.validate_token(id, &issued.token).await.unwrap());

        let err = session.logout(id, &issued.token).await.unwrap_err();
        assert!(matches!(err, DbError::Raised(m) if m.starts_with("invalid_token ")));
    }

    #[tokio::test]
    async fn expired_tokens_are_invalid() {
        let db = InMemoryDatabase::new().with_token_ttl(Duration::seconds(-1));
        let id = user(&db, "a@b.com").await;

        let mut session = db.begin().await.unwrap();
        let issued = session.login(id).await.unwrap();
        assert!(!session.validate_token(id, &issued.token).await.unwrap());
    }

    #[tokio::test]
    async fn login_unknown_user() {
        let db = InMemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        let err = session.login(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err, DbError::Raised("user_not_found".into()));
    }

    #[tokio::test]
    async fn finished_session_rejects_calls() {
        let db = InMemoryDatabase::new();
        let mut session = db.begin().await.unwrap();
        session.commit().await.unwrap();

        assert_eq!(session.commit().await, Err(DbError::SessionFinished));
        assert_eq!(session.rollback().await, Err(DbError::SessionFinished));
        assert_eq!(
            session.get_user_by_identifier("x").await,
            Err(DbError::SessionFinished)
        );
    }

    #[tokio::test]
    async fn pool_exhaustion_times_out() {
        let db = InMemoryDatabase::with_connections(1)
            .with_acquire_timeout(std::time::Duration::from_millis(20));

        let held = db.begin().await.unwrap();
        assert_eq!(db.available(), 0);
        assert!(matches!(db.begin().await, Err(DbError::PoolTimeout)));

        drop(held);
        assert!(db.begin().await.is_ok());
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let db = InMemoryDatabase::new();
        db.fail_next(Procedure::GetUserByIdentifier, DbError::Backend("boom".into()));

        let mut session = db.begin().await.unwrap();
        assert_eq!(
            session.get_user_by_identifier("a@b.com").await,
            Err(DbError::Backend("boom".into()))
        );
        assert_eq!(session.get_user_by_identifier("a@b.com").await, Ok(None));
    }
}
