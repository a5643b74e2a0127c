//! Per-request session: one pooled connection inside one transaction.

use crate::error::map_sqlx_error;
use crate::statements;
use chrono::{DateTime, Utc};
use gatehouse_core::database::{Credentials, DbError, DbFuture, DbSession, SessionToken};
use gatehouse_core::{LoginMethod, Procedure};
use serde_json::Value;
use sqlx::{PgConnection, Postgres, Transaction};
use uuid::Uuid;

/// Row of `get_user_by_identifier`.
type CredentialsRow = (
    Uuid,
    String,
    String,
    Option<String>,
    Option<Value>,
    DateTime<Utc>,
    DateTime<Utc>,
);

/// `PostgreSQL` implementation of [`DbSession`].
///
/// Dropping a session that was not committed rolls the transaction back and
/// returns the connection to the pool.
#[derive(Debug)]
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }

    fn connection(&mut self) -> Result<&mut PgConnection, DbError> {
        self.tx
            .as_deref_mut()
            .ok_or(DbError::SessionFinished)
    }
}

/// Record a procedure failure before handing it back.
fn observe(procedure: Procedure) -> impl FnOnce(sqlx::Error) -> DbError {
    move |e| {
        let error = map_sqlx_error(e);
        match &error {
            DbError::Raised(message) => {
                tracing::debug!(procedure = %procedure, message = %message, "Procedure raised");
                metrics::counter!("gatehouse.procedures.raised", "procedure" => procedure.name())
                    .increment(1);
            }
            other => {
                tracing::warn!(procedure = %procedure, error = %other, "Procedure call failed");
            }
        }
        error
    }
}

impl DbSession for PgSession {
    fn create_object<'a>(&'a mut self, kind: &'a str, attributes: &'a Value) -> DbFuture<'a, Uuid> {
        Box::pin(async move {
            let procedure = Procedure::CreateObject;
            sqlx::query_scalar::<_, Uuid>(statements::sql(procedure))
                .bind(kind)
                .bind(attributes)
                .fetch_one(self.connection()?)
                .await
                .map_err(observe(procedure))
        })
    }

    fn get_user_by_identifier<'a>(
        &'a mut self,
        identifier: &'a str,
    ) -> DbFuture<'a, Option<Credentials>> {
        Box::pin(async move {
            let procedure = Procedure::GetUserByIdentifier;
            let row = sqlx::query_as::<_, CredentialsRow>(statements::sql(procedure))
                .bind(identifier)
                .fetch_optional(self.connection()?)
                .await
                .map_err(observe(procedure))?;

            row.map(|(user_id, method, secret, name, data, created, last_updated)| {
                let method = method.parse::<LoginMethod>().map_err(|e| {
                    DbError::Backend(format!("{procedure} returned {e}"))
                })?;
                Ok(Credentials {
                    user_id,
                    method,
                    secret,
                    name: name.unwrap_or_default(),
                    data: data
                        .filter(|data| !data.is_null())
                        .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                    created,
                    last_updated,
                })
            })
            .transpose()
        })
    }

    fn login(&mut self, user_id: Uuid) -> DbFuture<'_, SessionToken> {
        Box::pin(async move {
            let procedure = Procedure::Login;
            let (token, expires) =
                sqlx::query_as::<_, (String, DateTime<Utc>)>(statements::sql(procedure))
                    .bind(user_id)
                    .fetch_one(self.connection()?)
                    .await
                    .map_err(observe(procedure))?;
            Ok(SessionToken { token, expires })
        })
    }

    fn logout<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, ()> {
        Box::pin(async move {
            let procedure = Procedure::Logout;
            sqlx::query(statements::sql(procedure))
                .bind(user_id)
                .bind(token)
                .execute(self.connection()?)
                .await
                .map_err(observe(procedure))?;
            Ok(())
        })
    }

    fn validate_token<'a>(&'a mut self, user_id: Uuid, token: &'a str) -> DbFuture<'a, bool> {
        Box::pin(async move {
            let procedure = Procedure::ValidateToken;
            sqlx::query_scalar::<_, bool>(statements::sql(procedure))
                .bind(user_id)
                .bind(token)
                .fetch_one(self.connection()?)
                .await
                .map_err(observe(procedure))
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
            let procedure = Procedure::AddIdentity;
            sqlx::query(statements::sql(procedure))
                .bind(user_id)
                .bind(method.as_str())
                .bind(identifier)
                .bind(secret)
                .execute(self.connection()?)
                .await
                .map_err(observe(procedure))?;
            Ok(())
        })
    }

    fn commit(&mut self) -> DbFuture<'_, ()> {
        Box::pin(async move {
            let tx = self.tx.take().ok_or(DbError::SessionFinished)?;
            tx.commit().await.map_err(map_sqlx_error)
        })
    }

    fn rollback(&mut self) -> DbFuture<'_, ()> {
        Box::pin(async move {
            let tx = self.tx.take().ok_or(DbError::SessionFinished)?;
            tx.rollback().await.map_err(map_sqlx_error)
        })
    }
}
