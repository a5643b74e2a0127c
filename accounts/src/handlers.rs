//! Account handlers.
//!
//! Each handler runs inside the request's transaction: every procedure it
//! calls either commits together or not at all.

use gatehouse_core::validation::{FieldSet, casts, optional, required};
use gatehouse_core::{Credentials, DbSession, Identity, LoginMethod, RequestError, short_id};
use gatehouse_web::{Context, Failure, HandlerFuture, Reply};
use serde_json::{Map, Value, json};

/// Application state shared by the account handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accounts {
    /// bcrypt work factor for new passwords.
    pub bcrypt_cost: u32,
}

/// Request context of the account service.
pub type AccountContext<S> = Context<S, Accounts>;

/// Fields of `POST /users`.
pub type NewUser = (String, String, LoginMethod, String, Option<Map<String, Value>>);

/// Body of `POST /users`.
#[must_use]
pub fn new_user_fields() -> impl FieldSet<Output = NewUser> {
    (
        required("identifier", casts::non_empty_string),
        required("password", casts::password),
        required("login_method", casts::login_method),
        required("full_name", casts::non_empty_string),
        optional("data", casts::object),
    )
}

/// Body of `POST /users/login`.
#[must_use]
pub fn login_fields() -> impl FieldSet<Output = (String, String)> {
    (
        required("identifier", casts::non_empty_string),
        required("password", casts::non_empty_string),
    )
}

/// Identifiers are matched case-insensitively.
fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

async fn hash_password(password: String, cost: u32) -> Result<String, Failure> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(hashed)
}

async fn verify_password(password: String, hash: String) -> Result<bool, Failure> {
    let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(valid)
}

/// `POST /users`: create an account with its first login identity.
pub fn create_user<S: DbSession>(
    ctx: &mut AccountContext<S>,
    (identifier, password, method, full_name, data): NewUser,
) -> HandlerFuture<'_> {
    Box::pin(async move {
        let identifier = normalize(&identifier);
        if !method.accepts(&identifier) {
            return Err(RequestError::invalid_value(Value::from(identifier), "identifier").into());
        }

        let secret = hash_password(password, ctx.state().bcrypt_cost).await?;
        let attributes = json!({
            "full_name": full_name,
            "data": data.unwrap_or_default(),
        });

        let session = ctx.session();
        let user_id = session.create_object("user", &attributes).await?;
        session
            .add_identity(user_id, method, &identifier, &secret)
            .await?;

        tracing::info!(user_id = %user_id, method = %method, "User created");
        Ok(Reply::json(&json!({"user_id": short_id::encode(user_id)})))
    })
}

/// `POST /users/login`: exchange an identifier and password for a session
/// token.
///
/// Unknown identifiers and wrong passwords fail the same way.
pub fn login<S: DbSession>(
    ctx: &mut AccountContext<S>,
    (identifier, password): (String, String),
) -> HandlerFuture<'_> {
    Box::pin(async move {
        let identifier = normalize(&identifier);
        let client_ip = ctx.client_ip();
        let Some(credentials) = ctx.session().get_user_by_identifier(&identifier).await? else {
            tracing::debug!(client_ip = ?client_ip, "Unknown identifier");
            return Err(RequestError::user_not_found().into());
        };
        let Credentials {
            user_id,
            method,
            secret,
            name,
            data,
            created,
            last_updated,
        } = credentials;

        if !verify_password(password, secret).await? {
            tracing::warn!(%user_id, client_ip = ?client_ip, "Password rejected");
            return Err(RequestError::user_not_found().into());
        }

        let issued = ctx.session().login(user_id).await?;
        tracing::info!(%user_id, client_ip = ?client_ip, "User logged in");
        Ok(Reply::json(&json!({
            "user_id": short_id::encode(user_id),
            "login_method": method.as_str(),
            "name": name,
            "data": data,
            "created": created.to_rfc3339(),
            "last_updated": last_updated.to_rfc3339(),
            "token": issued.token,
            "expires": issued.expires.to_rfc3339(),
        })))
    })
}

/// `DELETE /users/logout`: revoke the caller's token.
pub fn logout<S: DbSession>(ctx: &mut AccountContext<S>, identity: Identity) -> HandlerFuture<'_> {
    Box::pin(async move {
        ctx.session()
            .logout(identity.user_id, &identity.token)
            .await?;
        tracing::info!(user_id = %identity.user_id, "User logged out");
        Ok(Reply::json(&json!({"logged_out": true})))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use gatehouse_core::validation;

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Ada@Example.COM "), "ada@example.com");
        assert_eq!(normalize("+15551234567"), "+15551234567");
    }

    #[test]
    fn new_user_data_is_optional() {
        let body = json!({
            "identifier": "a@b.com",
            "password": "long enough",
            "login_method": "email",
            "full_name": "Ada",
        });
        let (_, _, method, _, data) = validation::parse(&body, &new_user_fields()).unwrap();
        assert_eq!(method, LoginMethod::Email);
        assert!(data.is_none());
    }

    #[test]
    fn short_password_is_invalid() {
        let body = json!({
            "identifier": "a@b.com",
            "password": "short",
            "login_method": "email",
            "full_name": "Ada",
        });
        let err = validation::parse(&body, &new_user_fields()).unwrap_err();
        assert!(err.to_string().contains("invalid_value"));
    }

    #[tokio::test]
    async fn password_hash_verifies() {
        let hash = hash_password("correct horse".into(), 4).await.unwrap();
        assert!(verify_password("correct horse".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong horse".into(), hash).await.unwrap());
    }
}
