//! Bearer-token authentication guard.

use crate::context::Context;
use crate::error::Failure;
use crate::handler::{Handler, HandlerFuture};
use axum::http::header::AUTHORIZATION;
use gatehouse_core::{DbSession, Identity, RequestError, short_id};

/// Header carrying the caller's short user id.
pub const USER_ID_HEADER: &str = "User-ID";

/// Authentication scheme prefix accepted on `Authorization`, matched
/// case-insensitively.
const BEARER: &str = "Bearer ";

/// The token carried by an `Authorization` value.
///
/// A leading `Bearer ` is dropped only when a token follows it; any other value
/// is the token itself.
fn bearer_token(raw: &str) -> &str {
    match (raw.get(..BEARER.len()), raw.get(BEARER.len()..)) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case(BEARER) && !token.is_empty() => {
            token
        }
        _ => raw,
    }
}

/// Verify the caller of the current request.
///
/// # Errors
///
/// In order:
/// 1. `missing_header("User-ID")`
/// 2. `missing_header("Authorization")`
/// 3. `invalid_user_id(raw)` if `User-ID` is not a short id
/// 4. `invalid_token(token)` if the session does not accept the token
/// 5. any database failure of `validate_token`
pub async fn authenticate<S: DbSession, T>(ctx: &mut Context<S, T>) -> Result<Identity, Failure> {
    let raw_id = ctx
        .header(USER_ID_HEADER)
        .ok_or_else(|| RequestError::missing_header(USER_ID_HEADER))?
        .into_owned();
    let raw_token = ctx
        .header(AUTHORIZATION.as_str())
        .ok_or_else(|| RequestError::missing_header("Authorization"))?
        .into_owned();

    let user_id =
        short_id::decode(&raw_id).map_err(|_| RequestError::invalid_user_id(&raw_id))?;
    let token = bearer_token(&raw_token).to_owned();

    if !ctx.session().validate_token(user_id, &token).await? {
        return Err(RequestError::invalid_token(&token).into());
    }

    tracing::debug!(user_id = %user_id, "Caller authenticated");
    Ok(Identity { user_id, token })
}

/// Adapter that authenticates the caller before calling the inner handler.
#[derive(Debug, Clone)]
pub struct WithAuth<H> {
    inner: H,
}

/// Require a valid `User-ID` / `Authorization` pair and pass the resulting
/// [`Identity`] to `inner`.
pub const fn with_auth<H>(inner: H) -> WithAuth<H> {
    WithAuth { inner }
}

impl<S, T, H> Handler<S, T, ()> for WithAuth<H>
where
    S: DbSession,
    T: Send + Sync + 'static,
    H: Handler<S, T, Identity>,
{
    fn call<'a>(&'a self, ctx: &'a mut Context<S, T>, (): ()) -> HandlerFuture<'a> {
        Box::pin(async move {
            let identity = authenticate(ctx).await?;
            self.inner.call(ctx, identity).await
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use gatehouse_core::Database;
    use gatehouse_testing::{InMemoryDatabase, InMemorySession, helpers};

    async fn context(
        db: &InMemoryDatabase,
        headers: &[(&str, &str)],
    ) -> Context<InMemorySession> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, body) = builder.body(Body::empty()).unwrap().into_parts();
        Context::new(parts, body, 1024, db.begin().await.unwrap(), ())
    }

    fn error_key(result: Result<Identity, Failure>) -> (String, Vec<serde_json::Value>) {
        match result {
            Err(Failure::Request(e)) => {
                let (key, args) = e.into_parts();
                (key, args)
            }
            other => panic!("expected a request error, got {other:?}"),
        }
    }

    #[test]
    fn bearer_scheme_is_optional_and_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc"), "abc");
        assert_eq!(bearer_token("bearer abc"), "abc");
        assert_eq!(bearer_token("BEARER abc"), "abc");
        assert_eq!(bearer_token("abc"), "abc");
        assert_eq!(bearer_token("Bearer "), "Bearer ");
        assert_eq!(bearer_token("Bearerabc"), "Bearerabc");
        assert_eq!(bearer_token("Beärer"), "Beärer");
    }

    #[tokio::test]
    async fn user_id_is_checked_first() {
        let db = InMemoryDatabase::new();
        let mut ctx = context(&db, &[]).await;
        let (key, args) = error_key(authenticate(&mut ctx).await);
        assert_eq!(key, "missing_header");
        assert_eq!(args, vec![serde_json::json!("User-ID")]);
    }

    #[tokio::test]
    async fn missing_authorization() {
        let db = InMemoryDatabase::new();
        let id = short_id::encode(uuid::Uuid::new_v4());
        let mut ctx = context(&db, &[("User-ID", id.as_str())]).await;
        let (key, args) = error_key(authenticate(&mut ctx).await);
        assert_eq!(key, "missing_header");
        assert_eq!(args, vec![serde_json::json!("Authorization")]);
    }

    #[tokio::test]
    async fn malformed_user_id() {
        let db = InMemoryDatabase::new();
        let mut ctx = context(&db, &[("User-ID", "abc"), ("Authorization", "t")]).await;
        let (key, args) = error_key(authenticate(&mut ctx).await);
        assert_eq!(key, "invalid_user_id");
        assert_eq!(args, vec![serde_json::json!("abc")]);
    }

    #[tokio::test]
    async fn unknown_token() {
        let db = InMemoryDatabase::new();
        let id = short_id::encode(uuid::Uuid::new_v4());
        let mut ctx = context(&db, &[("User-ID", id.as_str()), ("Authorization", "nope")]).await;
        let (key, args) = error_key(authenticate(&mut ctx).await);
        assert_eq!(key, "invalid_token");
        assert_eq!(args, vec![serde_json::json!("nope")]);
    }

    #[tokio::test]
    async fn valid_token_with_and_without_scheme() {
        let db = InMemoryDatabase::new();
        let account = helpers::seed_account(&db, "a@b.com", "h").await.unwrap();
        let issued = helpers::issue_token(&db, account).await.unwrap();
        let id = short_id::encode(account);

        let mut ctx = context(&db, &[("User-ID", id.as_str()), ("Authorization", issued.token.as_str())]).await;
        let identity = authenticate(&mut ctx).await.unwrap();
        assert_eq!(identity.user_id, account);
        assert_eq!(identity.token, issued.token);

        let bearer = format!("Bearer {}", issued.token);
        let mut ctx = context(&db, &[("User-ID", id.as_str()), ("Authorization", bearer.as_str())]).await;
        assert_eq!(authenticate(&mut ctx).await.unwrap().token, issued.token);
    }
}
