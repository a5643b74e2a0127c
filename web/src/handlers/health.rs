//! Liveness and readiness checks.

use axum::Json;
use axum::http::StatusCode;
use gatehouse_core::{Database, DbSession};
use serde::Serialize;

/// `GET /health`: the process is up.
///
/// Never touches the database, so it keeps answering while the pool is
/// exhausted.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    /// `"ready"` or `"unavailable"`.
    pub status: &'static str,
    /// Reason the database check failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `GET /health/ready`: a session can be opened and rolled back.
///
/// Answers 503 when the pool cannot hand out a connection.
pub async fn readiness<D: Database>(db: &D) -> (StatusCode, Json<Readiness>) {
    let checked = async {
        let mut session = db.begin().await?;
        session.rollback().await
    };
    match checked.await {
        Ok(()) => (
            StatusCode::OK,
            Json(Readiness {
                status: "ready",
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(Readiness {
                    status: "unavailable",
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_testing::InMemoryDatabase;
    use std::time::Duration;

    #[tokio::test]
    async fn liveness_is_ok() {
        assert_eq!(health_check().await, (StatusCode::OK, "ok"));
    }

    #[tokio::test]
    async fn ready_when_a_connection_is_free() {
        let db = InMemoryDatabase::new();
        let (status, Json(report)) = readiness(&db).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, "ready");
        assert_eq!(db.available(), db.capacity());
        assert_eq!(db.object_count(), 0);
    }

    #[tokio::test]
    async fn unavailable_when_the_pool_is_exhausted() {
        let db = InMemoryDatabase::with_connections(0).with_acquire_timeout(Duration::from_millis(10));
        let (status, Json(report)) = readiness(&db).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, "unavailable");
        assert!(report.error.is_some());
    }
}
