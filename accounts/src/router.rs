//! HTTP routing for the account service.

use crate::config::Config;
use crate::handlers::{self, Accounts};
use axum::Router;
use axum::http::{Method, Uri};
use axum::routing::{delete, get, post};
use gatehouse_core::Database;
use gatehouse_web::handlers::{health_check, readiness};
use gatehouse_web::{Failure, Pipeline, correlation_id_layer, with_auth, with_body};
use tower_http::trace::TraceLayer;

/// Build the application router over `db`.
///
/// # Routes
///
/// - `POST /users`
/// - `POST /users/login`
/// - `DELETE /users/logout`
/// - `GET /health`
/// - `GET /health/ready`
///
/// Any other path, and any other method on these paths, is answered with a
/// `client_error` envelope.
pub fn build_router<D: Database>(db: D, config: &Config) -> Router {
    let accounts = Accounts {
        bcrypt_cost: config.auth.bcrypt_cost,
    };
    let ready_db = db.clone();
    let pipeline = Pipeline::with_state(db, accounts).with_body_limit(config.server.body_limit);

    Router::new()
        .route(
            "/users",
            post(pipeline.serve(with_body(
                handlers::new_user_fields(),
                handlers::create_user::<D::Session>,
            ))),
        )
        .route(
            "/users/login",
            post(pipeline.serve(with_body(
                handlers::login_fields(),
                handlers::login::<D::Session>,
            ))),
        )
        .route(
            "/users/logout",
            delete(pipeline.serve(with_auth(handlers::logout::<D::Session>))),
        )
        .route("/health", get(health_check))
        .route(
            "/health/ready",
            get(move || {
                let db = ready_db.clone();
                async move { readiness(&db).await }
            }),
        )
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}

#[allow(clippy::unused_async)]
async fn not_found(uri: Uri) -> Failure {
    Failure::client(format!("Requested URL {} not found", uri.path()))
}

#[allow(clippy::unused_async)]
async fn method_not_allowed(method: Method, uri: Uri) -> Failure {
    Failure::client(format!("Method {method} not allowed for {}", uri.path()))
}
