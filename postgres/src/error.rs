//! sqlx error mapping.

use gatehouse_core::DbError;

/// SQLSTATE of `RAISE EXCEPTION` without an explicit code.
pub(crate) const RAISE_EXCEPTION: &str = "P0001";

/// Convert a sqlx error into a [`DbError`].
///
/// Exceptions raised by a stored procedure keep their message verbatim so the
/// translator can read the catalog key and arguments out of it.
#[must_use]
pub fn map_sqlx_error(error: sqlx::Error) -> DbError {
    match error {
        sqlx::Error::Database(db_error) if db_error.code().as_deref() == Some(RAISE_EXCEPTION) => {
            DbError::Raised(db_error.message().to_string())
        }
        sqlx::Error::PoolTimedOut => DbError::PoolTimeout,
        other => DbError::Backend(other.to_string()),
    }
}
