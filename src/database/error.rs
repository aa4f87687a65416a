use thiserror::Error;
use warp::reject::Reject;

use crate::authentication::jwt::AuthError;

use super::schema::RecipeId;

/// Failures raised by a persistence gateway.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique, foreign-key or check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// The backend could not be reached or has no free connection.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => {
                if e.is_unique_violation() || e.is_foreign_key_violation() || e.is_check_violation()
                {
                    Self::Constraint(format!("{e}"))
                } else {
                    Self::Query(format!("{e}"))
                }
            }
            sqlx::Error::Io(e) => Self::Unavailable(format!("{e}")),
            sqlx::Error::Tls(e) => Self::Unavailable(format!("{e}")),
            sqlx::Error::PoolTimedOut => Self::Unavailable(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::Unavailable(format!("Pool closed")),
            sqlx::Error::WorkerCrashed => Self::Unavailable(format!("Worker crashed")),
            sqlx::Error::Configuration(e) => Self::Query(format!("{e}")),
            sqlx::Error::Protocol(e) => Self::Query(format!("{e}")),
            sqlx::Error::RowNotFound => Self::Query(format!("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::Query(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::Query(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::Decode(e) => Self::Query(format!("{e}")),
            e => Self::Query(format!("{e}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::Query(format!("Migration failed: {value}"))
    }
}

/// Outcome of a recipe store operation that did not succeed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("No {entity} exists with id {id}")]
    NotFound { entity: &'static str, id: RecipeId },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl StoreError {
    pub fn validation(field: &str, reason: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn recipe_not_found(id: RecipeId) -> Self {
        Self::NotFound {
            entity: "recipe",
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Reject for StoreError {}

#[cfg(test)]
mod tests {
    use warp::Rejection;

    use super::*;

    #[test]
    fn store_errors_travel_as_rejections() {
        let rejection = Rejection::from(StoreError::recipe_not_found(7));

        let found = rejection.find::<StoreError>();
        assert!(found.is_some_and(StoreError::is_not_found));
    }
}
