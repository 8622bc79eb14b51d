use std::error::Error;
use std::fmt;

/// Error type for database operations
#[derive(Debug)]
pub enum DbError {
    /// Error from SeaORM
    SeaOrmError(sea_orm::DbErr),
    /// Connection error
    ConnectionError(String),
    /// Query error
    QueryError(String),
    /// A row the pipeline depends on is missing (e.g. the chain row)
    MissingRow(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::SeaOrmError(e) => write!(f, "Database error: {}", e),
            DbError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            DbError::QueryError(msg) => write!(f, "Query error: {}", msg),
            DbError::MissingRow(msg) => write!(f, "Missing row: {}", msg),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DbError::SeaOrmError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for DbError {
    fn from(err: sea_orm::DbErr) -> Self {
        DbError::SeaOrmError(err)
    }
}
