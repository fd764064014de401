use thiserror::Error;

/// Core error taxonomy for VolunteerHub.
///
/// Each variant maps to an HTTP status code via [`Error::status_code`]; the
/// transport layer is expected to do that mapping itself, the core only ever
/// returns the typed error. No operation partially succeeds and reports
/// success: a transaction aborts on any internal error and the caller sees
/// exactly one variant.
#[derive(Error, Debug)]
pub enum Error {
    // --- 400 Bad Request ---
    #[error("{0}")]
    BadRequest(String),

    // --- 401 Unauthorized ---
    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    // --- 403 Forbidden ---
    #[error("{0}")]
    Forbidden(String),

    // --- 404 Not Found ---
    #[error("{0}")]
    NotFound(String),

    // --- 409 Conflict ---
    #[error("{0}")]
    Conflict(String),

    // --- 500 Internal Server Error ---
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthorized(_) | Self::InvalidCredentials => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Database(_) | Self::Serialization(_) | Self::PasswordHash(_)
            | Self::Internal(_) => 500,
        }
    }

    // --- Constructors ---

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether retrying the whole transaction may succeed.
    ///
    /// Write conflicts and connection drops are transient; everything else
    /// (constraint violations, plain query failures, domain errors) is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(DatabaseError::Transaction(_) | DatabaseError::Connection(_))
        )
    }
}

/// Storage-level failures, kept separate so adapters can classify them
/// uniformly before they surface as [`Error::Database`].
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    DatabaseError::Constraint(db_err.to_string())
                } else if db_err.code().as_deref() == Some("40001") {
                    // Postgres serialization_failure: safe to retry.
                    DatabaseError::Transaction(db_err.to_string())
                } else {
                    DatabaseError::Query(db_err.to_string())
                }
            }
            sqlx::Error::PoolClosed => DatabaseError::Connection("Pool closed".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::Connection("Pool timed out".to_string()),
            _ => DatabaseError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "sqlx-postgres")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Database(DatabaseError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
