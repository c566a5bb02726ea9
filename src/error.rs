use crate::registry::ExecutionUnitId;
use crate::translator::ExceptionTranslator;

/// Category a data-access failure is classified into.
///
/// Calling code branches on this instead of on vendor error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    DuplicateKey,
    SyntaxOrSchema,
    ConnectivityFailure,
    Generic,
}

/// Error types for transaction coordination and member data access
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No row matches the requested key
    #[error("member not found: member_id={member_id}")]
    NotFound { member_id: String },

    /// Uniqueness constraint violated; the caller may retry with another key
    #[error("Duplicate key: {0}")]
    DuplicateKey(#[source] sqlx::Error),

    /// Bad SQL grammar or a statement that does not match the schema
    #[error("Bad SQL grammar: {0}")]
    SyntaxOrSchema(#[source] sqlx::Error),

    /// The database could not be reached or the connection was lost
    #[error("Connectivity failure: {0}")]
    Connectivity(#[source] sqlx::Error),

    /// Any other database error from SQLx
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// Raised by business logic running inside a transaction
    #[error("Business rule violated: {0}")]
    BusinessRule(String),

    /// A transaction is already bound to this execution unit
    #[error("A transaction is already bound to execution unit {0}")]
    AlreadyBound(ExecutionUnitId),

    /// A binding was requested outside of any execution unit
    #[error("No execution unit is active on this task")]
    NoExecutionUnit,

    /// Transaction has already been consumed (committed or rolled back)
    #[error("Transaction has already been consumed")]
    AlreadyConsumed,

    /// Invalid data source configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Wraps a driver error in the variant matching `category`.
    pub fn from_category(category: ErrorCategory, source: sqlx::Error) -> Self {
        match category {
            ErrorCategory::DuplicateKey => Error::DuplicateKey(source),
            ErrorCategory::SyntaxOrSchema => Error::SyntaxOrSchema(source),
            ErrorCategory::ConnectivityFailure => Error::Connectivity(source),
            ErrorCategory::Generic => Error::Database(source),
        }
    }

    /// Data-access category of this error, `None` for non data-access errors.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Error::DuplicateKey(_) => Some(ErrorCategory::DuplicateKey),
            Error::SyntaxOrSchema(_) => Some(ErrorCategory::SyntaxOrSchema),
            Error::Connectivity(_) => Some(ErrorCategory::ConnectivityFailure),
            Error::Database(_) => Some(ErrorCategory::Generic),
            _ => None,
        }
    }

    /// Only duplicate keys are worth a retry (with a regenerated key).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::DuplicateKey(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        let category = ExceptionTranslator::default().categorize(&err);
        Error::from_category(category, err)
    }
}

/// Result type alias for transaction and repository operations
pub type Result<T> = std::result::Result<T, Error>;
