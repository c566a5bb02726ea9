//! Classification of driver failures into [`ErrorCategory`].

use crate::error::{Error, ErrorCategory};
use sqlx::error::{DatabaseError, ErrorKind};
use sqlx::mysql::MySqlDatabaseError;
use std::borrow::Cow;

/// Vendor error codes for each category.
///
/// MySQL entries are server error numbers, SQLite entries are extended
/// result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCodes {
    pub vendor: &'static str,
    pub duplicate_key: &'static [&'static str],
    pub bad_grammar: &'static [&'static str],
    pub connectivity: &'static [&'static str],
}

impl ErrorCodes {
    pub const MYSQL: ErrorCodes = ErrorCodes {
        vendor: "MySQL",
        duplicate_key: &["1062", "1586"],
        bad_grammar: &["1054", "1064", "1146"],
        connectivity: &["1040", "1053", "1080", "1081", "2002", "2003", "2006", "2013"],
    };

    // SQLite reports extended result codes; syntax and missing-schema errors
    // both surface as plain SQLITE_ERROR.
    pub const SQLITE: ErrorCodes = ErrorCodes {
        vendor: "SQLite",
        duplicate_key: &["1555", "2067"],
        bad_grammar: &["1"],
        connectivity: &[],
    };

    /// No vendor codes; classification relies on the driver's [`ErrorKind`].
    pub const NONE: ErrorCodes = ErrorCodes {
        vendor: "unknown",
        duplicate_key: &[],
        bad_grammar: &[],
        connectivity: &[],
    };

    /// Picks the code table from a database URL scheme.
    pub fn for_url(url: &str) -> &'static ErrorCodes {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => &Self::MYSQL,
            "sqlite" => &Self::SQLITE,
            _ => &Self::NONE,
        }
    }

    fn classify(&self, code: &str) -> Option<ErrorCategory> {
        let listed = |codes: &[&str]| codes.iter().any(|c| *c == code);
        if listed(self.duplicate_key) {
            Some(ErrorCategory::DuplicateKey)
        } else if listed(self.bad_grammar) {
            Some(ErrorCategory::SyntaxOrSchema)
        } else if listed(self.connectivity) {
            Some(ErrorCategory::ConnectivityFailure)
        } else {
            None
        }
    }
}

/// Translates raw `sqlx` failures into categorized [`Error`]s.
///
/// Translation happens once, at the repository boundary. Code above that
/// boundary only ever sees the category.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionTranslator {
    codes: &'static ErrorCodes,
}

impl Default for ExceptionTranslator {
    fn default() -> Self {
        Self::new(&ErrorCodes::NONE)
    }
}

impl ExceptionTranslator {
    pub fn new(codes: &'static ErrorCodes) -> Self {
        Self { codes }
    }

    pub fn for_url(url: &str) -> Self {
        Self::new(ErrorCodes::for_url(url))
    }

    pub fn codes(&self) -> &'static ErrorCodes {
        self.codes
    }

    /// Classifies a driver error without consuming it.
    pub fn categorize(&self, err: &sqlx::Error) -> ErrorCategory {
        match err {
            sqlx::Error::Database(db) => {
                if let Some(category) =
                    vendor_code(&**db).and_then(|code| self.codes.classify(&code))
                {
                    return category;
                }
                match db.kind() {
                    ErrorKind::UniqueViolation => ErrorCategory::DuplicateKey,
                    _ => ErrorCategory::Generic,
                }
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ErrorCategory::ConnectivityFailure,
            _ => ErrorCategory::Generic,
        }
    }

    /// Classifies and wraps `err`, logging the failed task and its SQL.
    pub fn translate(&self, task: &str, sql: &str, err: sqlx::Error) -> Error {
        let category = self.categorize(&err);
        tracing::error!(task, sql, ?category, vendor = self.codes.vendor, "db error: {}", err);
        Error::from_category(category, err)
    }
}

/// The code the vendor tables are keyed on.
///
/// MySQL reports the SQLSTATE through `code()`; the MySQL table holds server
/// error numbers instead.
fn vendor_code<'a>(db: &'a (dyn DatabaseError + 'static)) -> Option<Cow<'a, str>> {
    match db.try_downcast_ref::<MySqlDatabaseError>() {
        Some(mysql) => Some(Cow::Owned(mysql.number().to_string())),
        None => db.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{message}")]
    struct VendorError {
        code: &'static str,
        kind: fn() -> ErrorKind,
        message: String,
    }

    impl sqlx::error::DatabaseError for VendorError {
        fn message(&self) -> &str {
            &self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            (self.kind)()
        }
    }

    fn vendor_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(VendorError {
            code,
            kind: || ErrorKind::Other,
            message: format!("vendor error {code}"),
        }))
    }

    #[test]
    fn mysql_error_numbers_are_classified() {
        let codes = ErrorCodes::MYSQL;
        assert_eq!(codes.classify("1062"), Some(ErrorCategory::DuplicateKey));
        assert_eq!(codes.classify("1146"), Some(ErrorCategory::SyntaxOrSchema));
        assert_eq!(codes.classify("1040"), Some(ErrorCategory::ConnectivityFailure));
        assert_eq!(codes.classify("1213"), None);
    }

    #[test]
    fn sqlstate_is_not_a_mysql_error_number() {
        // 42S02 is what MySQL puts in `code()` for a missing table
        let translator = ExceptionTranslator::new(&ErrorCodes::MYSQL);
        assert_eq!(translator.categorize(&vendor_error("42S02")), ErrorCategory::Generic);
    }

    #[test]
    fn other_drivers_are_keyed_on_their_reported_code() {
        let err = VendorError {
            code: "2067",
            kind: || ErrorKind::Other,
            message: "UNIQUE constraint failed: member.member_id".into(),
        };
        assert_eq!(vendor_code(&err).as_deref(), Some("2067"));
    }

    #[test]
    fn codes_are_vendor_specific() {
        // 1062 means nothing to SQLite
        let translator = ExceptionTranslator::new(&ErrorCodes::SQLITE);
        assert_eq!(translator.categorize(&vendor_error("1062")), ErrorCategory::Generic);
        assert_eq!(translator.categorize(&vendor_error("2067")), ErrorCategory::DuplicateKey);
    }

    #[test]
    fn unique_violation_kind_is_a_fallback() {
        let err = sqlx::Error::Database(Box::new(VendorError {
            code: "23505",
            kind: || ErrorKind::UniqueViolation,
            message: "duplicate key value violates unique constraint".into(),
        }));
        let translator = ExceptionTranslator::default();
        assert_eq!(translator.categorize(&err), ErrorCategory::DuplicateKey);
    }

    #[test]
    fn transport_failures_are_connectivity() {
        let translator = ExceptionTranslator::default();
        let io = sqlx::Error::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(translator.categorize(&io), ErrorCategory::ConnectivityFailure);
        assert_eq!(translator.categorize(&sqlx::Error::PoolClosed), ErrorCategory::ConnectivityFailure);
        assert_eq!(translator.categorize(&sqlx::Error::RowNotFound), ErrorCategory::Generic);
    }

    #[test]
    fn translate_wraps_in_matching_variant() {
        let translator = ExceptionTranslator::new(&ErrorCodes::SQLITE);
        let err = translator.translate("save", "insert into member", vendor_error("1555"));
        assert!(matches!(err, Error::DuplicateKey(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn url_scheme_selects_codes() {
        assert_eq!(ErrorCodes::for_url("mysql://localhost/test").vendor, "MySQL");
        assert_eq!(ErrorCodes::for_url("mariadb://localhost/test").vendor, "MySQL");
        assert_eq!(ErrorCodes::for_url("sqlite::memory:").vendor, "SQLite");
        assert_eq!(ErrorCodes::for_url("postgres://localhost").vendor, "unknown");
    }
}
