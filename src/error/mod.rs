use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use anyhow::Error as AnyhowError;
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use std::io::Error as IoError;

/// A structured error carrying a machine readable code, an operator-facing
/// message, key/value context and an optional nested cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppError {
    /// Machine readable error code.
    pub code: String,
    /// Human friendly message that can be shown directly to the operator.
    pub message: String,
    /// Arbitrary key/value pairs that provide additional context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    /// Optional nested cause that preserves the error chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<AppError>>,
}

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Coarse classification of an [`AppError`], derived from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StoreUnavailable,
    QueryError,
    UnresolvedLeaf,
    MalformedCategoryName,
    PlaceholderCollision,
    SchemaMismatch,
    InvalidConfig,
    Other,
}

impl AppError {
    /// Default code used when an upstream error does not expose a specific code.
    pub const UNKNOWN_CODE: &'static str = "APP/UNKNOWN";

    pub const STORE_UNAVAILABLE_CODE: &'static str = "STORE/UNAVAILABLE";
    pub const QUERY_CODE: &'static str = "STORE/QUERY";
    pub const FOREIGN_KEY_VIOLATION_CODE: &'static str = "STORE/FOREIGN_KEY_VIOLATION";
    pub const UNRESOLVED_LEAF_CODE: &'static str = "REORG/UNRESOLVED_LEAF";
    pub const MALFORMED_NAME_CODE: &'static str = "REORG/MALFORMED_NAME";
    pub const PLACEHOLDER_COLLISION_CODE: &'static str = "REORG/PLACEHOLDER_COLLISION";
    pub const MISSING_TABLE_CODE: &'static str = "SCHEMA/MISSING_TABLE";
    pub const MISSING_COLUMN_CODE: &'static str = "SCHEMA/MISSING_COLUMN";
    pub const INVALID_CONFIG_CODE: &'static str = "CONFIG/INVALID";

    /// Construct a new application error with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            cause: None,
        }
    }

    /// Wrap a failed statement as a query error, keeping the driver error as cause.
    pub fn query(error: SqlxError, message: impl Into<String>) -> Self {
        AppError::new(Self::QUERY_CODE, message).with_cause(error)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        AppError::new(Self::INVALID_CONFIG_CODE, message)
    }

    /// Returns the error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the contextual metadata associated with the error.
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Returns the nested cause if one is present.
    pub fn cause(&self) -> Option<&AppError> {
        self.cause.as_deref()
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code.as_str() {
            Self::STORE_UNAVAILABLE_CODE => ErrorKind::StoreUnavailable,
            Self::QUERY_CODE | Self::FOREIGN_KEY_VIOLATION_CODE => ErrorKind::QueryError,
            Self::UNRESOLVED_LEAF_CODE => ErrorKind::UnresolvedLeaf,
            Self::MALFORMED_NAME_CODE => ErrorKind::MalformedCategoryName,
            Self::PLACEHOLDER_COLLISION_CODE => ErrorKind::PlaceholderCollision,
            Self::MISSING_TABLE_CODE | Self::MISSING_COLUMN_CODE => ErrorKind::SchemaMismatch,
            Self::INVALID_CONFIG_CODE => ErrorKind::InvalidConfig,
            code if code.starts_with("SQLX/") || code.starts_with("Sqlite/") => {
                ErrorKind::QueryError
            }
            _ => ErrorKind::Other,
        }
    }

    /// Adds a contextual key/value pair to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the nested cause for the error.
    pub fn with_cause(mut self, cause: impl Into<AppError>) -> Self {
        self.cause = Some(Box::new(cause.into()));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {} ({:?})", self.code, self.message, self.context)
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl From<AnyhowError> for AppError {
    fn from(error: AnyhowError) -> Self {
        fn convert(err: &(dyn StdError + 'static)) -> AppError {
            if let Some(app) = err.downcast_ref::<AppError>() {
                return app.clone();
            }

            let mut root = AppError::new(AppError::UNKNOWN_CODE, err.to_string());
            if let Some(source) = err.source() {
                root.cause = Some(Box::new(convert(source)));
            }
            root
        }

        convert(error.as_ref())
    }
}

impl From<IoError> for AppError {
    fn from(error: IoError) -> Self {
        let code = format!("IO/{:?}", error.kind());
        let mut app_error = AppError::new(code, error.to_string());
        if let Some(os_code) = error.raw_os_error() {
            app_error = app_error.with_context("os_code", os_code.to_string());
        }
        app_error
    }
}

impl From<SqlxError> for AppError {
    fn from(error: SqlxError) -> Self {
        match error {
            SqlxError::RowNotFound => AppError::new("SQLX/ROW_NOT_FOUND", "Record not found"),
            SqlxError::ColumnNotFound(name) => {
                AppError::new("SQLX/COLUMN_NOT_FOUND", format!("Column not found: {name}"))
            }
            SqlxError::PoolTimedOut => AppError::new(
                "SQLX/POOL_TIMEOUT",
                "Timed out acquiring a database connection",
            ),
            SqlxError::PoolClosed => AppError::new("SQLX/POOL_CLOSED", "Database pool is closed"),
            SqlxError::Io(err) => AppError::from(err).with_context("source", "sqlx"),
            SqlxError::Database(db) => {
                let code = db
                    .code()
                    .map(|code| format!("Sqlite/{code}"))
                    .unwrap_or_else(|| "SQLX/DATABASE".to_string());
                let mut app_error = AppError::new(code, db.message().to_string());
                if let Some(constraint) = db.constraint() {
                    app_error = app_error.with_context("constraint", constraint.to_string());
                }
                app_error
            }
            SqlxError::ColumnDecode { index, source } => {
                AppError::new("SQLX/COLUMN_DECODE", source.to_string())
                    .with_context("column_index", index.to_string())
            }
            SqlxError::Decode(decode_err) => AppError::new("SQLX/DECODE", decode_err.to_string()),
            other => AppError::new("SQLX/ERROR", other.to_string()),
        }
    }
}
