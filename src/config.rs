use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

pub const DEFAULT_DELIMITER: &str = ">>";
pub const DEFAULT_PLACEHOLDER_ID: i64 = 999_999;
pub const DEFAULT_NODE_DESCRIPTION: &str = "Auto-generated from hierarchy";
pub const DB_PATH_ENV: &str = "CATEGORY_REORG_DB";
pub const LOG_FILTER_ENV: &str = "CATEGORY_REORG_LOG";
pub const DEFAULT_LOG_FILTER: &str = "category_reorg=info,sqlx=warn";

pub const CATEGORIES_TABLE: &str = "Categories";
pub const PARENT_COLUMN: &str = "ParentCategoryId";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles")
});

/// How nodes are deduplicated while the tree is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum NodeIdentity {
    /// One node per distinct segment value across every path.
    #[default]
    Segment,
    /// One node per distinct path prefix, so equal names under different
    /// parents stay separate.
    Path,
}

/// A table whose rows reference `Categories.Id` and must be remapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentTable {
    pub table: String,
    pub id_column: String,
    pub ref_column: String,
}

impl DependentTable {
    pub fn new(table: &str, ref_column: &str) -> AppResult<Self> {
        Ok(Self {
            table: validate_identifier(table)?,
            id_column: "Id".to_string(),
            ref_column: validate_identifier(ref_column)?,
        })
    }

    pub fn products() -> Self {
        Self {
            table: "Products".to_string(),
            id_column: "Id".to_string(),
            ref_column: "CategoryId".to_string(),
        }
    }
}

impl FromStr for DependentTable {
    type Err = AppError;

    /// Parses `Table.Column`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (table, column) = value.trim().split_once('.').ok_or_else(|| {
            AppError::invalid_config("Dependent tables are written as TABLE.COLUMN")
                .with_context("value", value.to_string())
        })?;
        DependentTable::new(table, column)
    }
}

impl fmt::Display for DependentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.ref_column)
    }
}

/// Everything a run needs besides the store itself.
#[derive(Debug, Clone)]
pub struct ReorgConfig {
    pub db_path: PathBuf,
    pub delimiter: String,
    /// Explicit placeholder id; `None` picks one above every planned id.
    pub placeholder_id: Option<i64>,
    pub identity: NodeIdentity,
    pub dependents: Vec<DependentTable>,
    pub description: String,
    pub dry_run: bool,
    pub json: bool,
    pub report_dir: Option<PathBuf>,
}

impl ReorgConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.delimiter.trim().is_empty() {
            return Err(AppError::invalid_config(
                "Delimiter must contain at least one non-whitespace character",
            ));
        }
        if let Some(id) = self.placeholder_id.filter(|id| *id <= 0) {
            return Err(AppError::invalid_config("Placeholder id must be positive")
                .with_context("placeholder_id", id.to_string()));
        }
        if self.dependents.is_empty() {
            return Err(AppError::invalid_config(
                "At least one dependent table is required",
            ));
        }
        for (idx, dependent) in self.dependents.iter().enumerate() {
            let repeated = self.dependents[..idx].iter().any(|earlier| {
                earlier.table.eq_ignore_ascii_case(&dependent.table)
                    && earlier.ref_column.eq_ignore_ascii_case(&dependent.ref_column)
            });
            if repeated {
                return Err(AppError::invalid_config("Dependent column listed twice")
                    .with_context("dependent", dependent.to_string()));
            }
        }
        Ok(())
    }
}

/// Validates a SQL identifier and returns it owned. Identifiers are spliced
/// into statements, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
pub fn validate_identifier(value: &str) -> AppResult<String> {
    if IDENTIFIER.is_match(value) {
        Ok(value.to_string())
    } else {
        Err(AppError::invalid_config("Invalid SQL identifier")
            .with_context("identifier", value.to_string()))
    }
}

pub fn quote_identifier(value: &str) -> String {
    format!("\"{value}\"")
}

pub fn default_db_path() -> AppResult<PathBuf> {
    if let Ok(value) = std::env::var(DB_PATH_ENV) {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }
    let base = match dirs::data_dir() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    Ok(base.join("category-reorg").join("catalog.sqlite3"))
}
