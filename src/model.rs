use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use crate::AppError;

/// A pre-migration category whose name may encode a whole path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCategory {
    pub id: i64,
    pub name: String,
}

impl FlatCategory {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl TryFrom<&SqliteRow> for FlatCategory {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("Id").map_err(AppError::from)?,
            name: row.try_get("Name").map_err(AppError::from)?,
        })
    }
}

/// A node of the rebuilt tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

impl CategoryNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A row in some other table that points at a category through `column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependent {
    pub table: String,
    pub column: String,
    pub id: i64,
    pub category_ref: i64,
}

impl Dependent {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        id: i64,
        category_ref: i64,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            id,
            category_ref,
        }
    }
}
