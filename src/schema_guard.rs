use sqlx::{Executor, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{error, info};

use crate::config::{quote_identifier, DependentTable, CATEGORIES_TABLE, PARENT_COLUMN};
use crate::{AppError, AppResult};

const REQUIRED_CATEGORY_COLUMNS: &[&str] = &["Id", "Name", "Description", "IsActive", "CreatedAt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStatus {
    pub has_parent_column: bool,
}

async fn table_columns<'e, E>(executor: E, table: &str) -> AppResult<Vec<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("PRAGMA table_info({});", quote_identifier(table));
    let rows = sqlx::query(&sql).fetch_all(executor).await.map_err(|err| {
        AppError::query(err, "Failed to inspect table").with_context("table", table.to_string())
    })?;
    rows.iter()
        .map(|row| row.try_get::<String, _>("name").map_err(AppError::from))
        .collect()
}

fn require_columns(table: &str, present: &[String], required: &[&str]) -> AppResult<()> {
    if present.is_empty() {
        error!(target: "category_reorg", event = "schema_table_missing", table = %table);
        return Err(AppError::new(AppError::MISSING_TABLE_CODE, "Required table is missing")
            .with_context("table", table.to_string()));
    }
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|column| !present.iter().any(|p| p.eq_ignore_ascii_case(column)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        error!(
            target: "category_reorg",
            event = "schema_columns_missing",
            table = %table,
            missing = %missing.join(", ")
        );
        Err(
            AppError::new(AppError::MISSING_COLUMN_CODE, "Required column(s) missing")
                .with_context("table", table.to_string())
                .with_context("columns", missing.join(", ")),
        )
    }
}

/// Check that the category table and every dependent table have the shape
/// the swap relies on. Read-only.
pub async fn inspect_schema(
    pool: &SqlitePool,
    dependents: &[DependentTable],
) -> AppResult<SchemaStatus> {
    let category_columns = table_columns(pool, CATEGORIES_TABLE).await?;
    require_columns(CATEGORIES_TABLE, &category_columns, REQUIRED_CATEGORY_COLUMNS)?;
    let has_parent_column = category_columns
        .iter()
        .any(|column| column.eq_ignore_ascii_case(PARENT_COLUMN));

    for table in dependents {
        let columns = table_columns(pool, &table.table).await?;
        require_columns(
            &table.table,
            &columns,
            &[table.id_column.as_str(), table.ref_column.as_str()],
        )?;
    }

    info!(
        target: "category_reorg",
        event = "schema_check",
        has_parent_column,
        dependent_tables = dependents.len()
    );
    Ok(SchemaStatus { has_parent_column })
}

/// Add `Categories.ParentCategoryId` when the table predates the hierarchy.
/// Returns whether the column was added.
pub async fn ensure_parent_column(conn: &mut SqliteConnection) -> AppResult<bool> {
    let columns = table_columns(&mut *conn, CATEGORIES_TABLE).await?;
    if columns
        .iter()
        .any(|column| column.eq_ignore_ascii_case(PARENT_COLUMN))
    {
        return Ok(false);
    }

    let sql = format!(
        "ALTER TABLE {table} ADD COLUMN {column} INTEGER NULL REFERENCES {table}(Id)",
        table = quote_identifier(CATEGORIES_TABLE),
        column = quote_identifier(PARENT_COLUMN),
    );
    sqlx::query(&sql).execute(&mut *conn).await.map_err(|err| {
        AppError::query(err, "Failed to add parent column")
            .with_context("table", CATEGORIES_TABLE)
            .with_context("column", PARENT_COLUMN)
    })?;
    info!(
        target: "category_reorg",
        event = "parent_column_added",
        table = CATEGORIES_TABLE
    );
    Ok(true)
}
