use sqlx::{Row, SqlitePool};
use tracing::info;

use crate::config::{quote_identifier, DependentTable, CATEGORIES_TABLE};
use crate::model::{Dependent, FlatCategory};
use crate::{AppError, AppResult};

/// Everything read from the store before planning.
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshot {
    pub categories: Vec<FlatCategory>,
    pub dependents: Vec<Dependent>,
}

pub async fn load_source(
    pool: &SqlitePool,
    dependent_tables: &[DependentTable],
) -> AppResult<SourceSnapshot> {
    let categories = load_categories(pool).await?;

    let mut dependents = Vec::new();
    for table in dependent_tables {
        dependents.extend(load_dependents(pool, table).await?);
    }

    info!(
        target: "category_reorg",
        event = "source_loaded",
        categories = categories.len(),
        dependents = dependents.len(),
        dependent_tables = dependent_tables.len()
    );

    Ok(SourceSnapshot {
        categories,
        dependents,
    })
}

async fn load_categories(pool: &SqlitePool) -> AppResult<Vec<FlatCategory>> {
    let sql = format!(
        "SELECT Id, Name FROM {} ORDER BY Id",
        quote_identifier(CATEGORIES_TABLE)
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await.map_err(|err| {
        AppError::query(err, "Failed to read categories")
            .with_context("step", "load_categories")
            .with_context("table", CATEGORIES_TABLE)
    })?;

    rows.iter()
        .map(|row| {
            FlatCategory::try_from(row).map_err(|err| {
                AppError::new(AppError::QUERY_CODE, "Failed to decode category row")
                    .with_context("step", "load_categories")
                    .with_cause(err)
            })
        })
        .collect()
}

async fn load_dependents(pool: &SqlitePool, table: &DependentTable) -> AppResult<Vec<Dependent>> {
    let sql = format!(
        "SELECT {id} AS dependent_id, {reference} AS category_ref FROM {table} ORDER BY {id}",
        id = quote_identifier(&table.id_column),
        reference = quote_identifier(&table.ref_column),
        table = quote_identifier(&table.table),
    );
    let query_failed = |err: sqlx::Error| {
        AppError::query(err, "Failed to read dependents")
            .with_context("step", "load_dependents")
            .with_context("table", table.to_string())
    };

    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(query_failed)?;

    let mut dependents = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("dependent_id").map_err(query_failed)?;
        let category_ref: i64 = row.try_get("category_ref").map_err(query_failed)?;
        dependents.push(Dependent::new(
            table.table.clone(),
            table.ref_column.clone(),
            id,
            category_ref,
        ));
    }
    Ok(dependents)
}
