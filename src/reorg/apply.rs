use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, error, info};

use super::plan::HierarchyPlan;
use crate::config::{
    quote_identifier, DependentTable, CATEGORIES_TABLE, DEFAULT_NODE_DESCRIPTION,
    DEFAULT_PLACEHOLDER_ID, PARENT_COLUMN,
};
use crate::db::finish_tx;
use crate::schema_guard::ensure_parent_column;
use crate::{AppError, AppResult};

const PLACEHOLDER_NAME: &str = "TEMP";
const PLACEHOLDER_DESCRIPTION: &str = "Temporary";

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Id of the temporary category dependents are parked on during the swap.
    /// `None` resolves to an id above every planned and source id.
    pub placeholder_id: Option<i64>,
    pub description: String,
    pub dependents: Vec<DependentTable>,
    /// `CreatedAt` written on every inserted node.
    pub created_at: String,
}

impl ApplyOptions {
    pub fn new(
        placeholder_id: Option<i64>,
        description: impl Into<String>,
        dependents: Vec<DependentTable>,
    ) -> Self {
        Self {
            placeholder_id,
            description: description.into(),
            dependents,
            created_at: Utc::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self::new(
            None,
            DEFAULT_NODE_DESCRIPTION,
            vec![DependentTable::products()],
        )
    }
}

/// The statements of the swap, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyStep {
    Begin,
    EnsureParentColumn,
    InsertPlaceholder,
    DetachDependents,
    DeleteFlatCategories,
    InsertNodes,
    LinkParents,
    RemapDependents,
    DeletePlaceholder,
    ForeignKeyCheck,
}

impl ApplyStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyStep::Begin => "begin",
            ApplyStep::EnsureParentColumn => "ensure_parent_column",
            ApplyStep::InsertPlaceholder => "insert_placeholder",
            ApplyStep::DetachDependents => "detach_dependents",
            ApplyStep::DeleteFlatCategories => "delete_flat_categories",
            ApplyStep::InsertNodes => "insert_nodes",
            ApplyStep::LinkParents => "link_parents",
            ApplyStep::RemapDependents => "remap_dependents",
            ApplyStep::DeletePlaceholder => "delete_placeholder",
            ApplyStep::ForeignKeyCheck => "foreign_key_check",
        }
    }

    /// Operator-facing progress line.
    pub fn describe(&self) -> &'static str {
        match self {
            ApplyStep::Begin => "Opening transaction",
            ApplyStep::EnsureParentColumn => "Checking parent column",
            ApplyStep::InsertPlaceholder => "Creating temporary category",
            ApplyStep::DetachDependents => "Moving dependents to temporary category",
            ApplyStep::DeleteFlatCategories => "Deleting existing categories",
            ApplyStep::InsertNodes => "Inserting new category hierarchy",
            ApplyStep::LinkParents => "Linking parent categories",
            ApplyStep::RemapDependents => "Updating dependent categories",
            ApplyStep::DeletePlaceholder => "Deleting temporary category",
            ApplyStep::ForeignKeyCheck => "Verifying foreign keys",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub parent_column_added: bool,
    pub nodes_inserted: u64,
    pub parents_linked: u64,
    pub dependents_remapped: u64,
}

fn step_failed(step: ApplyStep, message: &'static str) -> impl Fn(sqlx::Error) -> AppError {
    move |err| AppError::query(err, message).with_context("step", step.as_str())
}

/// Refuse placeholder ids that could clash with a planned node or a row that
/// still exists when the placeholder is inserted.
pub fn check_placeholder(plan: &HierarchyPlan, placeholder_id: i64) -> AppResult<()> {
    let clashes_node = plan.nodes.values().any(|node| node.id == placeholder_id);
    let clashes_source = plan.sources.iter().any(|source| source.id == placeholder_id);
    if clashes_node || clashes_source {
        return Err(AppError::new(
            AppError::PLACEHOLDER_COLLISION_CODE,
            "Placeholder id collides with an existing or planned category",
        )
        .with_context("placeholder_id", placeholder_id.to_string())
        .with_context("next_free_id", plan.next_id.to_string()));
    }
    Ok(())
}

/// Pick the placeholder id for a run. An explicit id must not collide; the
/// default is [`DEFAULT_PLACEHOLDER_ID`], raised to the plan's next free id
/// when the catalog already reaches that range.
pub fn resolve_placeholder(plan: &HierarchyPlan, requested: Option<i64>) -> AppResult<i64> {
    match requested {
        Some(id) => {
            check_placeholder(plan, id)?;
            Ok(id)
        }
        None => Ok(DEFAULT_PLACEHOLDER_ID.max(plan.next_id)),
    }
}

/// Replace the flat categories with the planned tree and remap dependents,
/// all inside one transaction. Any failure rolls everything back.
pub async fn apply_plan(
    pool: &SqlitePool,
    plan: &HierarchyPlan,
    options: &ApplyOptions,
    mut progress: impl FnMut(ApplyStep),
) -> AppResult<ApplyOutcome> {
    let placeholder_id = resolve_placeholder(plan, options.placeholder_id)?;
    debug!(target: "category_reorg", event = "placeholder_resolved", placeholder_id);

    progress(ApplyStep::Begin);
    let mut tx = pool
        .begin()
        .await
        .map_err(step_failed(ApplyStep::Begin, "Failed to open transaction"))?;
    info!(target: "category_reorg", event = "db_tx_begin");

    let outcome = run_steps(&mut *tx, plan, options, placeholder_id, &mut progress).await;
    if let Err(err) = &outcome {
        error!(
            target: "category_reorg",
            event = "apply_failed",
            code = %err.code(),
            step = err.context().get("step").map(String::as_str).unwrap_or("unknown"),
            error = %err
        );
    }
    finish_tx(tx, outcome).await
}

async fn run_steps(
    conn: &mut SqliteConnection,
    plan: &HierarchyPlan,
    options: &ApplyOptions,
    placeholder_id: i64,
    progress: &mut impl FnMut(ApplyStep),
) -> AppResult<ApplyOutcome> {
    let categories = quote_identifier(CATEGORIES_TABLE);
    let parent_column = quote_identifier(PARENT_COLUMN);
    let mut outcome = ApplyOutcome::default();

    let mut step = ApplyStep::EnsureParentColumn;
    progress(step);
    outcome.parent_column_added = ensure_parent_column(&mut *conn)
        .await
        .map_err(|err| err.with_context("step", step.as_str()))?;

    step = ApplyStep::InsertPlaceholder;
    progress(step);
    sqlx::query(&format!(
        "INSERT INTO {categories} (Id, Name, Description, IsActive, CreatedAt) VALUES (?1, ?2, ?3, 1, ?4)"
    ))
    .bind(placeholder_id)
    .bind(PLACEHOLDER_NAME)
    .bind(PLACEHOLDER_DESCRIPTION)
    .bind(&options.created_at)
    .execute(&mut *conn)
    .await
    .map_err(step_failed(step, "Failed to insert placeholder category"))?;

    step = ApplyStep::DetachDependents;
    progress(step);
    for table in &options.dependents {
        let detached = sqlx::query(&format!(
            "UPDATE {} SET {} = ?1",
            quote_identifier(&table.table),
            quote_identifier(&table.ref_column)
        ))
        .bind(placeholder_id)
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            step_failed(step, "Failed to detach dependents")(err)
                .with_context("table", table.to_string())
        })?;
        debug!(
            target: "category_reorg",
            event = "dependents_detached",
            table = %table,
            rows = detached.rows_affected()
        );
    }

    step = ApplyStep::DeleteFlatCategories;
    progress(step);
    let deleted = sqlx::query(&format!("DELETE FROM {categories} WHERE Id <> ?1"))
        .bind(placeholder_id)
        .execute(&mut *conn)
        .await
        .map_err(step_failed(step, "Failed to delete flat categories"))?;
    info!(
        target: "category_reorg",
        event = "flat_categories_deleted",
        rows = deleted.rows_affected()
    );

    step = ApplyStep::InsertNodes;
    progress(step);
    let insert_sql = format!(
        "INSERT INTO {categories} (Id, Name, Description, IsActive, CreatedAt, {parent_column}) \
         VALUES (?1, ?2, ?3, 1, ?4, NULL)"
    );
    for node in plan.nodes_by_id() {
        sqlx::query(&insert_sql)
            .bind(node.id)
            .bind(&node.name)
            .bind(&options.description)
            .bind(&options.created_at)
            .execute(&mut *conn)
            .await
            .map_err(|err| {
                step_failed(step, "Failed to insert category node")(err)
                    .with_context("node_id", node.id.to_string())
                    .with_context("name", node.name.clone())
            })?;
        debug!(target: "category_reorg", event = "node_inserted", id = node.id, name = %node.name);
        outcome.nodes_inserted += 1;
    }

    step = ApplyStep::LinkParents;
    progress(step);
    let link_sql = format!("UPDATE {categories} SET {parent_column} = ?1 WHERE Id = ?2");
    for node in plan.nodes.values() {
        let Some(parent_id) = node.parent_id else {
            continue;
        };
        sqlx::query(&link_sql)
            .bind(parent_id)
            .bind(node.id)
            .execute(&mut *conn)
            .await
            .map_err(|err| {
                step_failed(step, "Failed to link parent category")(err)
                    .with_context("node_id", node.id.to_string())
                    .with_context("parent_id", parent_id.to_string())
            })?;
        outcome.parents_linked += 1;
    }

    step = ApplyStep::RemapDependents;
    progress(step);
    let remap_sql: HashMap<(&str, &str), String> = options
        .dependents
        .iter()
        .map(|table| {
            (
                (table.table.as_str(), table.ref_column.as_str()),
                format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    quote_identifier(&table.table),
                    quote_identifier(&table.ref_column),
                    quote_identifier(&table.id_column)
                ),
            )
        })
        .collect();
    for assignment in &plan.assignments {
        let target = assignment
            .leaf
            .as_deref()
            .and_then(|leaf| plan.node_id(leaf));
        let Some(target) = target else {
            let mut err = AppError::new(
                AppError::UNRESOLVED_LEAF_CODE,
                "Dependent's leaf category has no node in the new tree",
            )
            .with_context("step", step.as_str())
            .with_context("table", assignment.table.clone())
            .with_context("column", assignment.column.clone())
            .with_context("dependent_id", assignment.id.to_string())
            .with_context(
                "previous_category_id",
                assignment.previous_category_id.to_string(),
            );
            if let Some(leaf) = &assignment.leaf {
                err = err.with_context("leaf", leaf.clone());
            }
            return Err(err);
        };
        let sql = remap_sql
            .get(&(assignment.table.as_str(), assignment.column.as_str()))
            .ok_or_else(|| {
                AppError::invalid_config("Dependent column is not configured")
                    .with_context("step", step.as_str())
                    .with_context("table", assignment.table.clone())
                    .with_context("column", assignment.column.clone())
            })?;
        sqlx::query(sql)
            .bind(target)
            .bind(assignment.id)
            .execute(&mut *conn)
            .await
            .map_err(|err| {
                step_failed(step, "Failed to remap dependent")(err)
                    .with_context("table", assignment.table.clone())
                    .with_context("column", assignment.column.clone())
                    .with_context("dependent_id", assignment.id.to_string())
            })?;
        outcome.dependents_remapped += 1;
    }

    step = ApplyStep::DeletePlaceholder;
    progress(step);
    sqlx::query(&format!("DELETE FROM {categories} WHERE Id = ?1"))
        .bind(placeholder_id)
        .execute(&mut *conn)
        .await
        .map_err(step_failed(step, "Failed to delete placeholder category"))?;

    step = ApplyStep::ForeignKeyCheck;
    progress(step);
    let violations = sqlx::query("PRAGMA foreign_key_check;")
        .fetch_all(&mut *conn)
        .await
        .map_err(step_failed(step, "Failed to run foreign key check"))?;
    if let Some(first) = violations.first() {
        let table: String = first.try_get("table").unwrap_or_default();
        return Err(AppError::new(
            AppError::FOREIGN_KEY_VIOLATION_CODE,
            "Foreign key violations remain after the swap",
        )
        .with_context("step", step.as_str())
        .with_context("violations", violations.len().to_string())
        .with_context("table", table));
    }

    info!(
        target: "category_reorg",
        event = "apply_steps_done",
        nodes_inserted = outcome.nodes_inserted,
        parents_linked = outcome.parents_linked,
        dependents_remapped = outcome.dependents_remapped,
        parent_column_added = outcome.parent_column_added
    );
    Ok(outcome)
}
