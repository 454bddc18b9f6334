use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;

use super::apply::ApplyOutcome;
use super::plan::HierarchyPlan;
use crate::config::{quote_identifier, CATEGORIES_TABLE, PARENT_COLUMN};
use crate::{AppError, AppResult};

/// Post-commit counts shown to the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorgSummary {
    pub root_count: i64,
    pub sub_count: i64,
    pub total: i64,
    pub dependents_remapped: u64,
}

pub async fn summarize(pool: &SqlitePool, outcome: &ApplyOutcome) -> AppResult<ReorgSummary> {
    let categories = quote_identifier(CATEGORIES_TABLE);
    let parent = quote_identifier(PARENT_COLUMN);
    let count_failed = |err: sqlx::Error| {
        AppError::query(err, "Failed to count categories").with_context("step", "summary")
    };

    let root_count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {categories} WHERE {parent} IS NULL"
    ))
    .fetch_one(pool)
    .await
    .map_err(count_failed)?;
    let sub_count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {categories} WHERE {parent} IS NOT NULL"
    ))
    .fetch_one(pool)
    .await
    .map_err(count_failed)?;

    Ok(ReorgSummary {
        root_count,
        sub_count,
        total: root_count + sub_count,
        dependents_remapped: outcome.dependents_remapped,
    })
}

pub fn render_summary(summary: &ReorgSummary) -> String {
    format!(
        "=== Summary ===\nRoot categories: {}\nSub-categories: {}\nTotal categories: {}\nDependents remapped: {}\n",
        summary.root_count, summary.sub_count, summary.total, summary.dependents_remapped
    )
}

/// Human-readable dump of a plan, used for dry runs.
pub fn render_plan(plan: &HierarchyPlan) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Parsed {} categories:", plan.sources.len());
    for source in &plan.sources {
        let _ = writeln!(out, "  {}: {} -> {:?}", source.id, source.name, source.segments);
    }

    let _ = writeln!(
        out,
        "\nPlanned {} categories ({} root, {} sub, {} keep their id):",
        plan.nodes.len(),
        plan.root_count(),
        plan.sub_count(),
        plan.reused_count()
    );
    for node in plan.nodes_by_id() {
        match node.parent_id {
            Some(parent) => {
                let _ = writeln!(out, "  {} - {} (parent {})", node.id, node.name, parent);
            }
            None => {
                let _ = writeln!(out, "  {} - {}", node.id, node.name);
            }
        }
    }

    let _ = writeln!(out, "\nDependents ({}):", plan.assignments.len());
    for assignment in &plan.assignments {
        let target = assignment
            .leaf
            .as_deref()
            .and_then(|leaf| plan.node(leaf).map(|node| (leaf, node.id)));
        match target {
            Some((leaf, id)) => {
                let _ = writeln!(
                    out,
                    "  {}.{} {} -> '{}' ({})",
                    assignment.table, assignment.column, assignment.id, leaf, id
                );
            }
            None => {
                let _ = writeln!(
                    out,
                    "  {}.{} {} -> UNRESOLVED (category {})",
                    assignment.table,
                    assignment.column,
                    assignment.id,
                    assignment.previous_category_id
                );
            }
        }
    }

    if !plan.parent_conflicts.is_empty() {
        let _ = writeln!(
            out,
            "\nWarning: {} segment(s) appear under more than one parent; the first parent is kept:",
            plan.parent_conflicts.len()
        );
        for conflict in &plan.parent_conflicts {
            let _ = writeln!(
                out,
                "  '{}' kept under {} (ignored {} from category {})",
                conflict.segment,
                conflict.kept_parent.as_deref().unwrap_or("<root>"),
                conflict.ignored_parent.as_deref().unwrap_or("<root>"),
                conflict.category_id
            );
        }
    }

    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReorgReportFile<'a> {
    generated_at: String,
    db_path: String,
    plan: &'a HierarchyPlan,
    outcome: &'a ApplyOutcome,
    summary: &'a ReorgSummary,
}

pub fn write_reorg_report(
    reports_dir: &Path,
    db_path: &Path,
    plan: &HierarchyPlan,
    outcome: &ApplyOutcome,
    summary: &ReorgSummary,
) -> Result<PathBuf> {
    fs::create_dir_all(reports_dir)
        .with_context(|| format!("create reports directory {}", reports_dir.display()))?;

    let timestamp = Utc::now().format("reorg-%Y%m%d-%H%M%S.json");
    let path = reports_dir.join(timestamp.to_string());
    let payload = ReorgReportFile {
        generated_at: Utc::now().to_rfc3339(),
        db_path: db_path.display().to_string(),
        plan,
        outcome,
        summary,
    };
    let json = serde_json::to_string_pretty(&payload).context("serialize reorg report")?;
    fs::write(&path, json).with_context(|| format!("write reorg report {}", path.display()))?;
    Ok(path)
}
