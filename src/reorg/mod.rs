pub mod apply;
pub mod load;
pub mod path;
pub mod plan;
pub mod report;

use sqlx::SqlitePool;
use tracing::info;

pub use apply::{
    apply_plan, check_placeholder, resolve_placeholder, ApplyOptions, ApplyOutcome, ApplyStep,
};
pub use load::{load_source, SourceSnapshot};
pub use path::parse_path;
pub use plan::{
    build_plan, DependentAssignment, HierarchyPlan, ParentConflict, ParsedCategory, PlanError,
    PlanOptions,
};
pub use report::{render_plan, render_summary, summarize, write_reorg_report, ReorgSummary};

use crate::config::ReorgConfig;
use crate::schema_guard::inspect_schema;
use crate::AppResult;

/// Read-only half of a run: check the schema, load the rows and plan the tree.
pub async fn prepare(pool: &SqlitePool, config: &ReorgConfig) -> AppResult<HierarchyPlan> {
    inspect_schema(pool, &config.dependents).await?;
    let source = load_source(pool, &config.dependents).await?;
    let options = PlanOptions {
        delimiter: config.delimiter.clone(),
        identity: config.identity,
    };
    Ok(build_plan(&source.categories, &source.dependents, &options)?)
}

/// Mutating half of a run: swap the tree in and count the result.
pub async fn execute(
    pool: &SqlitePool,
    plan: &HierarchyPlan,
    config: &ReorgConfig,
    progress: impl FnMut(ApplyStep),
) -> AppResult<(ApplyOutcome, ReorgSummary)> {
    let options = ApplyOptions::new(
        config.placeholder_id,
        config.description.clone(),
        config.dependents.clone(),
    );
    let outcome = apply_plan(pool, plan, &options, progress).await?;
    let summary = summarize(pool, &outcome).await?;
    info!(
        target: "category_reorg",
        event = "reorg_complete",
        root_count = summary.root_count,
        sub_count = summary.sub_count,
        total = summary.total,
        dependents_remapped = summary.dependents_remapped
    );
    Ok((outcome, summary))
}
