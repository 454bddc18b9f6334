use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use category_reorg_lib::config::{
    default_db_path, DependentTable, NodeIdentity, ReorgConfig, DEFAULT_DELIMITER,
    DEFAULT_NODE_DESCRIPTION,
};
use category_reorg_lib::confirm::{confirm, Confirmation};
use category_reorg_lib::db::open_pool;
use category_reorg_lib::reorg::{self, render_plan, render_summary, write_reorg_report};
use category_reorg_lib::AppError;

/// Operator-facing progress on stdout, silenced when stdout carries JSON.
macro_rules! say {
    ($config:expr, $($arg:tt)*) => {
        if !$config.json {
            println!($($arg)*);
        }
    };
}

#[derive(Debug, Parser)]
#[command(
    name = "category-reorg",
    about = "Rebuild '>>'-delimited flat categories as a parent-linked tree",
    version
)]
struct Cli {
    /// Catalog database. Defaults to $CATEGORY_REORG_DB, then the user data directory.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Separator between path segments in category names.
    #[arg(long, value_name = "STR", default_value = DEFAULT_DELIMITER)]
    delimiter: String,

    /// Id of the temporary category dependents are parked on during the swap.
    /// Defaults to 999999, or the next free id when the catalog reaches it.
    #[arg(long, value_name = "ID")]
    placeholder_id: Option<i64>,

    /// Deduplicate nodes by segment text alone, or by full path prefix.
    #[arg(long, value_enum, default_value_t = NodeIdentity::Segment)]
    identity: NodeIdentity,

    /// Table and column referencing Categories.Id (repeatable). Defaults to Products.CategoryId.
    #[arg(long = "dependent", value_name = "TABLE.COLUMN")]
    dependents: Vec<DependentTable>,

    /// Description written on every generated category.
    #[arg(long, value_name = "TEXT", default_value = DEFAULT_NODE_DESCRIPTION)]
    description: String,

    /// Load and plan only; print the plan without touching the database.
    #[arg(long)]
    dry_run: bool,

    /// Emit the plan or summary (and errors) as JSON.
    #[arg(long)]
    json: bool,

    /// Write a JSON report of the applied plan into this directory.
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    category_reorg_lib::init_logging();

    let cli = Cli::parse();
    let json_errors = cli.json;
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            if json_errors {
                let app_error = AppError::from(err);
                match serde_json::to_string(&app_error) {
                    Ok(payload) => eprintln!("{payload}"),
                    Err(_) => eprintln!("Error: {app_error}"),
                }
            } else {
                eprintln!("\n✗ Error: {err:#}");
            }
            process::exit(1);
        }
    }
}

fn build_config(cli: Cli) -> Result<ReorgConfig> {
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path().context("determine database path")?,
    };
    let dependents = if cli.dependents.is_empty() {
        vec![DependentTable::products()]
    } else {
        cli.dependents
    };
    let config = ReorgConfig {
        db_path,
        delimiter: cli.delimiter,
        placeholder_id: cli.placeholder_id,
        identity: cli.identity,
        dependents,
        description: cli.description,
        dry_run: cli.dry_run,
        json: cli.json,
        report_dir: cli.report_dir,
    };
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<i32> {
    let config = build_config(cli)?;

    if !config.dry_run {
        let confirmation =
            confirm(io::stdin().lock(), io::stdout()).context("read operator confirmation")?;
        if confirmation == Confirmation::Declined {
            tracing::info!(target: "category_reorg", event = "operator_declined");
            println!("Operation cancelled.");
            return Ok(0);
        }
    }

    run_reorg(config).await
}

async fn run_reorg(config: ReorgConfig) -> Result<i32> {
    say!(config, "Database: {}", config.db_path.display());
    let pool = open_pool(&config.db_path).await?;

    say!(config, "\nFetching and parsing existing categories...");
    let plan = match reorg::prepare(&pool, &config).await {
        Ok(plan) => plan,
        Err(err) => {
            pool.close().await;
            return Err(err.into());
        }
    };
    say!(
        config,
        "  Found {} categories -> {} unique categories ({} root, {} sub)",
        plan.sources.len(),
        plan.nodes.len(),
        plan.root_count(),
        plan.sub_count()
    );
    if !plan.parent_conflicts.is_empty() {
        say!(
            config,
            "  Warning: {} segment(s) appear under more than one parent; the first parent is kept.",
            plan.parent_conflicts.len()
        );
    }

    if config.dry_run {
        pool.close().await;
        if config.json {
            let payload = serde_json::to_string_pretty(&plan).context("serialize plan")?;
            println!("{payload}");
        } else {
            println!("\n{}", render_plan(&plan));
            println!("Dry run: no changes were made.");
        }
        return Ok(0);
    }

    say!(config, "\nReorganizing database...");
    let result = reorg::execute(&pool, &plan, &config, |step| {
        say!(config, "  {}...", step.describe());
    })
    .await;
    pool.close().await;
    let (outcome, summary) = result?;

    say!(config, "\n✓ Successfully reorganized categories!\n");
    if config.json {
        let payload = json!({ "outcome": outcome, "summary": summary });
        let payload = serde_json::to_string_pretty(&payload).context("serialize summary")?;
        println!("{payload}");
    } else {
        print!("{}", render_summary(&summary));
    }

    if let Some(dir) = &config.report_dir {
        let path = write_reorg_report(dir, &config.db_path, &plan, &outcome, &summary)?;
        say!(config, "Report written to {}", path.display());
    }

    Ok(0)
}
