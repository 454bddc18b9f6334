#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use std::path::Path;

use anyhow::Result;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::tempdir;

use util::*;

fn reorg_cmd(db_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("category-reorg").expect("binary built");
    cmd.env("CATEGORY_REORG_LOG", "off")
        .arg("--db")
        .arg(db_path);
    cmd
}

#[tokio::test]
async fn declining_leaves_the_catalog_untouched() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("catalog.sqlite3");
    seed_grocery_catalog(&db_path).await;

    let assert = reorg_cmd(&db_path).write_stdin("no\n").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("Do you want to proceed? (yes/no):"));
    assert!(stdout.contains("Operation cancelled."));

    let pool = open_existing(&db_path).await;
    assert_eq!(category_names(&pool).await.len(), 3);
    assert_eq!(product_refs(&pool).await, GROCERY_PRODUCTS.to_vec());
    pool.close().await;
    Ok(())
}

#[test]
fn declining_never_opens_the_database() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("never-created.sqlite3");

    // Only the literal "yes" proceeds.
    for answer in ["\n", "y\n", "YES\n", ""] {
        reorg_cmd(&db_path).write_stdin(answer).assert().success();
    }
    assert!(!db_path.exists());
    Ok(())
}

#[tokio::test]
async fn confirming_rebuilds_the_tree() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("catalog.sqlite3");
    seed_grocery_catalog(&db_path).await;

    let assert = reorg_cmd(&db_path).write_stdin("yes\n").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("=== Summary ==="));
    assert!(stdout.contains("Root categories: 2"));
    assert!(stdout.contains("Sub-categories: 3"));
    assert!(stdout.contains("Total categories: 5"));

    let pool = open_existing(&db_path).await;
    let rows = category_rows(&pool).await;
    assert_eq!(
        product_refs(&pool).await,
        vec![
            (100, id_of(&rows, "Mắm ruốc, mắm nêm")),
            (101, id_of(&rows, "Mắm tôm")),
            (102, id_of(&rows, "Đồ uống")),
        ]
    );
    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn dry_run_json_prints_the_plan_only() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("catalog.sqlite3");
    seed_grocery_catalog(&db_path).await;

    let assert = reorg_cmd(&db_path)
        .args(["--dry-run", "--json"])
        .assert()
        .success();
    let plan: Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(plan["nodes"].as_object().map(|n| n.len()), Some(5));
    assert_eq!(plan["nextId"], 8);

    let pool = open_existing(&db_path).await;
    assert_eq!(
        category_names(&pool).await,
        GROCERY_CATEGORIES
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect::<Vec<_>>()
    );
    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn report_dir_receives_a_json_report() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("catalog.sqlite3");
    let reports = dir.path().join("reports");
    seed_grocery_catalog(&db_path).await;

    reorg_cmd(&db_path)
        .arg("--report-dir")
        .arg(&reports)
        .write_stdin("yes\n")
        .assert()
        .success();

    let written: Vec<_> = std::fs::read_dir(&reports)?.collect::<Result<_, _>>()?;
    assert_eq!(written.len(), 1);
    let report: Value = serde_json::from_str(&std::fs::read_to_string(written[0].path())?)?;
    assert_eq!(report["summary"]["total"], 5);
    Ok(())
}

#[test]
fn confirmed_run_against_missing_database_fails() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("absent.sqlite3");

    let assert = reorg_cmd(&db_path)
        .arg("--json")
        .write_stdin("yes\n")
        .assert()
        .failure()
        .code(1);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("STORE/UNAVAILABLE"));
    assert!(!db_path.exists());
    Ok(())
}

#[test]
fn invalid_dependent_is_rejected_before_prompting() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("absent.sqlite3");

    let assert = reorg_cmd(&db_path)
        .args(["--dependent", "Products"])
        .write_stdin("yes\n")
        .assert()
        .failure();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(!stdout.contains("Do you want to proceed?"));
    Ok(())
}
