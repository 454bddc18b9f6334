#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use category_reorg_lib::config::{
    DependentTable, NodeIdentity, ReorgConfig, DEFAULT_DELIMITER, DEFAULT_NODE_DESCRIPTION,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

pub const CREATE_CATEGORIES_TABLE: &str = "\
    CREATE TABLE Categories (\
        Id INTEGER PRIMARY KEY,\
        Name TEXT NOT NULL,\
        Description TEXT,\
        IsActive INTEGER NOT NULL DEFAULT 1,\
        CreatedAt TEXT NOT NULL,\
        ParentCategoryId INTEGER NULL REFERENCES Categories(Id)\
    )\
";

pub const CREATE_LEGACY_CATEGORIES_TABLE: &str = "\
    CREATE TABLE Categories (\
        Id INTEGER PRIMARY KEY,\
        Name TEXT NOT NULL,\
        Description TEXT,\
        IsActive INTEGER NOT NULL DEFAULT 1,\
        CreatedAt TEXT NOT NULL\
    )\
";

pub const CREATE_PRODUCTS_TABLE: &str = "\
    CREATE TABLE Products (\
        Id INTEGER PRIMARY KEY,\
        Name TEXT NOT NULL,\
        CategoryId INTEGER NOT NULL REFERENCES Categories(Id)\
    )\
";

pub const GROCERY_CATEGORIES: &[(i64, &str)] = &[
    (1, "Gia vị>>Nước chấm>>Mắm ruốc, mắm nêm"),
    (2, "Gia vị>>Nước chấm>>Mắm tôm"),
    (3, "Đồ uống"),
];

pub const GROCERY_PRODUCTS: &[(i64, i64)] = &[(100, 1), (101, 2), (102, 3)];

async fn connect(path: &Path, create: bool) -> SqlitePool {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("connect sqlite file")
}

/// Create a catalog database at `path` and seed it. The seeding pool is
/// closed before returning so the code under test owns the file.
pub async fn seed_catalog(
    path: &Path,
    categories_ddl: &str,
    categories: &[(i64, &str)],
    products: &[(i64, i64)],
) {
    let pool = connect(path, true).await;
    sqlx::query(categories_ddl).execute(&pool).await.unwrap();
    sqlx::query(CREATE_PRODUCTS_TABLE)
        .execute(&pool)
        .await
        .unwrap();
    for (id, name) in categories {
        sqlx::query(
            "INSERT INTO Categories (Id, Name, Description, IsActive, CreatedAt) \
             VALUES (?1, ?2, NULL, 1, '2025-10-27 00:00:00')",
        )
        .bind(id)
        .bind(name)
        .execute(&pool)
        .await
        .unwrap();
    }
    for (id, category_id) in products {
        sqlx::query("INSERT INTO Products (Id, Name, CategoryId) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(format!("Product {id}"))
            .bind(category_id)
            .execute(&pool)
            .await
            .unwrap();
    }
    pool.close().await;
}

pub async fn seed_grocery_catalog(path: &Path) {
    seed_catalog(
        path,
        CREATE_CATEGORIES_TABLE,
        GROCERY_CATEGORIES,
        GROCERY_PRODUCTS,
    )
    .await;
}

pub async fn open_existing(path: &Path) -> SqlitePool {
    connect(path, false).await
}

pub fn config(db_path: PathBuf) -> ReorgConfig {
    ReorgConfig {
        db_path,
        delimiter: DEFAULT_DELIMITER.to_string(),
        placeholder_id: None,
        identity: NodeIdentity::Segment,
        dependents: vec![DependentTable::products()],
        description: DEFAULT_NODE_DESCRIPTION.to_string(),
        dry_run: false,
        json: false,
        report_dir: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

pub async fn category_rows(pool: &SqlitePool) -> Vec<CategoryRow> {
    sqlx::query("SELECT Id, Name, ParentCategoryId FROM Categories ORDER BY Id")
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| CategoryRow {
            id: row.get("Id"),
            name: row.get("Name"),
            parent_id: row.get("ParentCategoryId"),
        })
        .collect()
}

pub async fn category_names(pool: &SqlitePool) -> Vec<(i64, String)> {
    sqlx::query_as("SELECT Id, Name FROM Categories ORDER BY Id")
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn product_refs(pool: &SqlitePool) -> Vec<(i64, i64)> {
    sqlx::query_as("SELECT Id, CategoryId FROM Products ORDER BY Id")
        .fetch_all(pool)
        .await
        .unwrap()
}

pub async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
    sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.get::<String, _>("name"))
        .collect()
}

pub fn id_of(rows: &[CategoryRow], name: &str) -> i64 {
    rows.iter()
        .find(|row| row.name == name)
        .map(|row| row.id)
        .unwrap_or_else(|| panic!("no category named {name}"))
}
