//! SQLite 数据库工具：统一创建连接池
//!
//! 表结构由各 DAO 在初始化时通过 `CREATE TABLE IF NOT EXISTS` 建立，
//! 不依赖独立的迁移目录。

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};

/// 创建 SQLite 连接池
pub async fn create_sqlite_pool(db_url: &str) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await?;
    Ok(pool)
}
