//! 本地键值存储
//!
//! 对应移动端的进程级持久化偏好存储：按 key 存取一段不透明字节。
//! 生产实现基于 SQLite 单表（sqlx 驱动），另提供内存实现用于测试与
//! 无盘场景。

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

/// 本地键值存储接口
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// 基于 SQLite 的键值存储（sqlx）
pub struct SqliteKvStore {
    db: Pool<Sqlite>,
}

impl SqliteKvStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }

    /// 初始化表结构
    pub async fn init_db(&self) -> Result<()> {
        Self::init_db_with_connection(&self.db).await
    }

    /// 使用共享连接初始化表结构（静态方法）
    pub async fn init_db_with_connection(db: &Pool<Sqlite>) -> Result<()> {
        info!("[KV/DB] 初始化本地键值表结构");

        let sql = r#"
            CREATE TABLE IF NOT EXISTS local_kv (
                kv_key TEXT PRIMARY KEY,
                kv_value BLOB NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT 0
            )
        "#;
        sqlx::query(sql)
            .execute(db)
            .await
            .context("创建本地键值表失败")?;

        info!("[KV/DB] 本地键值表初始化完成");
        Ok(())
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            r#"
            SELECT kv_value FROM local_kv WHERE kv_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.db)
        .await
        .context("读取本地键值失败")?;

        let value = row.map(|row| row.get::<Vec<u8>, _>("kv_value"));
        debug!(
            "[KV] 读取 key={}, 命中={}",
            key,
            value.is_some()
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let sql = r#"
            INSERT INTO local_kv (kv_key, kv_value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(kv_key) DO UPDATE SET
                kv_value = excluded.kv_value,
                updated_at = excluded.updated_at
        "#;

        sqlx::query(sql)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now().timestamp_millis())
            .execute(&self.db)
            .await
            .context("写入本地键值失败")?;

        debug!("[KV] 写入 key={}, {} 字节", key, value.len());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM local_kv WHERE kv_key = ?
            "#,
        )
        .bind(key)
        .execute(&self.db)
        .await
        .context("删除本地键值失败")?;
        Ok(())
    }
}

/// 内存键值存储（测试与无盘场景）
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("内存键值锁中毒"))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("内存键值锁中毒"))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("内存键值锁中毒"))?;
        entries.remove(key);
        Ok(())
    }
}
