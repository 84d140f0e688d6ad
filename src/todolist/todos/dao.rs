//! 待办本地存档 DAO
//!
//! 整个列表作为一个 blob 存放在本地键值存储的 `localTodos` key 下，
//! 读-改-写由 TodoStore 独占，其他组件不触碰这个 key。

use crate::todolist::kv::KvStore;
use crate::todolist::serialization::{decode_todos, encode_todos};
use crate::todolist::types::TodoItem;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

/// 本地待办 blob 在键值存储中的 key
pub const LOCAL_TODOS_KEY: &str = "localTodos";

/// 本地待办存档 DAO
pub struct TodoBlobDao {
    kv: Arc<dyn KvStore>,
}

impl TodoBlobDao {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// 读取本地存档；key 缺失返回空列表，blob 损坏返回错误由上层兜底
    pub async fn try_load(&self) -> Result<Vec<TodoItem>> {
        let bytes = match self
            .kv
            .get(LOCAL_TODOS_KEY)
            .await
            .context("读取本地待办存档失败")?
        {
            Some(bytes) => bytes,
            None => {
                debug!("[TodoDAO] 本地存档不存在，返回空列表");
                return Ok(Vec::new());
            }
        };

        let items = decode_todos(&bytes)?;
        debug!("[TodoDAO] 读取本地存档，共 {} 条待办", items.len());
        Ok(items)
    }

    /// 整体重写本地存档
    pub async fn save(&self, items: &[TodoItem]) -> Result<()> {
        let bytes = encode_todos(items)?;
        self.kv
            .set(LOCAL_TODOS_KEY, &bytes)
            .await
            .context("写入本地待办存档失败")?;
        debug!("[TodoDAO] 写入本地存档，共 {} 条待办", items.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todolist::kv::MemoryKvStore;
    use crate::todolist::types::{TodoId, TodoItem};

    fn item(n: u32) -> TodoItem {
        TodoItem {
            id: TodoId::Local(format!("local-{}", n)),
            task: format!("task {}", n),
            is_completed: false,
            timestamp: 1000 + n as i64,
            location: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_blob_loads_empty() {
        let dao = TodoBlobDao::new(Arc::new(MemoryKvStore::new()));
        assert!(dao.try_load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let kv = Arc::new(MemoryKvStore::new());
        let dao = TodoBlobDao::new(kv.clone());
        let items = vec![item(1), item(2), item(3)];
        dao.save(&items).await.unwrap();

        // 新的 DAO 实例读同一个 key
        let other = TodoBlobDao::new(kv);
        assert_eq!(other.try_load().await.unwrap(), items);
    }

    #[tokio::test]
    async fn corrupt_blob_is_an_error() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(LOCAL_TODOS_KEY, b"\xff\xfe not json").await.unwrap();
        let dao = TodoBlobDao::new(kv);
        assert!(dao.try_load().await.is_err());
    }
}
