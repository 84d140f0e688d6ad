//! 待办存储服务层
//!
//! 当前身份下待办列表的唯一事实来源。本地身份下读写 `localTodos`
//! 存档 blob；远端身份下走文档库 API，并以 watch 订阅推送的结果集
//! 作为内存列表的权威数据。身份切换时整个存储被重建，旧订阅取消。

use crate::todolist::session::SessionIdentity;
use crate::todolist::todos::api::TodoApi;
use crate::todolist::todos::dao::TodoBlobDao;
use crate::todolist::todos::listener::TodoListener;
use crate::todolist::todos::watch::WatchHandle;
use crate::todolist::types::{NewTodo, TodoId, TodoItem};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 待办存储
///
/// 绑定构造时的会话身份；身份变化时由上层丢弃并重建。
pub struct TodoStore {
    identity: SessionIdentity,
    api: Arc<dyn TodoApi>,
    dao: TodoBlobDao,
    listener: Arc<dyn TodoListener>,
    /// 内存列表；远端模式下由 watch 推送整体替换
    items: Arc<RwLock<Vec<TodoItem>>>,
    watch: StdMutex<Option<WatchHandle>>,
}

/// watch 推送与内存列表之间的桥接：先落内存，再转发给外部监听器
struct WatchBridge {
    items: Arc<RwLock<Vec<TodoItem>>>,
    listener: Arc<dyn TodoListener>,
}

#[async_trait]
impl TodoListener for WatchBridge {
    async fn on_todos_changed(&self, mut todos: Vec<TodoItem>) {
        todos.sort_by_key(|t| t.timestamp);
        *self.items.write().await = todos.clone();
        self.listener.on_todos_changed(todos).await;
    }

    async fn on_watch_failed(&self, reason: String) {
        self.listener.on_watch_failed(reason).await;
    }
}

impl TodoStore {
    /// 创建绑定到指定身份的待办存储
    pub fn new(
        identity: SessionIdentity,
        api: Arc<dyn TodoApi>,
        dao: TodoBlobDao,
        listener: Arc<dyn TodoListener>,
    ) -> Self {
        info!("[TodoStore] 创建待办存储，身份: {}", identity);
        Self {
            identity,
            api,
            dao,
            listener,
            items: Arc::new(RwLock::new(Vec::new())),
            watch: StdMutex::new(None),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    fn watch_slot(&self) -> std::sync::MutexGuard<'_, Option<WatchHandle>> {
        self.watch.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 加载待办列表（两种模式下都按 timestamp 升序返回）
    ///
    /// 本地模式：读取存档 blob，损坏时记录诊断并保持内存中的上一份
    /// 好数据。远端模式：首次调用做一次种子拉取并建立 watch 订阅，
    /// 之后内存列表由订阅推送整体替换。
    pub async fn load(&self) -> Result<Vec<TodoItem>> {
        match &self.identity {
            SessionIdentity::Local => {
                match self.dao.try_load().await {
                    Ok(mut list) => {
                        list.sort_by_key(|t| t.timestamp);
                        *self.items.write().await = list.clone();
                        Ok(list)
                    }
                    Err(e) => {
                        // 损坏的存档不致命，也不覆盖内存中已有的数据
                        warn!("[TodoStore] 本地存档读取失败，保持上一份数据: {:?}", e);
                        Ok(self.items.read().await.clone())
                    }
                }
            }
            SessionIdentity::Remote { email } => {
                let watching = self.watch_slot().is_some();
                if !watching {
                    let seed = self
                        .api
                        .fetch_all(email)
                        .await
                        .context("加载远端待办失败")?;
                    *self.items.write().await = seed;

                    let bridge = Arc::new(WatchBridge {
                        items: self.items.clone(),
                        listener: self.listener.clone(),
                    });
                    let handle = self
                        .api
                        .watch(email, bridge)
                        .await
                        .context("建立 watch 订阅失败")?;

                    let mut slot = self.watch_slot();
                    if slot.is_none() {
                        *slot = Some(handle);
                    } else {
                        // 并发 load 已经建好订阅，多余的这条立即取消
                        handle.cancel();
                    }
                }
                Ok(self.items.read().await.clone())
            }
        }
    }

    /// 新增待办
    ///
    /// 标题非空等业务校验是调用方的责任。本地模式分配 UUID localId
    /// 并在返回前整体重写存档；远端模式提交后由服务器分配文档 id，
    /// 内存列表交给 watch 推送更新。
    pub async fn add(&self, task: &str, location: &str) -> Result<TodoItem> {
        let timestamp = chrono::Utc::now().timestamp_millis();

        match &self.identity {
            SessionIdentity::Local => {
                let item = TodoItem {
                    id: TodoId::Local(Uuid::new_v4().to_string()),
                    task: task.to_string(),
                    is_completed: false,
                    timestamp,
                    location: location.to_string(),
                };

                let mut next = self.items.read().await.clone();
                next.push(item.clone());
                match self.dao.save(&next).await {
                    Ok(()) => {
                        *self.items.write().await = next;
                        debug!("[TodoStore] 本地新增待办: {}", item.id.raw());
                    }
                    Err(e) => {
                        // 写档失败：放弃本次变更，内存保持上一份好数据
                        warn!("[TodoStore] 本地存档写入失败，本次新增已放弃: {:?}", e);
                    }
                }
                Ok(item)
            }
            SessionIdentity::Remote { email } => {
                let doc = NewTodo {
                    task: task.to_string(),
                    is_completed: false,
                    timestamp,
                    location: location.to_string(),
                };
                let remote_id = self
                    .api
                    .add_todo(email, &doc)
                    .await
                    .context("新增远端待办失败")?;
                // 内存列表由 watch 推送更新，这里不直接插入
                Ok(TodoItem {
                    id: TodoId::Remote(remote_id),
                    task: doc.task,
                    is_completed: false,
                    timestamp,
                    location: doc.location,
                })
            }
        }
    }

    /// 删除待办；目标不存在是 no-op 而不是错误
    pub async fn remove(&self, item: &TodoItem) -> Result<()> {
        match &self.identity {
            SessionIdentity::Local => {
                let Some(local_id) = item.id.local_id() else {
                    debug!("[TodoStore] 本地模式下忽略非本地 id 的删除请求");
                    return Ok(());
                };

                let current = self.items.read().await.clone();
                let next: Vec<TodoItem> = current
                    .iter()
                    .filter(|t| t.id.local_id() != Some(local_id))
                    .cloned()
                    .collect();
                if next.len() == current.len() {
                    debug!("[TodoStore] 待删除的待办不存在: {}", local_id);
                    return Ok(());
                }

                match self.dao.save(&next).await {
                    Ok(()) => {
                        *self.items.write().await = next;
                        debug!("[TodoStore] 本地删除待办: {}", local_id);
                    }
                    Err(e) => {
                        warn!("[TodoStore] 本地存档写入失败，本次删除已放弃: {:?}", e);
                    }
                }
                Ok(())
            }
            SessionIdentity::Remote { email } => {
                let Some(remote_id) = item.id.remote_id() else {
                    debug!("[TodoStore] 远端模式下忽略无 remoteId 的删除请求");
                    return Ok(());
                };
                self.api
                    .delete_todo(email, remote_id)
                    .await
                    .context("删除远端待办失败")
            }
        }
    }

    /// 更新完成标记；只改这一个字段，目标不存在是 no-op
    pub async fn set_completed(&self, item: &TodoItem, value: bool) -> Result<()> {
        match &self.identity {
            SessionIdentity::Local => {
                let Some(local_id) = item.id.local_id() else {
                    debug!("[TodoStore] 本地模式下忽略非本地 id 的更新请求");
                    return Ok(());
                };

                let mut next = self.items.read().await.clone();
                let Some(target) = next.iter_mut().find(|t| t.id.local_id() == Some(local_id))
                else {
                    debug!("[TodoStore] 待更新的待办不存在: {}", local_id);
                    return Ok(());
                };
                target.is_completed = value;

                match self.dao.save(&next).await {
                    Ok(()) => {
                        *self.items.write().await = next;
                        debug!(
                            "[TodoStore] 本地更新完成标记: {} -> {}",
                            local_id, value
                        );
                    }
                    Err(e) => {
                        warn!("[TodoStore] 本地存档写入失败，本次更新已放弃: {:?}", e);
                    }
                }
                Ok(())
            }
            SessionIdentity::Remote { email } => {
                let Some(remote_id) = item.id.remote_id() else {
                    debug!("[TodoStore] 远端模式下忽略无 remoteId 的更新请求");
                    return Ok(());
                };
                self.api
                    .set_completed(email, remote_id, value)
                    .await
                    .context("更新远端待办完成标记失败")
            }
        }
    }

    /// 释放存储：取消 watch 订阅
    ///
    /// 登出 / 注销 / 重建存储时必须调用，否则上一个身份的推送会
    /// 泄漏到下一个会话。
    pub fn close(&self) {
        if let Some(handle) = self.watch_slot().take() {
            info!("[TodoStore] 🛑 取消 watch 订阅 (email={})", handle.email());
            handle.cancel();
        }
    }
}

impl Drop for TodoStore {
    fn drop(&mut self) {
        if let Some(handle) = self.watch_slot().take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todolist::kv::{KvStore, MemoryKvStore};
    use crate::todolist::todos::listener::EmptyTodoListener;

    /// 本地模式下不应触达远端 API
    struct UnreachableTodoApi;

    #[async_trait]
    impl TodoApi for UnreachableTodoApi {
        async fn fetch_all(&self, _email: &str) -> Result<Vec<TodoItem>> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
        async fn add_todo(&self, _email: &str, _todo: &NewTodo) -> Result<String> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
        async fn delete_todo(&self, _email: &str, _remote_id: &str) -> Result<()> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
        async fn set_completed(
            &self,
            _email: &str,
            _remote_id: &str,
            _is_completed: bool,
        ) -> Result<()> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
        async fn delete_all_todos(&self, _email: &str) -> Result<u64> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
        async fn watch(
            &self,
            _email: &str,
            _listener: Arc<dyn TodoListener>,
        ) -> Result<WatchHandle> {
            Err(anyhow::anyhow!("本地模式不应调用远端 API"))
        }
    }

    /// 写入必败的键值存储，用于验证写档失败时的回滚
    struct BrokenKv {
        inner: MemoryKvStore,
        fail_writes: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl KvStore for BrokenKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(anyhow::anyhow!("磁盘写入失败"));
            }
            self.inner.set(key, value).await
        }
        async fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key).await
        }
    }

    fn local_store(kv: Arc<dyn KvStore>) -> TodoStore {
        TodoStore::new(
            SessionIdentity::Local,
            Arc::new(UnreachableTodoApi),
            TodoBlobDao::new(kv),
            Arc::new(EmptyTodoListener),
        )
    }

    #[tokio::test]
    async fn local_add_assigns_unique_local_ids() {
        let store = local_store(Arc::new(MemoryKvStore::new()));
        let a = store.add("任务一", "").await.unwrap();
        let b = store.add("任务二", "").await.unwrap();

        assert!(a.id.local_id().is_some());
        assert!(b.id.local_id().is_some());
        assert_ne!(a.id, b.id);
        assert!(a.id.remote_id().is_none());

        let list = store.load().await.unwrap();
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn local_write_failure_keeps_last_good_state() {
        let kv = Arc::new(BrokenKv {
            inner: MemoryKvStore::new(),
            fail_writes: std::sync::atomic::AtomicBool::new(false),
        });
        let store = local_store(kv.clone());
        store.add("第一条", "").await.unwrap();

        kv.fail_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        // 写档失败：调用静默返回，但列表保持上一份好数据
        store.add("写不进去的", "").await.unwrap();

        let list = store.load().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].task, "第一条");
    }

    #[tokio::test]
    async fn local_remove_missing_is_noop() {
        let store = local_store(Arc::new(MemoryKvStore::new()));
        let kept = store.add("保留", "").await.unwrap();

        let ghost = TodoItem {
            id: TodoId::Local("不存在的".to_string()),
            task: "ghost".to_string(),
            is_completed: false,
            timestamp: 0,
            location: String::new(),
        };
        store.remove(&ghost).await.unwrap();

        let list = store.load().await.unwrap();
        assert_eq!(list, vec![kept]);
    }
}
