//! 集成测试用的内存协作方实现
//!
//! FakeTodoApi 用 broadcast 通道模拟远端文档库的 watch 推送：任何
//! 写操作都会让对应邮箱的订阅任务重新推送完整结果集。

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use todolist_sdk_core_rust::todolist::auth::{AuthApi, AuthUser};
use todolist_sdk_core_rust::todolist::todos::api::TodoApi;
use todolist_sdk_core_rust::todolist::todos::listener::TodoListener;
use todolist_sdk_core_rust::todolist::todos::watch::WatchHandle;
use todolist_sdk_core_rust::todolist::types::{NewTodo, RemoteTodo, TodoItem};
use todolist_sdk_core_rust::todolist::user::UserApi;
use tokio::sync::broadcast;

type Docs = Arc<Mutex<HashMap<String, Vec<RemoteTodo>>>>;

fn snapshot(docs: &Docs, email: &str) -> Vec<TodoItem> {
    let docs = docs.lock().unwrap();
    let mut items: Vec<TodoItem> = docs
        .get(email)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|doc| doc.into_item())
        .collect();
    items.sort_by_key(|t| t.timestamp);
    items
}

/// 内存版远端待办文档库
pub struct FakeTodoApi {
    docs: Docs,
    next_id: AtomicU64,
    tx: broadcast::Sender<String>,
}

impl FakeTodoApi {
    pub fn new() -> Arc<Self> {
        let (tx, _) = broadcast::channel(64);
        Arc::new(Self {
            docs: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            tx,
        })
    }

    fn notify(&self, email: &str) {
        let _ = self.tx.send(email.to_string());
    }

    /// 服务器侧直接写入一条文档（模拟其他客户端的写入）
    pub fn push_doc(&self, email: &str, task: &str, timestamp: i64) -> String {
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.docs
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .push(RemoteTodo {
                id: id.clone(),
                task: task.to_string(),
                is_completed: false,
                timestamp,
                location: String::new(),
            });
        self.notify(email);
        id
    }

    pub fn doc_count(&self, email: &str) -> usize {
        self.docs
            .lock()
            .unwrap()
            .get(email)
            .map(|d| d.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TodoApi for FakeTodoApi {
    async fn fetch_all(&self, email: &str) -> Result<Vec<TodoItem>> {
        Ok(snapshot(&self.docs, email))
    }

    async fn add_todo(&self, email: &str, todo: &NewTodo) -> Result<String> {
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.docs
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_default()
            .push(RemoteTodo {
                id: id.clone(),
                task: todo.task.clone(),
                is_completed: todo.is_completed,
                timestamp: todo.timestamp,
                location: todo.location.clone(),
            });
        self.notify(email);
        Ok(id)
    }

    async fn delete_todo(&self, email: &str, remote_id: &str) -> Result<()> {
        // 文档不存在时静默成功（幂等）
        if let Some(docs) = self.docs.lock().unwrap().get_mut(email) {
            docs.retain(|d| d.id != remote_id);
        }
        self.notify(email);
        Ok(())
    }

    async fn set_completed(
        &self,
        email: &str,
        remote_id: &str,
        is_completed: bool,
    ) -> Result<()> {
        if let Some(docs) = self.docs.lock().unwrap().get_mut(email) {
            if let Some(doc) = docs.iter_mut().find(|d| d.id == remote_id) {
                doc.is_completed = is_completed;
            }
        }
        self.notify(email);
        Ok(())
    }

    async fn delete_all_todos(&self, email: &str) -> Result<u64> {
        let removed = self
            .docs
            .lock()
            .unwrap()
            .remove(email)
            .map(|d| d.len() as u64)
            .unwrap_or(0);
        self.notify(email);
        Ok(removed)
    }

    async fn watch(&self, email: &str, listener: Arc<dyn TodoListener>) -> Result<WatchHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let docs = self.docs.clone();
        let mut rx = self.tx.subscribe();
        let watched = email.to_string();
        let task_cancelled = cancelled.clone();

        let task = tokio::spawn(async move {
            // 初始快照（订阅建立后立即推送当前数据）
            if !task_cancelled.load(Ordering::SeqCst) {
                listener
                    .on_todos_changed(snapshot(&docs, &watched))
                    .await;
            }
            loop {
                match rx.recv().await {
                    Ok(changed) if changed == watched => {
                        if task_cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        listener
                            .on_todos_changed(snapshot(&docs, &watched))
                            .await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        listener
                            .on_todos_changed(snapshot(&docs, &watched))
                            .await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(WatchHandle::new(email.to_string(), cancelled, task))
    }
}

/// 内存版认证服务
#[derive(Default)]
pub struct FakeAuthApi {
    pub registered: Mutex<HashSet<String>>,
    pub verified: Mutex<HashSet<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeAuthApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 模拟用户点击了验证邮件里的链接
    pub fn mark_verified(&self, email: &str) {
        self.verified.lock().unwrap().insert(email.to_string());
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn register(&self, email: &str, _password: &str) -> Result<()> {
        self.registered.lock().unwrap().insert(email.to_string());
        Ok(())
    }

    async fn send_verification(&self, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn check_verified(&self, email: &str) -> Result<bool> {
        Ok(self.verified.lock().unwrap().contains(email))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthUser> {
        Ok(AuthUser {
            email: email.to_string(),
            email_verified: self.verified.lock().unwrap().contains(email),
        })
    }

    async fn delete_account(&self, email: &str) -> Result<()> {
        self.registered.lock().unwrap().remove(email);
        self.verified.lock().unwrap().remove(email);
        self.deleted.lock().unwrap().push(email.to_string());
        Ok(())
    }
}

/// 内存版用户资料文档
#[derive(Default)]
pub struct FakeUserApi {
    pub profiles: Mutex<HashMap<String, String>>,
    pub name_updates: Mutex<Vec<(String, String)>>,
}

impl FakeUserApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl UserApi for FakeUserApi {
    async fn set_user_info(&self, email: &str, name: &str, _created_at: i64) -> Result<()> {
        self.profiles
            .lock()
            .unwrap()
            .insert(email.to_string(), name.to_string());
        Ok(())
    }

    async fn update_name(&self, email: &str, name: &str) -> Result<()> {
        self.profiles
            .lock()
            .unwrap()
            .insert(email.to_string(), name.to_string());
        self.name_updates
            .lock()
            .unwrap()
            .push((email.to_string(), name.to_string()));
        Ok(())
    }
}

/// 记录所有回调的监听器
#[derive(Default)]
pub struct RecordingListener {
    pub updates: Mutex<Vec<Vec<TodoItem>>>,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// 轮询等待，直到累计的推送满足断言或超时
    pub async fn wait_until<F>(&self, pred: F) -> bool
    where
        F: Fn(&[Vec<TodoItem>]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            {
                let updates = self.updates.lock().unwrap();
                if pred(&updates) {
                    return true;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl TodoListener for RecordingListener {
    async fn on_todos_changed(&self, todos: Vec<TodoItem>) {
        self.updates.lock().unwrap().push(todos);
    }

    async fn on_watch_failed(&self, reason: String) {
        self.failures.lock().unwrap().push(reason);
    }
}
