//! 待办远端 HTTP API 客户端
//!
//! 远端文档库契约：按邮箱定位 `users/{email}/todos` 子树，支持全量
//! 拉取、新增（服务器分配文档 id）、删除、完成标记的部分字段更新、
//! 批量清空，以及 watch 实时订阅。删除与更新对"文档不存在"按成功
//! 处理（幂等语义）。

use crate::todolist::todos::listener::TodoListener;
use crate::todolist::todos::models::TodoStoreConfig;
use crate::todolist::todos::watch::{connect_todo_watch, WatchHandle};
use crate::todolist::types::{
    err_code, handle_http_response, ApiResponse, NewTodo, RemoteTodo, TodoItem,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 远端待办文档库接口
#[async_trait]
pub trait TodoApi: Send + Sync {
    /// 拉取该邮箱子树下的全部待办（按 timestamp 升序）
    async fn fetch_all(&self, email: &str) -> Result<Vec<TodoItem>>;

    /// 新增待办，返回服务器分配的文档 id
    async fn add_todo(&self, email: &str, todo: &NewTodo) -> Result<String>;

    /// 删除待办；文档不存在视为成功
    async fn delete_todo(&self, email: &str, remote_id: &str) -> Result<()>;

    /// 仅更新完成标记，不触碰其他字段；文档不存在视为成功
    async fn set_completed(&self, email: &str, remote_id: &str, is_completed: bool)
        -> Result<()>;

    /// 批量删除该邮箱子树下的全部待办，返回删除数量
    async fn delete_all_todos(&self, email: &str) -> Result<u64>;

    /// 建立实时订阅；每次变更推送完整结果集，句柄取消前长驻
    async fn watch(&self, email: &str, listener: Arc<dyn TodoListener>) -> Result<WatchHandle>;
}

#[derive(Debug, Deserialize)]
struct AllTodosData {
    todos: Vec<RemoteTodo>,
}

#[derive(Debug, Deserialize)]
struct AddTodoData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteAllData {
    deleted: u64,
}

/// 基于 HTTP + WebSocket 的待办文档库客户端
pub struct HttpTodoApi {
    client: reqwest::Client,
    config: TodoStoreConfig,
}

impl HttpTodoApi {
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, config: TodoStoreConfig) -> Self {
        Self { client, config }
    }

    async fn post_json(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.config.api_base_url, path);
        debug!("[TodoAPI]   请求URL: {}, 操作ID: {}", url, operation_id);
        self.client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")
    }

    /// 幂等操作的响应处理：NOT_FOUND 按成功处理，其余错误码照常报错
    async fn handle_idempotent(
        response: reqwest::Response,
        operation_name: &str,
    ) -> Result<()> {
        let status = response.status();
        let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
        let body_str = String::from_utf8_lossy(&body_bytes);

        if !status.is_success() {
            error!(
                "[TodoAPI] {}请求失败，HTTP状态: {}, 响应: {}",
                operation_name, status, body_str
            );
            return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
        }

        let api_resp: ApiResponse<serde_json::Value> = serde_json::from_slice(&body_bytes)
            .map_err(|e| {
                error!(
                    "[TodoAPI] {}反序列化失败: {:?}\n原始响应: {}",
                    operation_name, e, body_str
                );
                anyhow::anyhow!("反序列化响应失败: {:?}", e)
            })?;

        match api_resp.err_code {
            err_code::OK => Ok(()),
            err_code::NOT_FOUND => {
                warn!("[TodoAPI] {}目标文档不存在，按成功处理", operation_name);
                Ok(())
            }
            code => {
                error!(
                    "[TodoAPI] {}服务器错误，错误码: {}, 错误信息: {}",
                    operation_name, code, api_resp.err_msg
                );
                Err(anyhow::anyhow!(
                    "服务器错误 {}: {}",
                    code,
                    api_resp.err_msg
                ))
            }
        }
    }
}

#[async_trait]
impl TodoApi for HttpTodoApi {
    async fn fetch_all(&self, email: &str) -> Result<Vec<TodoItem>> {
        info!("[TodoAPI] 📡 拉取全部待办 (email={})", email);
        let response = self
            .post_json("/todo/get_all_todos", serde_json::json!({ "email": email }))
            .await?;
        let api_resp: ApiResponse<AllTodosData> =
            handle_http_response(response, "拉取全部待办").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        let mut todos: Vec<TodoItem> = data.todos.into_iter().map(|doc| doc.into_item()).collect();
        todos.sort_by_key(|t| t.timestamp);
        info!("[TodoAPI] ✅ 拉取到 {} 条待办", todos.len());
        Ok(todos)
    }

    async fn add_todo(&self, email: &str, todo: &NewTodo) -> Result<String> {
        info!("[TodoAPI] 📡 新增待办 (email={})", email);
        let response = self
            .post_json(
                "/todo/add_todo",
                serde_json::json!({ "email": email, "todo": todo }),
            )
            .await?;
        let api_resp: ApiResponse<AddTodoData> = handle_http_response(response, "新增待办").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;
        info!("[TodoAPI] ✅ 新增成功，文档ID: {}", data.id);
        Ok(data.id)
    }

    async fn delete_todo(&self, email: &str, remote_id: &str) -> Result<()> {
        info!("[TodoAPI] 🗑️ 删除待办 (email={}, id={})", email, remote_id);
        let response = self
            .post_json(
                "/todo/delete_todo",
                serde_json::json!({ "email": email, "id": remote_id }),
            )
            .await?;
        Self::handle_idempotent(response, "删除待办").await
    }

    async fn set_completed(
        &self,
        email: &str,
        remote_id: &str,
        is_completed: bool,
    ) -> Result<()> {
        info!(
            "[TodoAPI] 📡 更新完成标记 (email={}, id={}, isCompleted={})",
            email, remote_id, is_completed
        );
        let response = self
            .post_json(
                "/todo/update_completed",
                serde_json::json!({ "email": email, "id": remote_id, "isCompleted": is_completed }),
            )
            .await?;
        Self::handle_idempotent(response, "更新完成标记").await
    }

    async fn delete_all_todos(&self, email: &str) -> Result<u64> {
        info!("[TodoAPI] 🗑️ 批量清空待办 (email={})", email);
        let response = self
            .post_json(
                "/todo/delete_all_todos",
                serde_json::json!({ "email": email }),
            )
            .await?;
        let api_resp: ApiResponse<DeleteAllData> =
            handle_http_response(response, "批量清空待办").await?;
        let deleted = api_resp.data.map(|d| d.deleted).unwrap_or(0);
        info!("[TodoAPI] ✅ 批量清空完成，删除 {} 条", deleted);
        Ok(deleted)
    }

    async fn watch(&self, email: &str, listener: Arc<dyn TodoListener>) -> Result<WatchHandle> {
        connect_todo_watch(&self.config, email, listener).await
    }
}
