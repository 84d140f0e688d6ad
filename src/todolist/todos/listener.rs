//! 待办列表监听器回调接口

use crate::todolist::types::TodoItem;
use async_trait::async_trait;

/// 待办列表监听器回调接口
///
/// 远端模式下由 watch 订阅在每次服务器推送后触发，本地模式下不触发。
#[async_trait]
pub trait TodoListener: Send + Sync {
    /// 列表变更（携带完整结果集，按 timestamp 升序）
    async fn on_todos_changed(&self, todos: Vec<TodoItem>);

    /// watch 订阅失败或中断
    async fn on_watch_failed(&self, reason: String);
}

/// 空实现（默认监听器）
pub struct EmptyTodoListener;

#[async_trait]
impl TodoListener for EmptyTodoListener {
    async fn on_todos_changed(&self, _todos: Vec<TodoItem>) {}
    async fn on_watch_failed(&self, _reason: String) {}
}
