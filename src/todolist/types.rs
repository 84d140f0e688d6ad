use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// 服务端错误码
pub mod err_code {
    pub const OK: i32 = 0;
    /// 文档不存在（删除/更新幂等处理时用到）
    pub const NOT_FOUND: i32 = 1004;
}

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
/// 错误码非 0 时返回错误，需要容忍特定错误码的调用方（如幂等删除）自行处理响应
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<ApiResponse<T>> {
    use anyhow::Context;

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    if api_resp.err_code != err_code::OK {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "服务器错误 {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }

    Ok(api_resp)
}

// ========== 待办相关结构体 ==========

/// 待办事项标识
///
/// 本地条目与远端文档的 id 互斥：一个条目要么由本地存储产生（UUID），
/// 要么由远端文档库在创建时分配，不存在两者同时有效的状态。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoId {
    /// 本地模式下客户端生成的 UUID
    Local(String),
    /// 远端文档库分配的文档 ID
    Remote(String),
}

impl TodoId {
    pub fn local_id(&self) -> Option<&str> {
        match self {
            TodoId::Local(id) => Some(id),
            TodoId::Remote(_) => None,
        }
    }

    pub fn remote_id(&self) -> Option<&str> {
        match self {
            TodoId::Local(_) => None,
            TodoId::Remote(id) => Some(id),
        }
    }

    /// 不区分来源的原始 id 字符串（CLI 展示用）
    pub fn raw(&self) -> &str {
        match self {
            TodoId::Local(id) | TodoId::Remote(id) => id,
        }
    }
}

/// 待办事项（内存中的领域类型）
#[derive(Debug, Clone, PartialEq)]
pub struct TodoItem {
    pub id: TodoId,
    /// 标题，UI 层限制 30 字符，存储层不做校验
    pub task: String,
    pub is_completed: bool,
    /// 创建时间，epoch 毫秒，唯一排序键（升序）
    pub timestamp: i64,
    /// 地点备注，未设置时为空字符串
    pub location: String,
}

/// 本地 blob 中的待办条目（序列化形态）
///
/// 与原始 App 的本地存档格式保持一致：两个可选 id 字段、camelCase 命名、
/// 毫秒时间戳。反序列化回领域类型时校验"恰好一个 id 有效"。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTodo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub task: String,
    pub is_completed: bool,
    pub timestamp: i64,
    #[serde(default)]
    pub location: String,
}

impl From<&TodoItem> for StoredTodo {
    fn from(item: &TodoItem) -> Self {
        StoredTodo {
            remote_id: item.id.remote_id().map(|s| s.to_string()),
            local_id: item.id.local_id().map(|s| s.to_string()),
            task: item.task.clone(),
            is_completed: item.is_completed,
            timestamp: item.timestamp,
            location: item.location.clone(),
        }
    }
}

impl TryFrom<StoredTodo> for TodoItem {
    type Error = anyhow::Error;

    fn try_from(stored: StoredTodo) -> Result<Self> {
        let id = match (stored.remote_id, stored.local_id) {
            (Some(remote), None) => TodoId::Remote(remote),
            (None, Some(local)) => TodoId::Local(local),
            (Some(_), Some(_)) => {
                return Err(anyhow::anyhow!("存档条目同时携带 remoteId 和 localId"))
            }
            (None, None) => return Err(anyhow::anyhow!("存档条目缺少 id")),
        };
        Ok(TodoItem {
            id,
            task: stored.task,
            is_completed: stored.is_completed,
            timestamp: stored.timestamp,
            location: stored.location,
        })
    }
}

/// 远端待办文档（服务器返回的 JSON 结构，id 由服务器分配）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTodo {
    pub id: String,
    pub task: String,
    pub is_completed: bool,
    pub timestamp: i64,
    #[serde(default)]
    pub location: String,
}

impl RemoteTodo {
    pub fn into_item(self) -> TodoItem {
        TodoItem {
            id: TodoId::Remote(self.id),
            task: self.task,
            is_completed: self.is_completed,
            timestamp: self.timestamp,
            location: self.location,
        }
    }
}

/// 新增待办的提交体（不携带客户端 id，id 由服务器分配）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub task: String,
    pub is_completed: bool,
    pub timestamp: i64,
    pub location: String,
}

/// watch 连接建立时的文本响应
#[derive(Debug, Deserialize)]
pub struct WatchConnectResp {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    #[serde(rename = "errDlt", default)]
    pub err_dlt: String,
}

/// watch 推送帧信封
///
/// 帧体在 compression=gzip 时整体压缩；data 字段为 base64 编码的
/// 事件 JSON，可能为 null 或缺失（服务器的空确认帧）。
#[derive(Debug, Deserialize)]
pub struct WatchPush {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg", default)]
    pub err_msg: String,
    #[serde(
        default,
        deserialize_with = "crate::todolist::serialization::deserialize_base64"
    )]
    pub data: Vec<u8>,
}

/// watch 推送事件：当前用户 todos 子树的完整结果集（按 timestamp 升序）
#[derive(Debug, Deserialize)]
pub struct WatchEvent {
    pub todos: Vec<RemoteTodo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_todo_roundtrips_local_item() {
        let item = TodoItem {
            id: TodoId::Local("uuid-1".to_string()),
            task: "买牛奶".to_string(),
            is_completed: false,
            timestamp: 1714550400123,
            location: "超市".to_string(),
        };
        let stored = StoredTodo::from(&item);
        assert_eq!(stored.local_id.as_deref(), Some("uuid-1"));
        assert!(stored.remote_id.is_none());
        let back = TodoItem::try_from(stored).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn stored_todo_rejects_missing_and_double_ids() {
        let missing = StoredTodo {
            remote_id: None,
            local_id: None,
            task: "t".to_string(),
            is_completed: false,
            timestamp: 0,
            location: String::new(),
        };
        assert!(TodoItem::try_from(missing).is_err());

        let double = StoredTodo {
            remote_id: Some("r".to_string()),
            local_id: Some("l".to_string()),
            task: "t".to_string(),
            is_completed: false,
            timestamp: 0,
            location: String::new(),
        };
        assert!(TodoItem::try_from(double).is_err());
    }

    #[test]
    fn remote_todo_deserializes_camel_case() {
        let json = r#"{"id":"doc-1","task":"Buy milk","isCompleted":true,"timestamp":1714550400123,"location":"Store"}"#;
        let doc: RemoteTodo = serde_json::from_str(json).unwrap();
        let item = doc.into_item();
        assert_eq!(item.id, TodoId::Remote("doc-1".to_string()));
        assert!(item.is_completed);
        assert_eq!(item.timestamp, 1714550400123);
    }
}
