//! 待办 watch 订阅通道
//!
//! 对远端文档库发起长驻的有序实时查询：连接建立后服务器在每次数据
//! 变更时推送当前用户 todos 子树的完整结果集（按 timestamp 升序）。
//! 句柄必须可随时取消，登出 / 注销 / 重建存储时取消订阅，避免上一个
//! 身份的推送泄漏到下一个会话。

use crate::todolist::serialization::decompress_gzip;
use crate::todolist::todos::listener::TodoListener;
use crate::todolist::todos::models::TodoStoreConfig;
use crate::todolist::types::{TodoItem, WatchConnectResp, WatchEvent, WatchPush};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 心跳间隔
const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// watch 订阅句柄
///
/// 持有订阅任务；`cancel` 随时可达，取消后不会再有任何回调送出。
pub struct WatchHandle {
    email: String,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn new(email: String, cancelled: Arc<AtomicBool>, task: JoinHandle<()>) -> Self {
        Self {
            email,
            cancelled,
            task,
        }
    }

    /// 订阅的目标邮箱
    pub fn email(&self) -> &str {
        &self.email
    }

    /// 取消订阅（同步可调，可在 Drop 中使用）
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 构建 watch 连接 URL
fn build_watch_url(config: &TodoStoreConfig, email: &str, operation_id: &str) -> String {
    let compression_param = if config.compression.is_empty() {
        String::new()
    } else {
        format!("&compression={}", config.compression)
    };

    format!(
        "{}/todo/watch?email={}&token={}&operationID={}{}",
        config.ws_url, email, config.token, operation_id, compression_param
    )
}

/// 建立 watch 订阅并启动后台读取任务
pub async fn connect_todo_watch(
    config: &TodoStoreConfig,
    email: &str,
    listener: Arc<dyn TodoListener>,
) -> Result<WatchHandle> {
    let operation_id = format!("{}", chrono::Utc::now().timestamp_millis());
    let url = build_watch_url(config, email, &operation_id);

    info!("[Watch] 🔗 建立 watch 订阅 (email={})", email);

    let (ws_stream, response) = connect_async(&url).await.context("watch 连接失败")?;
    info!("[Watch] ✅ WebSocket 连接成功, 状态: {}", response.status());

    let (writer, mut reader) = ws_stream.split();

    // 等待连接成功响应
    if let Some(Ok(WsMessage::Text(text))) = reader.next().await {
        debug!("[Watch] 📥 连接响应: {}", text);
        let resp: WatchConnectResp =
            serde_json::from_str(&text).context("watch 连接响应解析失败")?;
        if resp.err_code != 0 {
            let error_msg = if !resp.err_dlt.is_empty() {
                format!("{} (详情: {})", resp.err_msg, resp.err_dlt)
            } else {
                resp.err_msg.clone()
            };
            error!(
                "[Watch] ❌ watch 连接失败，错误码: {}, 错误信息: {}",
                resp.err_code, error_msg
            );
            return Err(anyhow::anyhow!(
                "watch 连接失败，错误码: {}, 错误信息: {}",
                resp.err_code,
                error_msg
            ));
        }
    } else {
        error!("[Watch] ❌ 未收到 watch 连接响应");
        return Err(anyhow::anyhow!("未收到 watch 连接响应"));
    }

    info!("[Watch] 💓 启动心跳");
    info!("[Watch] 📥 开始监听服务器推送");

    let cancelled = Arc::new(AtomicBool::new(false));
    let gzip = config.compression == "gzip";
    let task = tokio::spawn(run_watch_loop(
        writer,
        reader,
        gzip,
        cancelled.clone(),
        listener,
    ));

    Ok(WatchHandle::new(email.to_string(), cancelled, task))
}

/// watch 读取主循环：分发推送帧、回应 Ping、定期发送心跳
async fn run_watch_loop(
    mut writer: WsWriter,
    mut reader: WsReader,
    gzip: bool,
    cancelled: Arc<AtomicBool>,
    listener: Arc<dyn TodoListener>,
) {
    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));

    loop {
        if cancelled.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = heartbeat.tick() => {
                if let Err(e) = writer.send(WsMessage::Ping(Vec::new())).await {
                    warn!("[Watch] 💓 心跳发送失败: {}", e);
                    notify_failed(&cancelled, &listener, format!("心跳发送失败: {}", e)).await;
                    break;
                }
            }
            msg = reader.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        dispatch_event(text.as_bytes(), false, &cancelled, &listener).await;
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        dispatch_event(&data, gzip, &cancelled, &listener).await;
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if let Err(e) = writer.send(WsMessage::Pong(data)).await {
                            warn!("[Watch] Pong 发送失败: {}", e);
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("[Watch] 📪 服务器关闭了 watch 连接");
                        notify_failed(&cancelled, &listener, "服务器关闭了 watch 连接".to_string()).await;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("[Watch] ❌ 读取推送失败: {}", e);
                        notify_failed(&cancelled, &listener, format!("读取推送失败: {}", e)).await;
                        break;
                    }
                    None => {
                        info!("[Watch] 📪 watch 连接已断开");
                        notify_failed(&cancelled, &listener, "watch 连接已断开".to_string()).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("[Watch] watch 读取循环退出");
}

/// 解析一帧推送信封，取出其中的事件；data 为空时返回 None（空确认帧）
fn decode_watch_event(bytes: &[u8]) -> Result<Option<WatchEvent>> {
    let push: WatchPush = serde_json::from_slice(bytes).context("watch 推送信封解析失败")?;
    if push.err_code != 0 {
        return Err(anyhow::anyhow!(
            "watch 推送携带错误，错误码: {}, 错误信息: {}",
            push.err_code,
            push.err_msg
        ));
    }
    if push.data.is_empty() {
        return Ok(None);
    }
    let event = serde_json::from_slice(&push.data).context("watch 推送 data 解析失败")?;
    Ok(Some(event))
}

/// 解析并分发一帧推送；解析失败只告警，不中断订阅
async fn dispatch_event(
    payload: &[u8],
    gzip: bool,
    cancelled: &Arc<AtomicBool>,
    listener: &Arc<dyn TodoListener>,
) {
    let decoded;
    let bytes: &[u8] = if gzip {
        match decompress_gzip(payload) {
            Ok(data) => {
                decoded = data;
                &decoded
            }
            Err(e) => {
                warn!("[Watch] 推送帧解压失败: {}", e);
                return;
            }
        }
    } else {
        payload
    };

    let event = match decode_watch_event(bytes) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!("[Watch] 空推送帧，忽略");
            return;
        }
        Err(e) => {
            warn!(
                "[Watch] 推送帧解析失败: {:?}, 原始内容: {}",
                e,
                String::from_utf8_lossy(bytes)
            );
            return;
        }
    };

    if cancelled.load(Ordering::SeqCst) {
        return;
    }

    let mut todos: Vec<TodoItem> = event.todos.into_iter().map(|doc| doc.into_item()).collect();
    todos.sort_by_key(|t| t.timestamp);
    debug!("[Watch] 📥 收到推送，共 {} 条待办", todos.len());
    listener.on_todos_changed(todos).await;
}

async fn notify_failed(
    cancelled: &Arc<AtomicBool>,
    listener: &Arc<dyn TodoListener>,
    reason: String,
) {
    if !cancelled.load(Ordering::SeqCst) {
        listener.on_watch_failed(reason).await;
    }
}
