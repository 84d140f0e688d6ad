//! 用户反馈提交
//!
//! 追加写入 `feedback` 集合：邮箱、内容、毫秒时间戳。内容长度限制
//! （100 字符）由调用方校验。

use crate::todolist::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a> {
    email: &'a str,
    feedback: &'a str,
    timestamp: i64,
}

/// 基于 HTTP 的反馈提交客户端
pub struct HttpFeedbackApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpFeedbackApi {
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    pub async fn submit_feedback(&self, email: &str, feedback: &str) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/feedback/submit", self.api_base_url);
        info!("[Feedback] 📡 提交反馈, 来自: {}", email);
        debug!("[Feedback]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&FeedbackRequest {
                email,
                feedback,
                timestamp: chrono::Utc::now().timestamp_millis(),
            })
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<serde_json::Value>(response, "提交反馈").await?;
        info!("[Feedback] ✅ 反馈提交成功");
        Ok(())
    }
}
