//! 用户资料文档客户端
//!
//! 注册完成时写入 `users/{email}` 资料文档，以及昵称的部分字段更新。
//! 昵称长度限制由调用方校验。

use crate::todolist::types::handle_http_response;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

/// 用户资料文档接口
#[async_trait]
pub trait UserApi: Send + Sync {
    /// 写入用户资料文档（注册验证完成后调用一次）
    async fn set_user_info(&self, email: &str, name: &str, created_at: i64) -> Result<()>;

    /// 仅更新 name 字段，不触碰文档其他字段
    async fn update_name(&self, email: &str, name: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetUserInfoRequest<'a> {
    email: &'a str,
    name: &'a str,
    created_at: i64,
}

#[derive(Debug, Serialize)]
struct UpdateNameRequest<'a> {
    email: &'a str,
    name: &'a str,
}

/// 基于 HTTP 的用户资料客户端
pub struct HttpUserApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpUserApi {
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }
}

#[async_trait]
impl UserApi for HttpUserApi {
    async fn set_user_info(&self, email: &str, name: &str, created_at: i64) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/user/set_user_info", self.api_base_url);
        info!("[UserAPI] 📡 写入用户资料: {}", email);
        debug!("[UserAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&SetUserInfoRequest {
                email,
                name,
                created_at,
            })
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<serde_json::Value>(response, "写入用户资料").await?;
        Ok(())
    }

    async fn update_name(&self, email: &str, name: &str) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/user/update_name", self.api_base_url);
        info!("[UserAPI] 📡 更新昵称: {} -> {}", email, name);
        debug!("[UserAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&UpdateNameRequest { email, name })
            .send()
            .await
            .context("请求失败")?;

        handle_http_response::<serde_json::Value>(response, "更新昵称").await?;
        info!("[UserAPI] ✅ 昵称更新成功");
        Ok(())
    }
}
