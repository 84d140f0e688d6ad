//! 远端认证服务客户端
//!
//! 账户创建、凭证登录、邮箱验证检查与账户删除。登录响应携带邮箱验证
//! 标记，未验证的账户由上层拒绝进入。

use crate::todolist::types::{handle_http_response, ApiResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// 登录成功后的账户信息
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
    pub email_verified: bool,
}

/// 远端认证服务接口
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// 创建账户（创建后需要走邮箱验证流程）
    async fn register(&self, email: &str, password: &str) -> Result<()>;

    /// 发送验证邮件
    async fn send_verification(&self, email: &str) -> Result<()>;

    /// 查询邮箱是否已完成验证
    async fn check_verified(&self, email: &str) -> Result<bool>;

    /// 凭证登录
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// 删除账户（调用方必须先清空该账户的业务数据）
    async fn delete_account(&self, email: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifiedData {
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct SignInData {
    email: String,
    #[serde(rename = "emailVerified")]
    email_verified: bool,
}

/// 基于 HTTP 的认证服务客户端
pub struct HttpAuthApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl HttpAuthApi {
    /// `client` 应该已经在外部配置好认证拦截器
    pub fn new(client: reqwest::Client, api_base_url: String) -> Self {
        Self {
            client,
            api_base_url,
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.api_base_url, path);
        debug!("[AuthAPI]   请求URL: {}, 操作ID: {}", url, operation_id);
        self.client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(body)
            .send()
            .await
            .context("请求失败")
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn register(&self, email: &str, password: &str) -> Result<()> {
        info!("[AuthAPI] 📡 请求创建账户: {}", email);
        let response = self
            .post_json("/account/register", &CredentialRequest { email, password })
            .await?;
        handle_http_response::<serde_json::Value>(response, "创建账户").await?;
        Ok(())
    }

    async fn send_verification(&self, email: &str) -> Result<()> {
        info!("[AuthAPI] 📡 请求发送验证邮件: {}", email);
        let response = self
            .post_json("/account/send_verification", &EmailRequest { email })
            .await?;
        handle_http_response::<serde_json::Value>(response, "发送验证邮件").await?;
        Ok(())
    }

    async fn check_verified(&self, email: &str) -> Result<bool> {
        debug!("[AuthAPI] 📡 查询邮箱验证状态: {}", email);
        let response = self
            .post_json("/account/check_verified", &EmailRequest { email })
            .await?;
        let api_resp: ApiResponse<VerifiedData> =
            handle_http_response(response, "查询邮箱验证状态").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;
        Ok(data.verified)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser> {
        info!("[AuthAPI] 🔐 正在登录: {}", email);
        let response = self
            .post_json("/account/login", &CredentialRequest { email, password })
            .await?;
        let api_resp: ApiResponse<SignInData> = handle_http_response(response, "登录").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;
        info!(
            "[AuthAPI] ✅ 登录成功: {}, 邮箱已验证: {}",
            data.email, data.email_verified
        );
        Ok(AuthUser {
            email: data.email,
            email_verified: data.email_verified,
        })
    }

    async fn delete_account(&self, email: &str) -> Result<()> {
        info!("[AuthAPI] 🗑️ 请求删除账户: {}", email);
        let response = self
            .post_json("/account/delete", &EmailRequest { email })
            .await?;
        handle_http_response::<serde_json::Value>(response, "删除账户").await?;
        info!("[AuthAPI] ✅ 账户删除成功: {}", email);
        Ok(())
    }
}
