//! 会话上下文
//!
//! 持有当前会话身份（本地 / 远端），并提供影响存储选择的账户生命周期
//! 操作：登录、登出、注册（邮箱验证）、注销。身份整体替换，从不逐字段
//! 修改；每次替换都会重建 TodoStore 并取消旧的 watch 订阅。

use crate::todolist::auth::{AuthApi, HttpAuthApi};
use crate::todolist::db::create_sqlite_pool;
use crate::todolist::kv::{KvStore, SqliteKvStore};
use crate::todolist::todos::api::{HttpTodoApi, TodoApi};
use crate::todolist::todos::dao::TodoBlobDao;
use crate::todolist::todos::listener::TodoListener;
use crate::todolist::todos::models::TodoStoreConfig;
use crate::todolist::todos::service::TodoStore;
use crate::todolist::user::{HttpUserApi, UserApi};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// 登录状态在本地键值存储中的 key
pub const LOGIN_STATE_KEY: &str = "loginState";

/// 邮箱验证窗口（秒）
pub const VERIFICATION_WINDOW_SECS: i64 = 600;

/// 会话身份
///
/// 本地身份不携带任何邮箱，没有哨兵值；远端身份的邮箱同时是远端
/// 集合的分区键。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIdentity {
    /// 离线本地模式，数据仅存设备
    Local,
    /// 已登录的远端身份
    Remote { email: String },
}

impl SessionIdentity {
    pub fn is_remote(&self) -> bool {
        matches!(self, SessionIdentity::Remote { .. })
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            SessionIdentity::Local => None,
            SessionIdentity::Remote { email } => Some(email),
        }
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionIdentity::Local => write!(f, "本地"),
            SessionIdentity::Remote { email } => write!(f, "远端({})", email),
        }
    }
}

/// 持久化的登录状态（`loginState` key 下的 JSON blob）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginState {
    pub is_logged_in: bool,
    pub name: String,
    pub email: String,
}

impl LoginState {
    /// 从持久化状态推导会话身份
    pub fn identity(&self) -> SessionIdentity {
        if self.is_logged_in && !self.email.is_empty() {
            SessionIdentity::Remote {
                email: self.email.clone(),
            }
        } else {
            SessionIdentity::Local
        }
    }
}

/// 注册后的邮箱验证流程句柄
///
/// 创建账户并发出验证邮件后返回；在截止时间前任意次调用
/// `SessionContext::confirm_verification` 轮询验证结果。
#[derive(Debug, Clone)]
pub struct RegistrationFlow {
    pub name: String,
    pub email: String,
    /// 验证截止时间，epoch 毫秒
    pub deadline_ms: i64,
}

impl RegistrationFlow {
    /// 剩余验证时间（秒），过期后为 0
    pub fn remaining_secs(&self) -> i64 {
        let remaining = (self.deadline_ms - chrono::Utc::now().timestamp_millis()) / 1000;
        remaining.max(0)
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp_millis() >= self.deadline_ms
    }
}

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// watch 通道 WebSocket 地址
    pub ws_url: String,
    /// 本地 SQLite 数据库 URL，例如 `sqlite://todolist.db?mode=rwc`
    pub db_url: String,
    /// 认证 token，可为空
    pub token: String,
    /// watch 通道压缩方式，例如 "gzip" 或空字符串表示不压缩
    pub compression: String,
}

impl SessionConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self {
            api_base_url: "http://localhost:10002".to_string(),
            ws_url: "ws://localhost:10001".to_string(),
            db_url: "sqlite://todolist.db?mode=rwc".to_string(),
            token: String::new(),
            compression: "gzip".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话上下文
///
/// 所有存储协作方显式注入，不依赖任何全局单例。
pub struct SessionContext {
    auth: Arc<dyn AuthApi>,
    users: Arc<dyn UserApi>,
    todos_api: Arc<dyn TodoApi>,
    kv: Arc<dyn KvStore>,
    listener: Arc<dyn TodoListener>,
    identity: RwLock<SessionIdentity>,
    login: RwLock<LoginState>,
    store: Mutex<Option<Arc<TodoStore>>>,
    /// 注销串行化标记：同一时间只允许一个注销操作
    deleting: AtomicBool,
}

impl SessionContext {
    /// 创建会话上下文，并从本地持久化状态恢复上次的登录身份
    pub async fn new(
        auth: Arc<dyn AuthApi>,
        users: Arc<dyn UserApi>,
        todos_api: Arc<dyn TodoApi>,
        kv: Arc<dyn KvStore>,
        listener: Arc<dyn TodoListener>,
    ) -> Self {
        let login = Self::load_login_state(kv.as_ref()).await;
        let identity = login.identity();
        info!("[Session] 会话已恢复，身份: {}", identity);

        Self {
            auth,
            users,
            todos_api,
            kv,
            listener,
            identity: RwLock::new(identity),
            login: RwLock::new(login),
            store: Mutex::new(None),
            deleting: AtomicBool::new(false),
        }
    }

    /// 用默认的 HTTP / SQLite 协作方建立会话（CLI 与应用入口使用）
    pub async fn connect(
        config: SessionConfig,
        listener: Arc<dyn TodoListener>,
    ) -> Result<Arc<SessionContext>> {
        info!("[Session] 🔗 初始化会话 (api={})", config.api_base_url);

        // 带认证拦截器的 HTTP 客户端（token 通过 default_headers 自动添加）
        let mut builder = reqwest::ClientBuilder::new();
        if !config.token.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::HeaderName::from_static("token"),
                reqwest::header::HeaderValue::from_str(&config.token)
                    .context("无效的 token")?,
            );
            builder = builder.default_headers(headers);
        }
        let client = builder.build().context("创建 HTTP 客户端失败")?;

        let pool = create_sqlite_pool(&config.db_url)
            .await
            .context(format!("连接SQLite数据库失败: {}", config.db_url))?;
        let kv = Arc::new(SqliteKvStore::new(pool));
        kv.init_db().await?;

        let store_config = TodoStoreConfig {
            api_base_url: config.api_base_url.clone(),
            ws_url: config.ws_url.clone(),
            token: config.token.clone(),
            compression: config.compression.clone(),
        };
        let todos_api = Arc::new(HttpTodoApi::new(client.clone(), store_config));
        let auth = Arc::new(HttpAuthApi::new(client.clone(), config.api_base_url.clone()));
        let users = Arc::new(HttpUserApi::new(client, config.api_base_url.clone()));

        Ok(Arc::new(
            Self::new(auth, users, todos_api, kv, listener).await,
        ))
    }

    async fn load_login_state(kv: &dyn KvStore) -> LoginState {
        let bytes = match kv.get(LOGIN_STATE_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LoginState::default(),
            Err(e) => {
                warn!("[Session] 读取登录状态失败，按未登录处理: {:?}", e);
                return LoginState::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!("[Session] 登录状态解析失败，按未登录处理: {:?}", e);
                LoginState::default()
            }
        }
    }

    async fn persist_login(&self, state: &LoginState) -> Result<()> {
        let bytes = serde_json::to_vec(state).context("序列化登录状态失败")?;
        self.kv
            .set(LOGIN_STATE_KEY, &bytes)
            .await
            .context("持久化登录状态失败")
    }

    /// 当前会话身份
    pub async fn current(&self) -> SessionIdentity {
        self.identity.read().await.clone()
    }

    /// 当前登录状态（展示用）
    pub async fn login_state(&self) -> LoginState {
        self.login.read().await.clone()
    }

    fn build_store(&self, identity: SessionIdentity) -> Arc<TodoStore> {
        Arc::new(TodoStore::new(
            identity,
            self.todos_api.clone(),
            TodoBlobDao::new(self.kv.clone()),
            self.listener.clone(),
        ))
    }

    /// 当前身份下的待办存储（惰性创建）
    pub async fn todo_store(&self) -> Arc<TodoStore> {
        let identity = self.identity.read().await.clone();
        let mut slot = self.store.lock().await;
        if let Some(store) = slot.as_ref() {
            return store.clone();
        }
        let store = self.build_store(identity);
        *slot = Some(store.clone());
        store
    }

    /// 整体替换身份并重建待办存储（旧存储的订阅在此处取消）
    async fn apply_identity(&self, state: LoginState) -> Result<()> {
        let identity = state.identity();
        self.persist_login(&state).await?;
        *self.login.write().await = state;
        *self.identity.write().await = identity.clone();

        let mut slot = self.store.lock().await;
        if let Some(old) = slot.take() {
            old.close();
        }
        *slot = Some(self.build_store(identity.clone()));
        info!("[Session] 🔄 身份已切换: {}", identity);
        Ok(())
    }

    /// 凭证登录
    ///
    /// 昵称由调用方提供并仅存本地；未完成邮箱验证的账户被拒绝。
    pub async fn sign_in(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let user = self
            .auth
            .sign_in(email, password)
            .await
            .context("登录失败")?;
        if !user.email_verified {
            bail!("邮箱尚未完成验证，无法登录: {}", email);
        }

        self.apply_identity(LoginState {
            is_logged_in: true,
            name: name.to_string(),
            email: email.to_string(),
        })
        .await
    }

    /// 登出，回到本地身份
    pub async fn sign_out(&self) -> Result<()> {
        info!("[Session] 👋 登出");
        self.apply_identity(LoginState::default()).await
    }

    /// 注册：创建账户并发送验证邮件，返回验证流程句柄
    pub async fn begin_registration(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<RegistrationFlow> {
        self.auth
            .register(email, password)
            .await
            .context("创建账户失败")?;
        self.auth
            .send_verification(email)
            .await
            .context("发送验证邮件失败")?;

        let deadline_ms =
            chrono::Utc::now().timestamp_millis() + VERIFICATION_WINDOW_SECS * 1000;
        info!(
            "[Session] ✉️ 验证邮件已发送: {}, 验证窗口 {} 秒",
            email, VERIFICATION_WINDOW_SECS
        );
        Ok(RegistrationFlow {
            name: name.to_string(),
            email: email.to_string(),
            deadline_ms,
        })
    }

    /// 轮询邮箱验证结果；验证通过后写入用户资料文档并完成登录
    pub async fn confirm_verification(&self, flow: &RegistrationFlow) -> Result<()> {
        if flow.is_expired() {
            bail!("邮箱验证超时: {}", flow.email);
        }

        let verified = self
            .auth
            .check_verified(&flow.email)
            .await
            .context("查询邮箱验证状态失败")?;
        if !verified {
            bail!("邮箱尚未完成验证: {}", flow.email);
        }

        self.users
            .set_user_info(
                &flow.email,
                &flow.name,
                chrono::Utc::now().timestamp_millis(),
            )
            .await
            .context("写入用户资料失败")?;

        info!("[Session] ✅ 邮箱验证完成: {}", flow.email);
        self.apply_identity(LoginState {
            is_logged_in: true,
            name: flow.name.clone(),
            email: flow.email.clone(),
        })
        .await
    }

    /// 更新昵称（远端资料文档 + 本地登录状态）
    pub async fn update_profile_name(&self, name: &str) -> Result<()> {
        let identity = self.current().await;
        let Some(email) = identity.email() else {
            bail!("本地模式下没有远端资料可更新");
        };
        self.users
            .update_name(email, name)
            .await
            .context("更新昵称失败")?;

        let mut state = self.login.read().await.clone();
        state.name = name.to_string();
        self.persist_login(&state).await?;
        *self.login.write().await = state;
        Ok(())
    }

    /// 注销账户
    ///
    /// 先批量清空该邮箱 todos 子树，再删除账户本身，避免孤儿文档在
    /// 账户消失后残留；完成后等同于登出。同一时间只允许一个注销操作。
    pub async fn delete_account(&self) -> Result<()> {
        if self
            .deleting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("注销操作正在进行中");
        }

        let result = self.delete_account_inner().await;
        self.deleting.store(false, Ordering::SeqCst);
        result
    }

    async fn delete_account_inner(&self) -> Result<()> {
        let identity = self.current().await;
        let Some(email) = identity.email().map(|e| e.to_string()) else {
            bail!("本地模式下没有可注销的账户");
        };

        info!("[Session] 🗑️ 开始注销账户: {}", email);

        let deleted = self
            .todos_api
            .delete_all_todos(&email)
            .await
            .context("清空远端待办失败")?;
        info!("[Session] 已清空远端待办 {} 条", deleted);

        self.auth
            .delete_account(&email)
            .await
            .context("删除账户失败")?;

        info!("[Session] ✅ 账户注销完成: {}", email);
        self.apply_identity(LoginState::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_state_derives_identity() {
        assert_eq!(LoginState::default().identity(), SessionIdentity::Local);

        let logged_in = LoginState {
            is_logged_in: true,
            name: "태한".to_string(),
            email: "a@b.com".to_string(),
        };
        assert_eq!(
            logged_in.identity(),
            SessionIdentity::Remote {
                email: "a@b.com".to_string()
            }
        );

        // isLoggedIn 为 true 但邮箱为空时视为本地
        let broken = LoginState {
            is_logged_in: true,
            name: String::new(),
            email: String::new(),
        };
        assert_eq!(broken.identity(), SessionIdentity::Local);
    }

    #[test]
    fn login_state_uses_original_keys() {
        let state = LoginState {
            is_logged_in: true,
            name: "n".to_string(),
            email: "e@x.com".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"isLoggedIn\":true"));
        assert!(json.contains("\"email\":\"e@x.com\""));
    }

    #[test]
    fn registration_flow_expiry() {
        let now = chrono::Utc::now().timestamp_millis();
        let live = RegistrationFlow {
            name: "n".to_string(),
            email: "e@x.com".to_string(),
            deadline_ms: now + 10_000,
        };
        assert!(!live.is_expired());
        assert!(live.remaining_secs() > 0);

        let expired = RegistrationFlow {
            name: "n".to_string(),
            email: "e@x.com".to_string(),
            deadline_ms: now - 1,
        };
        assert!(expired.is_expired());
        assert_eq!(expired.remaining_secs(), 0);
    }
}
