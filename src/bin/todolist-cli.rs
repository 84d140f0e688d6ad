//! TodoList CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示数据同步功能
//! 启动时通过命令行参数指定账户（或本地模式），执行请求的操作后
//! 持续监听远端推送

use anyhow::Result;
use clap::Parser;
use todolist_sdk_core_rust::todolist::feedback::HttpFeedbackApi;
use todolist_sdk_core_rust::todolist::preferences::{
    PreferencesDao, SUPPORTED_LANGUAGES, TEXT_SIZE_RANGE,
};
use todolist_sdk_core_rust::todolist::validate;
use todolist_sdk_core_rust::{
    SessionConfig, SessionContext, TodoItem, TodoListener,
};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// TodoList CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "todolist-cli")]
#[command(about = "TodoList CLI 客户端 - 用于测试和展示数据同步功能", long_about = None)]
struct Args {
    /// 强制本地模式（忽略已持久化的登录状态）
    #[arg(long)]
    local: bool,

    /// 登录邮箱（与 --password 一起使用）
    #[arg(short, long)]
    email: Option<String>,

    /// 登录密码
    #[arg(short, long)]
    password: Option<String>,

    /// 昵称（登录 / 注册时使用）
    #[arg(short, long, default_value = "")]
    name: String,

    /// 注册新账户（创建账户后轮询邮箱验证结果）
    #[arg(long)]
    register: bool,

    /// 新增一条待办
    #[arg(long)]
    add: Option<String>,

    /// 新增待办的地点备注
    #[arg(long, default_value = "")]
    location: String,

    /// 将指定 id 的待办标记为完成
    #[arg(long)]
    complete: Option<String>,

    /// 删除指定 id 的待办
    #[arg(long)]
    remove: Option<String>,

    /// 提交一条反馈（需要登录）
    #[arg(long)]
    feedback: Option<String>,

    /// 设置深色模式
    #[arg(long)]
    dark_mode: Option<bool>,

    /// 设置字号（10-30 pt）
    #[arg(long)]
    text_size: Option<f64>,

    /// 设置界面语言（ko / ja / en）
    #[arg(long)]
    language: Option<String>,

    /// HTTP API 基础地址
    #[arg(long, default_value = "http://localhost:10002")]
    api_base_url: String,

    /// watch 通道 WebSocket 地址
    #[arg(long, default_value = "ws://localhost:10001")]
    ws_url: String,

    /// 本地 SQLite 数据库 URL
    #[arg(long, default_value = "sqlite://todolist.db?mode=rwc")]
    db_url: String,

    /// 认证 token（可选）
    #[arg(long, default_value = "")]
    token: String,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,todolist_sdk_core_rust=debug）
    #[arg(long, default_value = "info,todolist_sdk_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 监听器：打印所有收到的推送
struct CliTodoListener;

#[async_trait::async_trait]
impl TodoListener for CliTodoListener {
    async fn on_todos_changed(&self, todos: Vec<TodoItem>) {
        info!("[CLI/Todo] 🔄 列表变更，共 {} 条", todos.len());
        for todo in todos.iter() {
            print_todo(todo);
        }
    }

    async fn on_watch_failed(&self, reason: String) {
        error!("[CLI/Todo] ❌ watch 订阅中断: {}", reason);
    }
}

fn print_todo(todo: &TodoItem) {
    let mark = if todo.is_completed { "✅" } else { "⬜" };
    let location = if todo.location.is_empty() {
        String::new()
    } else {
        format!(" @{}", todo.location)
    };
    info!(
        "[CLI]   {} {}{} (id={}, ts={})",
        mark,
        todo.task,
        location,
        todo.id.raw(),
        todo.timestamp
    );
}

fn find_by_id<'a>(todos: &'a [TodoItem], raw_id: &str) -> Option<&'a TodoItem> {
    todos.iter().find(|t| t.id.raw() == raw_id)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level);

    info!("[CLI] 🚀 TodoList CLI 客户端（测试模式）");
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let config = SessionConfig {
        api_base_url: args.api_base_url.clone(),
        ws_url: args.ws_url.clone(),
        db_url: args.db_url.clone(),
        token: args.token.clone(),
        compression: "gzip".to_string(),
    };

    let session = SessionContext::connect(config, Arc::new(CliTodoListener)).await?;

    if args.local {
        // 显式要求本地模式：丢弃持久化的登录身份
        session.sign_out().await?;
        info!("[CLI] 📴 本地模式");
    } else if args.register {
        let (Some(email), Some(password)) = (args.email.as_deref(), args.password.as_deref())
        else {
            return Err(anyhow::anyhow!("注册需要 --email 和 --password"));
        };
        validate::validate_name(&args.name)?;
        validate::validate_email(email)?;
        validate::validate_password(password)?;

        let flow = session
            .begin_registration(&args.name, email, password)
            .await?;
        info!(
            "[CLI] ✉️ 验证邮件已发送，请在 {} 秒内完成验证",
            flow.remaining_secs()
        );

        // 轮询验证结果，直到通过或超时
        loop {
            sleep(Duration::from_secs(5)).await;
            match session.confirm_verification(&flow).await {
                Ok(()) => {
                    info!("[CLI] ✅ 注册完成并已登录");
                    break;
                }
                Err(e) if flow.is_expired() => {
                    return Err(anyhow::anyhow!("邮箱验证超时: {}", e));
                }
                Err(e) => {
                    info!(
                        "[CLI] ⏳ 尚未完成验证（剩余 {} 秒）: {}",
                        flow.remaining_secs(),
                        e
                    );
                }
            }
        }
    } else if let (Some(email), Some(password)) = (args.email.as_deref(), args.password.as_deref())
    {
        validate::validate_email(email)?;
        session.sign_in(&args.name, email, password).await?;
        info!("[CLI] ✅ 登录成功: {}", email);
    } else {
        info!("[CLI] 按持久化状态恢复身份: {}", session.current().await);
    }

    // 偏好设置
    if args.dark_mode.is_some() || args.text_size.is_some() || args.language.is_some() {
        let dao = PreferencesDao::new(Arc::new({
            // 偏好与登录状态共用同一个本地库
            let pool = todolist_sdk_core_rust::todolist::db::create_sqlite_pool(&args.db_url)
                .await?;
            let kv = todolist_sdk_core_rust::todolist::kv::SqliteKvStore::new(pool);
            kv.init_db().await?;
            kv
        }));
        let mut prefs = dao.load().await;
        if let Some(dark) = args.dark_mode {
            prefs.is_dark_mode = dark;
        }
        if let Some(size) = args.text_size {
            if size < TEXT_SIZE_RANGE.0 || size > TEXT_SIZE_RANGE.1 {
                return Err(anyhow::anyhow!(
                    "字号超出范围 {}-{} pt",
                    TEXT_SIZE_RANGE.0,
                    TEXT_SIZE_RANGE.1
                ));
            }
            prefs.text_size = size;
        }
        if let Some(lang) = &args.language {
            if !SUPPORTED_LANGUAGES.iter().any(|(code, _)| *code == lang.as_str()) {
                return Err(anyhow::anyhow!("不支持的语言: {}", lang));
            }
            prefs.language = lang.clone();
        }
        dao.save(&prefs).await?;
        info!("[CLI] ⚙️ 偏好设置已保存: {:?}", prefs);
    }

    let store = session.todo_store().await;
    let todos = store.load().await?;
    info!("[CLI] 📋 待办列表（共 {} 条）:", todos.len());
    for todo in todos.iter() {
        print_todo(todo);
    }

    if let Some(task) = &args.add {
        validate::validate_task_title(task)?;
        validate::validate_location(&args.location)?;
        let item = store.add(task, &args.location).await?;
        info!("[CLI] ➕ 已新增: {} (id={})", item.task, item.id.raw());
    }

    if let Some(id) = &args.complete {
        let todos = store.load().await?;
        match find_by_id(&todos, id) {
            Some(item) => {
                store.set_completed(item, true).await?;
                info!("[CLI] ✅ 已标记完成: {}", item.task);
            }
            None => warn!("[CLI] ⚠️ 未找到待办: {}", id),
        }
    }

    if let Some(id) = &args.remove {
        let todos = store.load().await?;
        match find_by_id(&todos, id) {
            Some(item) => {
                store.remove(item).await?;
                info!("[CLI] 🗑️ 已删除: {}", item.task);
            }
            None => warn!("[CLI] ⚠️ 未找到待办: {}", id),
        }
    }

    if let Some(text) = &args.feedback {
        let identity = session.current().await;
        let Some(email) = identity.email().map(|e| e.to_string()) else {
            return Err(anyhow::anyhow!("提交反馈需要先登录"));
        };
        validate::validate_feedback(text)?;
        let feedback_api =
            HttpFeedbackApi::new(reqwest::Client::new(), args.api_base_url.clone());
        feedback_api.submit_feedback(&email, text).await?;
        info!("[CLI] 📨 反馈已提交");
    }

    if session.current().await.is_remote() {
        info!("[CLI] 📥 持续监听远端推送（Ctrl+C 退出）");
    }

    if args.duration > 0 {
        sleep(Duration::from_secs(args.duration)).await;
        info!("[CLI] ⏱️ 运行时长已到，退出");
    } else {
        loop {
            sleep(Duration::from_secs(3600)).await;
        }
    }

    store.close();
    Ok(())
}
