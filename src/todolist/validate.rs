//! 表单输入校验
//!
//! 存储层不做业务校验，所有限制在进入 store 之前由调用方（UI / CLI）
//! 通过本模块检查。长度按字符计（与移动端输入框一致），不按字节计。

use anyhow::{bail, Result};
use regex::Regex;
use std::sync::LazyLock;

/// 标题 / 地点最大长度
pub const MAX_TASK_LEN: usize = 30;
/// 昵称最大长度
pub const MAX_NAME_LEN: usize = 20;
/// 反馈内容最大长度
pub const MAX_FEEDBACK_LEN: usize = 100;
/// 密码最小长度
pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("邮箱正则必须可编译")
});

pub fn is_valid_email(email: &str) -> bool {
    email.chars().count() >= 5 && EMAIL_RE.is_match(email)
}

pub fn validate_email(email: &str) -> Result<()> {
    if !is_valid_email(email) {
        bail!("邮箱格式不正确: {}", email);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        bail!("密码长度不足 {} 位", MIN_PASSWORD_LEN);
    }
    Ok(())
}

pub fn validate_task_title(task: &str) -> Result<()> {
    if task.is_empty() {
        bail!("待办标题不能为空");
    }
    if task.chars().count() > MAX_TASK_LEN {
        bail!("待办标题超过 {} 字符", MAX_TASK_LEN);
    }
    Ok(())
}

pub fn validate_location(location: &str) -> Result<()> {
    if location.chars().count() > MAX_TASK_LEN {
        bail!("地点超过 {} 字符", MAX_TASK_LEN);
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 {
        bail!("昵称不能为空");
    }
    if len > MAX_NAME_LEN {
        bail!("昵称超过 {} 字符", MAX_NAME_LEN);
    }
    Ok(())
}

pub fn validate_feedback(feedback: &str) -> Result<()> {
    if feedback.is_empty() {
        bail!("反馈内容不能为空");
    }
    if feedback.chars().count() > MAX_FEEDBACK_LEN {
        bail!("反馈内容超过 {} 字符", MAX_FEEDBACK_LEN);
    }
    Ok(())
}
