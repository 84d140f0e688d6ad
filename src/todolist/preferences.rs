//! 本地应用偏好设置
//!
//! 深色模式、通知开关、字号、界面语言。整体作为一个 JSON blob 存放在
//! 本地键值存储的 `settings` key 下，损坏时回退到默认值。

use crate::todolist::kv::KvStore;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// 偏好设置在本地键值存储中的 key
pub const SETTINGS_KEY: &str = "settings";

/// 支持的界面语言（代码，显示名）
pub const SUPPORTED_LANGUAGES: [(&str, &str); 3] =
    [("ko", "한국어"), ("ja", "日本語"), ("en", "English")];

/// 字号可调范围（pt）
pub const TEXT_SIZE_RANGE: (f64, f64) = (10.0, 30.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub is_dark_mode: bool,
    pub notifications_enabled: bool,
    pub text_size: f64,
    pub language: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            is_dark_mode: false,
            notifications_enabled: true,
            text_size: 14.0,
            language: "ko".to_string(),
        }
    }
}

/// 偏好设置 DAO
pub struct PreferencesDao {
    kv: Arc<dyn KvStore>,
}

impl PreferencesDao {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// 读取偏好设置，缺失或损坏时返回默认值
    pub async fn load(&self) -> Preferences {
        let bytes = match self.kv.get(SETTINGS_KEY).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Preferences::default(),
            Err(e) => {
                warn!("[Prefs] 读取偏好设置失败，使用默认值: {:?}", e);
                return Preferences::default();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!("[Prefs] 偏好设置解析失败，使用默认值: {:?}", e);
                Preferences::default()
            }
        }
    }

    pub async fn save(&self, prefs: &Preferences) -> Result<()> {
        let bytes = serde_json::to_vec(prefs).context("序列化偏好设置失败")?;
        self.kv
            .set(SETTINGS_KEY, &bytes)
            .await
            .context("持久化偏好设置失败")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::todolist::kv::MemoryKvStore;

    #[tokio::test]
    async fn missing_settings_yield_defaults() {
        let dao = PreferencesDao::new(Arc::new(MemoryKvStore::new()));
        let prefs = dao.load().await;
        assert_eq!(prefs, Preferences::default());
        assert!(!prefs.is_dark_mode);
        assert!(prefs.notifications_enabled);
        assert_eq!(prefs.text_size, 14.0);
        assert_eq!(prefs.language, "ko");
    }

    #[tokio::test]
    async fn settings_roundtrip() {
        let kv = Arc::new(MemoryKvStore::new());
        let dao = PreferencesDao::new(kv.clone());

        let prefs = Preferences {
            is_dark_mode: true,
            notifications_enabled: false,
            text_size: 22.0,
            language: "ja".to_string(),
        };
        dao.save(&prefs).await.unwrap();

        let other = PreferencesDao::new(kv);
        assert_eq!(other.load().await, prefs);
    }

    #[tokio::test]
    async fn corrupt_settings_fall_back_to_defaults() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(SETTINGS_KEY, b"{{{broken").await.unwrap();
        let dao = PreferencesDao::new(kv);
        assert_eq!(dao.load().await, Preferences::default());
    }
}
