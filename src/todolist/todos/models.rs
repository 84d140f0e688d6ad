/// 待办存储配置
#[derive(Debug, Clone)]
pub struct TodoStoreConfig {
    /// HTTP API 基础地址
    pub api_base_url: String,
    /// watch 通道 WebSocket 地址
    pub ws_url: String,
    /// 认证 token（watch 连接与 HTTP 请求共用）
    pub token: String,
    /// 压缩方式，例如 "gzip" 或空字符串表示不压缩
    pub compression: String,
}
