//! 本地存档与 watch 通道的序列化工具
//!
//! 本地 blob 与原始 App 的存档格式对齐：JSON 数组、camelCase、毫秒时间戳，
//! 顺序保持写入时的顺序。watch 通道的入站帧沿用 gzip 压缩 +
//! base64 data 字段的约定。

use crate::todolist::types::{StoredTodo, TodoItem};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;

/// 将待办列表编码为本地 blob（保持传入顺序）
pub fn encode_todos(items: &[TodoItem]) -> Result<Vec<u8>> {
    let stored: Vec<StoredTodo> = items.iter().map(StoredTodo::from).collect();
    serde_json::to_vec(&stored).context("序列化本地待办列表失败")
}

/// 从本地 blob 解码待办列表
///
/// 任一条目缺失 id 或 JSON 损坏都视为整个 blob 损坏，由调用方决定兜底策略。
pub fn decode_todos(bytes: &[u8]) -> Result<Vec<TodoItem>> {
    let stored: Vec<StoredTodo> =
        serde_json::from_slice(bytes).context("反序列化本地待办列表失败")?;
    stored
        .into_iter()
        .map(TodoItem::try_from)
        .collect::<Result<Vec<_>>>()
        .context("本地待办条目 id 校验失败")
}

/// Base64 反序列化函数（支持 null 值）
pub fn deserialize_base64<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use base64::Engine;
    // 先尝试反序列化为 Option<String>，以支持 null 值
    let opt_s: Option<String> = Deserialize::deserialize(deserializer)?;
    let s = match opt_s {
        Some(s) => s,
        None => return Ok(Vec::new()),
    };
    if s.is_empty() {
        return Ok(Vec::new());
    }
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(serde::de::Error::custom)
}

/// 解压 gzip 数据（watch 入站帧）
pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
