//! 分页游标编解码
//!
//! 游标对客户端不透明：`{"t": <unix 秒>}` 的 JSON 再做 URL 安全 base64。
//! 解码容忍标准 base64 以及负载为 ISO 8601 时间串的旧格式（不带时区时按 UTC）；
//! 任何无法识别的输入都视为“从最新开始”，分页绝不因为坏游标失败。

use data_encoding::{BASE64, BASE64URL_NOPAD};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

#[derive(Serialize, Deserialize)]
struct CursorPayload {
    t: i64,
}

pub struct CursorCodec;

impl CursorCodec {
    pub fn encode(timestamp: i64) -> String {
        let payload = serde_json::json!({ "t": timestamp }).to_string();
        BASE64URL_NOPAD.encode(payload.as_bytes())
    }

    /// `None` 表示游标缺失或无效，调用方应从最新位置开始
    pub fn decode(cursor: Option<&str>) -> Option<i64> {
        let raw = cursor?.trim();
        if raw.is_empty() {
            return None;
        }
        let bytes = BASE64URL_NOPAD
            .decode(raw.as_bytes())
            .or_else(|_| BASE64.decode(raw.as_bytes()))
            .ok()?;

        if let Ok(payload) = serde_json::from_slice::<CursorPayload>(&bytes) {
            return Some(payload.t);
        }

        let text = std::str::from_utf8(&bytes).ok()?;
        parse_legacy_timestamp(text.trim())
    }
}

/// 旧游标直接编码时间串，多数不带时区偏移，按 UTC 解释
fn parse_legacy_timestamp(text: &str) -> Option<i64> {
    if let Ok(dt) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(dt.unix_timestamp());
    }
    PrimitiveDateTime::parse(text, &Iso8601::DEFAULT)
        .ok()
        .map(|dt| dt.assume_utc().unix_timestamp())
}
