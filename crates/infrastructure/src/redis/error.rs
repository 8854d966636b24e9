//! Redis 错误类型定义

use application::ApplicationError;
use thiserror::Error;

/// Redis 操作错误
#[derive(Error, Debug)]
pub enum RedisError {
    /// 连接错误
    #[error("Redis 连接错误: {0}")]
    Connection(#[source] redis::RedisError),

    /// 命令执行错误
    #[error("Redis 命令错误: {0}")]
    Command(#[source] redis::RedisError),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 存储里的数据无法解析
    #[error("无效数据 {key}: {message}")]
    InvalidData { key: String, message: String },
}

/// Redis 结果类型
pub type RedisResult<T> = Result<T, RedisError>;

impl RedisError {
    pub fn invalid_data(key: impl Into<String>, message: impl Into<String>) -> Self {
        RedisError::InvalidData {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for RedisError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            RedisError::Connection(err)
        } else {
            RedisError::Command(err)
        }
    }
}

impl From<RedisError> for ApplicationError {
    fn from(err: RedisError) -> Self {
        match err {
            RedisError::InvalidData { key, message } => ApplicationError::corrupt_data(key, message),
            other => ApplicationError::infrastructure_with_source("redis operation failed", other),
        }
    }
}

/// 把分数（Redis 以浮点返回）转回秒级时间戳
pub(crate) fn score_to_i64(key: &str, score: f64) -> RedisResult<i64> {
    if score.is_finite() {
        Ok(score as i64)
    } else {
        Err(RedisError::invalid_data(key, format!("non-finite score {score}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_conversion() {
        assert_eq!(score_to_i64("k", 1_700_000_000.0).unwrap(), 1_700_000_000);
        assert!(score_to_i64("k", f64::INFINITY).is_err());
    }

    #[test]
    fn malformed_member_is_not_retried() {
        let err: ApplicationError = RedisError::invalid_data("feed:global", "bad member").into();
        assert!(matches!(err, ApplicationError::CorruptData { ref location, .. } if location == "feed:global"));
        assert!(!err.is_transient());
    }

    #[test]
    fn command_failure_stays_transient() {
        let err: ApplicationError = RedisError::Serialization(
            serde_json::from_str::<u8>("x").unwrap_err(),
        )
        .into();
        assert!(err.is_transient());
    }
}
