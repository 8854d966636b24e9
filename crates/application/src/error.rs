use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("infrastructure error: {message}")]
    Infrastructure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    #[error("operation timed out: {operation}")]
    Timeout { operation: &'static str },
    #[error("dispatch error: {0}")]
    Dispatch(String),
    /// 存储里的数据无法解析，重试不会改变结果
    #[error("corrupt data in {location}: {message}")]
    CorruptData { location: String, message: String },
}

impl ApplicationError {
    /// 创建基础设施错误
    pub fn infrastructure(message: impl Into<String>) -> Self {
        ApplicationError::Infrastructure {
            message: message.into(),
            source: None,
        }
    }

    pub fn infrastructure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApplicationError::Infrastructure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn corrupt_data(location: impl Into<String>, message: impl Into<String>) -> Self {
        ApplicationError::CorruptData {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: &'static str) -> Self {
        ApplicationError::Timeout { operation }
    }

    /// 存储暂时不可用类错误，值得重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApplicationError::Infrastructure { .. }
                | ApplicationError::Timeout { .. }
                | ApplicationError::Repository(RepositoryError::Storage { .. })
        )
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

/// 给存储调用加上超时，超时折算成 `ApplicationError::Timeout`
pub async fn with_timeout<T, F>(
    operation: &'static str,
    limit: std::time::Duration,
    future: F,
) -> ApplicationResult<T>
where
    F: std::future::Future<Output = ApplicationResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(ApplicationError::timeout(operation)),
    }
}
