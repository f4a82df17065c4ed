use thiserror::Error;

/// 协调器错误类型定义
#[derive(Debug, Error)]
pub enum HarvesterError {
    #[error("数据库错误: {0}")]
    Database(sqlx::Error),

    #[error("存储不可用: {0}")]
    StorageUnavailable(String),

    #[error("Worker认证失败")]
    AuthFailure,

    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("服务 {service} 的标识符空间已耗尽")]
    IdSpaceExhausted { service: String },

    #[error("未知的短链接服务: {0}")]
    UnknownService(String),

    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl HarvesterError {
    /// 调用方可以稍后重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvesterError::StorageUnavailable(_))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        HarvesterError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HarvesterError::Internal(msg.into())
    }
}

impl From<sqlx::Error> for HarvesterError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // 连接池耗尽或后端不可达，调用方可重试
            sqlx::Error::PoolTimedOut => {
                HarvesterError::StorageUnavailable("等待数据库连接超时".to_string())
            }
            sqlx::Error::PoolClosed => {
                HarvesterError::StorageUnavailable("数据库连接池已关闭".to_string())
            }
            sqlx::Error::Io(e) => HarvesterError::StorageUnavailable(format!("数据库IO错误: {e}")),
            other => HarvesterError::Database(other),
        }
    }
}

impl From<serde_json::Error> for HarvesterError {
    fn from(err: serde_json::Error) -> Self {
        HarvesterError::Serialization(err.to_string())
    }
}

/// 统一的Result类型
pub type HarvesterResult<T> = std::result::Result<T, HarvesterError>;
