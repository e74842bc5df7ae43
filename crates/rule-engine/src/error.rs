//! 规则引擎错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则格式错误: code={code}, {reason}")]
    MalformedRule { code: String, reason: String },

    #[error("条件解析失败: {0}")]
    ParseError(String),

    #[error("无效的取值: {0}")]
    InvalidValue(String),

    #[error("规则存储不可用: {0}")]
    StoreUnavailable(String),

    #[error("内容适配器失败: {adapter} - {reason}")]
    AdapterFailure { adapter: String, reason: String },

    #[error("缓存后端错误: {0}")]
    CacheBackend(String),

    #[error("规则评估失败: {0}")]
    Evaluation(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl RuleError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRule { .. } => "MALFORMED_RULE",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::InvalidValue(_) => "INVALID_VALUE",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::AdapterFailure { .. } => "ADAPTER_FAILURE",
            Self::CacheBackend(_) => "CACHE_BACKEND_FAILURE",
            Self::Evaluation(_) => "EVALUATOR_ERROR",
            Self::JsonError(_) => "JSON_ERROR",
        }
    }

    /// 是否可在下一周期重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::CacheBackend(_))
    }
}

impl From<sqlx::Error> for RuleError {
    fn from(err: sqlx::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}

impl From<natal_shared::error::NatalError> for RuleError {
    fn from(err: natal_shared::error::NatalError) -> Self {
        use natal_shared::error::NatalError;
        match err {
            NatalError::Database(e) => Self::StoreUnavailable(e.to_string()),
            other => Self::CacheBackend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
