// 错误类型定义
//
// 分层：校验错误（本地、发起网络请求前）、远程调用错误、致命配置错误。
// 批处理中的单项失败不是错误类型，而是以值的形式记录在各自的报告里。

use thiserror::Error;

/// 远程存储调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("网络错误: {0}")]
    Transport(String),

    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error("资源不存在: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RemoteError::Decode(e.to_string())
        } else {
            RemoteError::Transport(e.to_string())
        }
    }
}

/// 账本/迁移层的统一错误
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("校验失败: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("远程调用失败 ({operation}): {source}")]
    Remote {
        operation: String,
        #[source]
        source: RemoteError,
    },

    #[error("配置错误: {0}")]
    Config(String),

    #[error("操作已取消")]
    Cancelled,
}

impl LedgerError {
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn remote<O: Into<String>>(operation: O, source: RemoteError) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// 是否可以由用户直接重试（保存失败时提示“请重试”）
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message() {
        let err = LedgerError::validation("minutes", "时长不能少于 5 分钟");
        assert_eq!(err.to_string(), "校验失败: minutes: 时长不能少于 5 分钟");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_remote_is_retryable() {
        let err = LedgerError::remote(
            "create_page",
            RemoteError::Http {
                status: 429,
                body: "rate_limited".to_string(),
            },
        );
        assert!(err.is_retryable());
        assert!(err.to_string().contains("create_page"));
    }
}
