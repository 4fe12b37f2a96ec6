//! 客户端 SDK 的错误约定
//!
//! SDK 通过 `(状态码, message)` 判断错误类型，message 文本本身就是协议的一部分。
//! 这里把映射规则固定下来，和网关使用同一组常量。

use serde::Deserialize;
use thiserror::Error;

use crate::error::{
    MSG_MONTHLY_LIMIT_EXCEEDED, MSG_TOKEN_MISSING, MSG_TOKEN_NOT_REGISTERED, MSG_TOKEN_REVOKED,
};

/// 运行时接口返回，共用同一套错误处理
pub const MSG_RUNTIME_NOT_FOUND: &str = "Runtime not found";
pub const MSG_MISSING_PARAMETERS_PREFIX: &str = "Missing parameters";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("missing token")]
    MissingToken,

    #[error("token not registered")]
    TokenNotRegistered,

    #[error("token revoked")]
    TokenRevoked,

    #[error("monthly limit exceeded")]
    MonthlyLimitExceeded,

    #[error("server rate limited")]
    ServerRateLimited,

    #[error("internal server error: {0}")]
    InternalServerError(String),

    #[error("runtime not found")]
    RuntimeNotFound,

    #[error("missing parameters: {0}")]
    MissingParameters(String),

    #[error("api path not found")]
    NotFound,

    #[error("received code {status}: {message}")]
    Unexpected { status: u16, message: String },
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl ApiError {
    /// 从响应体解析 message；非 JSON 响应按空 message 处理
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let body: ErrorBody = serde_json::from_slice(body).unwrap_or_default();
        Self::classify(status, &body.message)
    }

    pub fn classify(status: u16, message: &str) -> Self {
        match (status, message) {
            (401, MSG_TOKEN_MISSING) => ApiError::MissingToken,
            (401, MSG_TOKEN_NOT_REGISTERED) => ApiError::TokenNotRegistered,
            (401, MSG_TOKEN_REVOKED) => ApiError::TokenRevoked,
            (429, MSG_MONTHLY_LIMIT_EXCEEDED) => ApiError::MonthlyLimitExceeded,
            (429, _) => ApiError::ServerRateLimited,
            (500, _) => ApiError::InternalServerError(message.to_string()),
            (400, MSG_RUNTIME_NOT_FOUND) => ApiError::RuntimeNotFound,
            (400, m) if m.starts_with(MSG_MISSING_PARAMETERS_PREFIX) => {
                ApiError::MissingParameters(m.to_string())
            }
            (404, _) => ApiError::NotFound,
            _ => ApiError::Unexpected {
                status,
                message: message.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_messages() {
        assert_eq!(ApiError::classify(401, "Token must be supplied"), ApiError::MissingToken);
        assert_eq!(
            ApiError::classify(401, "Token not registered"),
            ApiError::TokenNotRegistered
        );
        assert_eq!(
            ApiError::classify(401, "Token has been revoked"),
            ApiError::TokenRevoked
        );
        // 文本必须完全一致
        assert!(matches!(
            ApiError::classify(401, "token not registered"),
            ApiError::Unexpected { status: 401, .. }
        ));
    }

    #[test]
    fn test_rate_limit_messages() {
        assert_eq!(
            ApiError::classify(429, "Monthly limit exceeded"),
            ApiError::MonthlyLimitExceeded
        );
        assert_eq!(ApiError::classify(429, "slow down"), ApiError::ServerRateLimited);
        assert_eq!(ApiError::classify(429, ""), ApiError::ServerRateLimited);
    }

    #[test]
    fn test_other_statuses() {
        assert_eq!(
            ApiError::classify(500, "redis: connection refused"),
            ApiError::InternalServerError("redis: connection refused".to_string())
        );
        assert_eq!(ApiError::classify(400, "Runtime not found"), ApiError::RuntimeNotFound);
        assert_eq!(
            ApiError::classify(400, "Missing parameters: code"),
            ApiError::MissingParameters("Missing parameters: code".to_string())
        );
        assert_eq!(ApiError::classify(404, ""), ApiError::NotFound);
        assert!(matches!(
            ApiError::classify(418, "teapot"),
            ApiError::Unexpected { status: 418, .. }
        ));
    }

    #[test]
    fn test_from_response_body() {
        assert_eq!(
            ApiError::from_response(401, br#"{"message":"Token has been revoked"}"#),
            ApiError::TokenRevoked
        );
        assert_eq!(
            ApiError::from_response(429, b"plain text body"),
            ApiError::ServerRateLimited
        );
    }
}
