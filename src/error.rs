use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

// 客户端 SDK 依赖以下文本区分错误类型，修改会破坏兼容性
pub const MSG_TOKEN_MISSING: &str = "Token must be supplied";
pub const MSG_TOKEN_NOT_REGISTERED: &str = "Token not registered";
pub const MSG_TOKEN_REVOKED: &str = "Token has been revoked";
pub const MSG_MONTHLY_LIMIT_EXCEEDED: &str = "Monthly limit exceeded";
pub const MSG_METHOD_NOT_ALLOWED: &str = "Method not allowed";

/// 网关请求的终止原因
#[derive(Debug)]
pub enum AppError {
    MethodNotAllowed,
    MissingToken,
    TokenNotRegistered,
    TokenRevoked,
    MonthlyLimitExceeded,
    /// 后端故障，消息原样返回以便排查
    Internal(String),
}

/// 统一的错误响应体
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::MissingToken | AppError::TokenNotRegistered | AppError::TokenRevoked => {
                StatusCode::UNAUTHORIZED
            }
            AppError::MonthlyLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::MethodNotAllowed => MSG_METHOD_NOT_ALLOWED,
            AppError::MissingToken => MSG_TOKEN_MISSING,
            AppError::TokenNotRegistered => MSG_TOKEN_NOT_REGISTERED,
            AppError::TokenRevoked => MSG_TOKEN_REVOKED,
            AppError::MonthlyLimitExceeded => MSG_MONTHLY_LIMIT_EXCEEDED,
            AppError::Internal(message) => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            message: self.message().to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(AppError::MissingToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::TokenRevoked.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::MonthlyLimitExceeded.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_envelope_shape() {
        let body = serde_json::to_string(&ErrorResponse {
            message: AppError::TokenNotRegistered.message().to_string(),
        })
        .unwrap();
        assert_eq!(body, r#"{"message":"Token not registered"}"#);
    }
}
