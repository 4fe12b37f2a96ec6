use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode},
};

use crate::{
    AppState,
    cache::{
        Deadline,
        operations::{QuotaDecision, TokenError},
    },
    error::AppError,
};

/// 携带令牌的请求头
pub const TOKEN_HEADER: &str = "X-Pesto-Token";

/// 令牌校验入口
///
/// 依次检查请求方法、令牌是否提供、是否注册、是否吊销以及月度额度，
/// 任一环节失败即终止，不做重试。放行后的计数由后台 worker 完成，不阻塞响应。
/// 令牌和计数器的读取共用一个截止时间。
#[axum::debug_handler]
pub async fn authenticate(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    if method != Method::GET {
        return Err(AppError::MethodNotAllowed);
    }

    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or(AppError::MissingToken)?;

    let deadline = Deadline::after(state.config.store_timeout());

    let record = match state.tokens.resolve(token, &deadline).await {
        Ok(record) => record,
        Err(TokenError::NotRegistered) => return Err(AppError::TokenNotRegistered),
        Err(err) => {
            let kind = match &err {
                TokenError::Malformed(_) => "malformed_record",
                _ => "store_failure",
            };
            tracing::error!(kind, error = %err, "failed to resolve token");
            state
                .telemetry
                .capture("authenticate.acquire_token_value", &err);
            return Err(AppError::Internal(err.to_string()));
        }
    };

    if record.revoked {
        tracing::debug!(owner = %record.user_email, "revoked token presented");
        return Err(AppError::TokenRevoked);
    }

    match state
        .quota
        .check_and_reserve(&record.user_email, record.monthly_limit, &deadline)
        .await
    {
        Ok(QuotaDecision::Accepted { current }) => {
            tracing::debug!(owner = %record.user_email, current, "request accepted");
            Ok(StatusCode::OK)
        }
        Ok(QuotaDecision::Exceeded { current, limit }) => {
            tracing::info!(owner = %record.user_email, current, limit, "monthly limit exceeded");
            Err(AppError::MonthlyLimitExceeded)
        }
        Err(err) => {
            tracing::error!(owner = %record.user_email, error = %err, "failed to check monthly limit");
            state
                .telemetry
                .capture("authenticate.acquire_counter_limit", &err);
            Err(AppError::Internal(err.to_string()))
        }
    }
}
