use axum::{
    Router,
    routing::{any, get},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{AppState, middleware::log_errors, routes};

/// 创建主路由
///
/// `/` 接受任意方法，由处理函数自己返回 405 和统一的错误响应体。
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(routes::auth::authenticate))
        .route("/healthz", get(routes::health::healthz))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(log_errors)),
        )
        .with_state(state)
}
