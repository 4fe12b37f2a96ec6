use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};

use pesto_auth::{AppState, cache::store, config::Config, router::create_router, telemetry};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        environment = %config.environment,
        backend = ?config.backend,
        "Starting pesto-auth {}",
        env!("CARGO_PKG_VERSION")
    );

    let reporter = telemetry::reporter_from_config(&config);

    // 连接存储后端
    let kv = store::connect(&config)
        .await
        .expect("Failed to connect to key-value store");

    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    let grace = config.shutdown_grace();

    // 设置应用状态和后台计数 worker
    let (state, workers) = AppState::start(config, kv, reporter);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    tracing::info!("listening on {}", addr);

    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = signalled_tx.send(true);
        })
        .into_future();

    // 收到信号后最多等待 grace，超时强制关闭仍在处理的连接
    let grace_elapsed = async move {
        if signalled_rx.wait_for(|signalled| *signalled).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("server error: {}", e);
            }
        }
        _ = grace_elapsed => {
            tracing::warn!(?grace, "in-flight requests did not finish in time, closing");
        }
    }

    // 路由已释放，队列提交端随之关闭，worker 处理完剩余任务后退出
    let abandoned = workers.shutdown(grace).await;
    if abandoned > 0 {
        tracing::warn!(abandoned, "increment workers abandoned during shutdown");
    }

    tracing::info!("pesto-auth stopped");
}

/// 等待 Ctrl+C 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
