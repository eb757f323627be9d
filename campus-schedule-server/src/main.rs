mod handlers;
mod server;
mod store;

use std::{env, sync::Arc};

use anyhow::Result;
use campus_schedule_core::clock::SystemClock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::store::RedisStore;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campus_schedule_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 获取Redis URL
    let redis_url = env::var("REDIS_URL")
        .map_err(|_| anyhow::anyhow!("REDIS_URL environment variable is required"))?;

    let store = match RedisStore::new(&redis_url, Some("campus-schedule".to_string())).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to connect to Redis: {}", e);
            return Err(e.into());
        }
    };

    // 启动服务器
    server::start_server(handlers::create_app(Arc::new(store), Arc::new(SystemClock))).await
}
