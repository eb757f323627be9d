use async_trait::async_trait;
use redis::AsyncCommands;

use campus_schedule_core::{Error, Result, store::KeyedStore};

/// Redis 存储实现
#[derive(Clone)]
pub struct RedisStore {
    connection: redis::aio::MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    /// 创建新的 Redis 存储实例
    pub async fn new(redis_url: &str, prefix: Option<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Store(format!("Failed to create Redis client: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Store(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or_else(|| "campus_schedule".to_string()),
        })
    }

    /// 构建带前缀的键
    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl KeyedStore for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.get::<_, Option<Vec<u8>>>(&full_key)
            .await
            .map_err(|e| Error::Store(format!("Failed to get Redis key: {}", e)))
    }

    async fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.set::<_, _, ()>(&full_key, value)
            .await
            .map_err(|e| Error::Store(format!("Failed to set Redis key: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.del::<_, ()>(&full_key)
            .await
            .map_err(|e| Error::Store(format!("Failed to delete Redis key: {}", e)))?;

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.build_key(key);
        let mut conn = self.connection.clone();

        conn.exists::<_, bool>(&full_key)
            .await
            .map_err(|e| Error::Store(format!("Failed to check Redis key existence: {}", e)))
    }
}
