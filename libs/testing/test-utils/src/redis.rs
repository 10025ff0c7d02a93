//! Redis test infrastructure
//!
//! Provides a `TestRedis` helper that creates a Redis container for testing.

use redis::Client;
use redis::aio::MultiplexedConnection;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::redis::Redis;

/// Test Redis wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestRedis;
/// use redis::AsyncCommands;
///
/// # async fn example() {
/// let redis = TestRedis::new().await;
/// let mut conn = redis.connection();
///
/// // Use Redis in your tests
/// conn.set::<_, _, ()>("key", "value").await.unwrap();
/// let value: String = conn.get("key").await.unwrap();
/// assert_eq!(value, "value");
/// # }
/// ```
pub struct TestRedis {
    #[allow(dead_code)]
    container: ContainerAsync<Redis>,
    connection: MultiplexedConnection,
    pub connection_string: String,
}

impl TestRedis {
    /// Create a new test Redis instance
    ///
    /// Uses Redis 8 Alpine image by default.
    pub async fn new() -> Self {
        // Use Redis 8 Alpine (latest stable, lightweight)
        let redis_image = Redis::default().with_tag("8-alpine");

        let container = redis_image
            .start()
            .await
            .expect("Failed to start Redis container");

        let host_port = container
            .get_host_port_ipv4(6379)
            .await
            .expect("Failed to get Redis port");

        let connection_string = format!("redis://127.0.0.1:{}", host_port);

        let client =
            Client::open(connection_string.clone()).expect("Failed to create Redis client");

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .expect("Failed to connect to Redis");

        tracing::info!(port = host_port, "Test Redis ready (Redis 8-alpine)");

        Self {
            container,
            connection,
            connection_string,
        }
    }

    /// Get a cloned connection (useful for passing to services)
    pub fn connection(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    /// Get the connection string for manual client creation
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Build a `ConnectionManager` for code paths that require one
    pub async fn connection_manager(&self) -> redis::aio::ConnectionManager {
        let client =
            Client::open(self.connection_string.clone()).expect("Failed to create Redis client");
        redis::aio::ConnectionManager::new(client)
            .await
            .expect("Failed to create connection manager")
    }
}

// Container is automatically cleaned up when TestRedis is dropped
impl Drop for TestRedis {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test Redis container");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::AsyncCommands;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_set_get() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        // Set a value
        conn.set::<_, _, ()>("test_key", "test_value")
            .await
            .unwrap();

        // Get it back
        let value: String = conn.get("test_key").await.unwrap();
        assert_eq!(value, "test_value");
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_redis_stream_append() {
        let redis = TestRedis::new().await;
        let mut conn = redis.connection();

        let id: String = conn
            .xadd("test_stream", "*", &[("field", "value")])
            .await
            .unwrap();
        assert!(id.contains('-'));

        let len: i64 = conn.xlen("test_stream").await.unwrap();
        assert_eq!(len, 1);
    }
}
