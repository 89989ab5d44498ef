use super::{ResultStore, StoreError};
use crate::protocol::BatchResult;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::info;

/// Redis list holding the JSON-encoded batches of a test
pub fn results_key(test_id: &str) -> String {
    format!("test:{}:results", test_id)
}

/// Redis string set to "true" once the engine has written every batch
pub fn complete_key(test_id: &str) -> String {
    format!("test:{}:complete", test_id)
}

const COMPLETE_VALUE: &str = "true";

/// Result store backed by Redis, so several processes can share one log.
///
/// All commands go through a single multiplexed connection, which keeps a
/// writer's `RPUSH` ordered before its later `SET` of the completion flag.
#[derive(Clone)]
pub struct RedisResultStore {
    conn: MultiplexedConnection,
}

impl RedisResultStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis result store at {}", redis_url);
        Ok(Self { conn })
    }

    fn decode(test_id: &str, raw: &str) -> Result<BatchResult, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Corrupt {
            test_id: test_id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn append(&self, test_id: &str, batch: &BatchResult) -> Result<(), StoreError> {
        let payload = serde_json::to_string(batch)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(results_key(test_id), payload).await?;
        Ok(())
    }

    async fn len(&self, test_id: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(results_key(test_id)).await?;
        Ok(len)
    }

    async fn range(
        &self,
        test_id: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<BatchResult>, StoreError> {
        if from >= to {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        // LRANGE bounds are inclusive
        let raw: Vec<String> = conn
            .lrange(results_key(test_id), from as isize, (to - 1) as isize)
            .await?;
        raw.iter().map(|entry| Self::decode(test_id, entry)).collect()
    }

    async fn is_complete(&self, test_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let flag: Option<String> = conn.get(complete_key(test_id)).await?;
        Ok(flag.as_deref() == Some(COMPLETE_VALUE))
    }

    async fn mark_complete(&self, test_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(complete_key(test_id), COMPLETE_VALUE).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(results_key("abc"), "test:abc:results");
        assert_eq!(complete_key("abc"), "test:abc:complete");
    }

    #[test]
    fn test_decode_reports_corrupt_entries() {
        let err = RedisResultStore::decode("abc", "{not json").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref test_id, .. } if test_id == "abc"));
    }

    #[test]
    fn test_decode_accepts_stored_batches() {
        let raw = r#"{"test_id":"abc","batch_number":2,"results":[],"is_complete":false}"#;
        let batch = RedisResultStore::decode("abc", raw).unwrap();
        assert_eq!(batch.batch_number, 2);
    }

    // Live-server tests: `REDIS_URL=redis://localhost:6379/0 cargo test -- --ignored`

    async fn live_store() -> Option<RedisResultStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        Some(RedisResultStore::connect(&url).await.unwrap())
    }

    fn unique_id(name: &str) -> String {
        format!("{}-{}", name, uuid::Uuid::new_v4())
    }

    fn batch(test_id: &str, batch_number: u32) -> BatchResult {
        BatchResult {
            test_id: test_id.to_string(),
            batch_number,
            results: Vec::new(),
            is_complete: false,
        }
    }

    async fn cleanup(store: &RedisResultStore, test_id: &str) {
        let mut conn = store.conn.clone();
        let _: () = conn
            .del(vec![results_key(test_id), complete_key(test_id)])
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_unknown_test_is_empty_and_incomplete() {
        let Some(store) = live_store().await else {
            return;
        };
        let test_id = unique_id("missing");

        assert_eq!(store.len(&test_id).await.unwrap(), 0);
        assert!(store.range(&test_id, 0, 10).await.unwrap().is_empty());
        assert!(!store.is_complete(&test_id).await.unwrap());
        store.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_append_preserves_order() {
        let Some(store) = live_store().await else {
            return;
        };
        let test_id = unique_id("order");
        for n in 1..=4 {
            store.append(&test_id, &batch(&test_id, n)).await.unwrap();
        }

        assert_eq!(store.len(&test_id).await.unwrap(), 4);
        let numbers: Vec<u32> = store
            .all(&test_id)
            .await
            .unwrap()
            .iter()
            .map(|b| b.batch_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        // Half-open: [2, 4) is the third and fourth batch only
        let delta = store.range(&test_id, 2, 4).await.unwrap();
        let numbers: Vec<u32> = delta.iter().map(|b| b.batch_number).collect();
        assert_eq!(numbers, vec![3, 4]);
        let single = store.range(&test_id, 1, 2).await.unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].batch_number, 2);

        assert!(!store.is_complete(&test_id).await.unwrap());
        store.mark_complete(&test_id).await.unwrap();
        assert!(store.is_complete(&test_id).await.unwrap());

        cleanup(&store, &test_id).await;
    }

    #[tokio::test]
    #[ignore = "needs a Redis server at REDIS_URL"]
    async fn test_redis_range_clamps_bounds() {
        let Some(store) = live_store().await else {
            return;
        };
        let test_id = unique_id("clamp");
        store.append(&test_id, &batch(&test_id, 1)).await.unwrap();

        assert_eq!(store.range(&test_id, 0, 100).await.unwrap().len(), 1);
        assert!(store.range(&test_id, 5, 9).await.unwrap().is_empty());
        assert!(store.range(&test_id, 1, 0).await.unwrap().is_empty());

        cleanup(&store, &test_id).await;
    }
}
