use super::{ResultStore, StoreError};
use crate::protocol::BatchResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct TestLog {
    batches: Vec<BatchResult>,
    complete: bool,
}

/// In-process result store. Entries live until the process exits.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    logs: RwLock<HashMap<String, TestLog>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn append(&self, test_id: &str, batch: &BatchResult) -> Result<(), StoreError> {
        let mut logs = self.logs.write().await;
        logs.entry(test_id.to_string())
            .or_default()
            .batches
            .push(batch.clone());
        Ok(())
    }

    async fn len(&self, test_id: &str) -> Result<usize, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.get(test_id).map_or(0, |log| log.batches.len()))
    }

    async fn range(
        &self,
        test_id: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<BatchResult>, StoreError> {
        let logs = self.logs.read().await;
        let Some(log) = logs.get(test_id) else {
            return Ok(Vec::new());
        };
        let to = to.min(log.batches.len());
        if from >= to {
            return Ok(Vec::new());
        }
        Ok(log.batches[from..to].to_vec())
    }

    async fn is_complete(&self, test_id: &str) -> Result<bool, StoreError> {
        let logs = self.logs.read().await;
        Ok(logs.get(test_id).is_some_and(|log| log.complete))
    }

    async fn mark_complete(&self, test_id: &str) -> Result<(), StoreError> {
        let mut logs = self.logs.write().await;
        logs.entry(test_id.to_string()).or_default().complete = true;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(test_id: &str, batch_number: u32) -> BatchResult {
        BatchResult {
            test_id: test_id.to_string(),
            batch_number,
            results: Vec::new(),
            is_complete: false,
        }
    }

    #[tokio::test]
    async fn test_unknown_test_is_empty_and_incomplete() {
        let store = MemoryResultStore::new();
        assert_eq!(store.len("missing").await.unwrap(), 0);
        assert!(store.range("missing", 0, 10).await.unwrap().is_empty());
        assert!(!store.is_complete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_preserves_order() {
        let store = MemoryResultStore::new();
        for n in 1..=4 {
            store.append("t", &batch("t", n)).await.unwrap();
        }

        assert_eq!(store.len("t").await.unwrap(), 4);
        let numbers: Vec<u32> = store
            .all("t")
            .await
            .unwrap()
            .iter()
            .map(|b| b.batch_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);

        let delta = store.range("t", 2, 4).await.unwrap();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].batch_number, 3);
    }

    #[tokio::test]
    async fn test_range_clamps_bounds() {
        let store = MemoryResultStore::new();
        store.append("t", &batch("t", 1)).await.unwrap();

        assert_eq!(store.range("t", 0, 100).await.unwrap().len(), 1);
        assert!(store.range("t", 5, 9).await.unwrap().is_empty());
        assert!(store.range("t", 1, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logs_are_isolated_per_test() {
        let store = MemoryResultStore::new();
        store.append("a", &batch("a", 1)).await.unwrap();
        store.mark_complete("a").await.unwrap();

        assert_eq!(store.len("b").await.unwrap(), 0);
        assert!(!store.is_complete("b").await.unwrap());
        assert!(store.is_complete("a").await.unwrap());
    }
}
