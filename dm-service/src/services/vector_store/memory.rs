//! In-process vector store using cosine similarity.

use super::{Passage, VectorRecord, VectorStore, VectorStoreError};
use crate::models::IndexName;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    indexes: RwLock<HashMap<IndexName, Vec<VectorRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, index: IndexName) -> usize {
        self.indexes
            .read()
            .await
            .get(&index)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Texts stored in an index, in insertion order.
    pub async fn texts(&self, index: IndexName) -> Vec<String> {
        self.indexes
            .read()
            .await
            .get(&index)
            .map(|records| records.iter().map(|r| r.text().to_string()).collect())
            .unwrap_or_default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn query(
        &self,
        index: IndexName,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Passage>, VectorStoreError> {
        let indexes = self.indexes.read().await;
        let Some(records) = indexes.get(&index) else {
            return Ok(Vec::new());
        };

        let mut passages: Vec<Passage> = records
            .iter()
            .map(|r| Passage::from_metadata(index, r.id.clone(), cosine(vector, &r.values), &r.metadata))
            .collect();
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        passages.truncate(top_k);
        Ok(passages)
    }

    async fn upsert(
        &self,
        index: IndexName,
        records: Vec<VectorRecord>,
    ) -> Result<usize, VectorStoreError> {
        let count = records.len();
        let mut indexes = self.indexes.write().await;
        let stored = indexes.entry(index).or_default();

        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => stored.push(record),
            }
        }
        Ok(count)
    }

    async fn clear(&self, index: IndexName) -> Result<(), VectorStoreError> {
        self.indexes.write().await.remove(&index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn query_ranks_by_cosine_similarity() {
        let store = MemoryStore::new();
        store
            .upsert(
                IndexName::Monsters,
                vec![
                    VectorRecord::new(vec![1.0, 0.0], "goblin"),
                    VectorRecord::new(vec![0.0, 1.0], "dragon"),
                    VectorRecord::new(vec![0.7, 0.7], "hobgoblin"),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(IndexName::Monsters, &[1.0, 0.1], 2).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["goblin", "hobgoblin"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn indexes_are_isolated() {
        let store = MemoryStore::new();
        store
            .upsert(IndexName::Rules, vec![VectorRecord::new(vec![1.0], "grapple")])
            .await
            .unwrap();

        assert!(store.query(IndexName::Monsters, &[1.0], 3).await.unwrap().is_empty());
        assert_eq!(store.len(IndexName::Rules).await, 1);
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemoryStore::new();
        let mut record = VectorRecord::new(vec![1.0], "old");
        store.upsert(IndexName::Rules, vec![record.clone()]).await.unwrap();

        record.metadata.insert("text".into(), "new".into());
        store.upsert(IndexName::Rules, vec![record]).await.unwrap();

        assert_eq!(store.texts(IndexName::Rules).await, vec!["new"]);
    }

    #[tokio::test]
    async fn clear_empties_only_that_index() {
        let store = MemoryStore::new();
        store
            .upsert(IndexName::CampaignHistory, vec![VectorRecord::new(vec![1.0], "turn")])
            .await
            .unwrap();
        store
            .upsert(IndexName::Rules, vec![VectorRecord::new(vec![1.0], "rule")])
            .await
            .unwrap();

        store.clear(IndexName::CampaignHistory).await.unwrap();
        assert_eq!(store.len(IndexName::CampaignHistory).await, 0);
        assert_eq!(store.len(IndexName::Rules).await, 1);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
