//! In-memory record of the turns played by this process.

use crate::models::Action;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One prompt and the DM's reply to it.
#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub action: Action,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn new(action: Action, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            action,
            prompt: prompt.into(),
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}

/// Bounded, process-lifetime turn log. Oldest turns are evicted first.
#[derive(Debug, Clone)]
pub struct SessionLog {
    turns: Arc<RwLock<VecDeque<Turn>>>,
    capacity: usize,
}

impl SessionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(256)))),
            capacity,
        }
    }

    pub async fn record(&self, turn: Turn) {
        if self.capacity == 0 {
            return;
        }
        let mut turns = self.turns.write().await;
        while turns.len() >= self.capacity {
            turns.pop_front();
        }
        turns.push_back(turn);
    }

    /// The last `n` turns, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<Turn> {
        let turns = self.turns.read().await;
        let skip = turns.len().saturating_sub(n);
        turns.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.turns.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.turns.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.turns.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let log = SessionLog::new(2);
        log.record(Turn::new(Action::Talk, "one", "1")).await;
        log.record(Turn::new(Action::Look, "two", "2")).await;
        log.record(Turn::new(Action::Attack, "three", "3")).await;

        let turns = log.recent(10).await;
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].prompt, "two");
        assert_eq!(turns[1].prompt, "three");
    }

    #[tokio::test]
    async fn recent_returns_tail_in_order() {
        let log = SessionLog::new(10);
        for i in 0..5 {
            log.record(Turn::new(Action::Talk, format!("p{i}"), format!("r{i}")))
                .await;
        }

        let prompts: Vec<String> = log.recent(2).await.into_iter().map(|t| t.prompt).collect();
        assert_eq!(prompts, vec!["p3", "p4"]);
    }

    #[tokio::test]
    async fn zero_capacity_keeps_nothing() {
        let log = SessionLog::new(0);
        log.record(Turn::new(Action::Talk, "hi", "hello")).await;
        assert!(log.is_empty().await);
    }

    #[tokio::test]
    async fn clear_empties_log() {
        let log = SessionLog::new(4);
        log.record(Turn::new(Action::Talk, "hi", "hello")).await;
        log.clear().await;
        assert_eq!(log.len().await, 0);
    }
}
