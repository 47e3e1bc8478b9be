use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::proxy::ProxyId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub node_id: ProxyId,
    pub message: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proxy {}: {}", self.node_id, self.message)
    }
}

/// Append-only record of successful state-changing operations.
///
/// Cloning yields another handle to the same log. Entries are never edited or removed.
#[derive(Debug, Clone, Default)]
pub struct OperationLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, node_id: ProxyId, message: impl Into<String>) {
        self.entries.write().await.push(LogEntry {
            node_id,
            message: message.into(),
        });
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let log = OperationLog::new();
        let mut tasks = Vec::new();
        for node_id in 0..8 {
            let log = log.clone();
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    log.append(node_id, format!("op {i}")).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let entries = log.entries().await;
        assert_eq!(entries.len(), 200);
        for node_id in 0..8 {
            let mine: Vec<_> = entries
                .iter()
                .filter(|e| e.node_id == node_id)
                .map(|e| e.message.clone())
                .collect();
            let expected: Vec<_> = (0..25).map(|i| format!("op {i}")).collect();
            assert_eq!(mine, expected);
        }
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let log = OperationLog::new();
        let other = log.clone();
        assert!(log.is_empty().await);
        other.append(1, "added key: a, value: 1").await;
        assert_eq!(log.len().await, 1);
        assert_eq!(
            log.entries().await[0].to_string(),
            "proxy 1: added key: a, value: 1"
        );
    }
}
