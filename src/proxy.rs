use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::{
    backend::{BackendClient, DeleteOutcome, KvPair},
    cluster::{MemberId, MembershipView},
    metrics::MetricsReport,
    oplog::{LogEntry, OperationLog},
};

/// Index of a node proxy; equal to the session id it serves.
pub type ProxyId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Added,
    Updated,
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => f.write_str("added"),
            Self::Updated => f.write_str("updated"),
        }
    }
}

/// One cluster member's view of the backend: membership, read cache and a handle to the
/// shared operation log.
pub struct NodeProxy {
    id: ProxyId,
    backend: BackendClient,
    view: RwLock<MembershipView>,
    // Filled by reads, never used to answer them.
    cache: Mutex<HashMap<String, String>>,
    log: OperationLog,
}

impl NodeProxy {
    pub fn new(
        id: ProxyId,
        backend: BackendClient,
        view: MembershipView,
        log: OperationLog,
    ) -> Self {
        Self {
            id,
            backend,
            view: RwLock::new(view),
            cache: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub async fn membership(&self) -> Vec<MemberId> {
        self.view.read().await.member_ids().to_vec()
    }

    pub async fn put(&self, key: &str, value: &str, action: WriteAction) -> bool {
        let view = self.membership().await;
        if !self.backend.put(&view, key, value).await {
            return false;
        }
        self.log
            .append(self.id, format!("{action} key: {key}, value: {value}"))
            .await;
        true
    }

    /// Always asks the backend. `""` covers both an absent key and an empty value.
    pub async fn get(&self, key: &str) -> String {
        let view = self.membership().await;
        let value = self.backend.get(&view, key).await;
        if !value.is_empty() {
            self.cache
                .lock()
                .await
                .insert(key.to_string(), value.clone());
        }
        value
    }

    pub async fn delete(&self, key: &str) -> DeleteOutcome {
        let view = self.membership().await;
        let outcome = self.backend.delete(&view, key).await;
        if let DeleteOutcome::Deleted { .. } = &outcome {
            self.cache.lock().await.remove(key);
            self.log.append(self.id, format!("deleted key: {key}")).await;
        }
        outcome
    }

    pub async fn list(&self) -> Vec<KvPair> {
        let view = self.membership().await;
        self.backend.list(&view).await
    }

    pub async fn add_learner(&self, node_id: MemberId, api_addr: &str) -> Option<Value> {
        let view = self.membership().await;
        let reply = self.backend.add_learner(&view, node_id, api_addr).await?;
        self.log
            .append(
                self.id,
                format!("added learner: node_id={node_id}, address={api_addr}"),
            )
            .await;
        Some(reply)
    }

    /// On success the local view is replaced right away, before the backend has necessarily
    /// converged on the new configuration.
    pub async fn change_membership(&self, ids: &[MemberId]) -> Option<Value> {
        let view = self.membership().await;
        let reply = self.backend.change_membership(&view, ids).await?;
        self.log
            .append(self.id, format!("changed membership: {ids:?}"))
            .await;
        *self.view.write().await = MembershipView::new(ids.to_vec());
        info!(proxy_id = self.id, members = ?ids, "membership view replaced");
        Some(reply)
    }

    pub async fn metrics(&self) -> Option<MetricsReport> {
        let view = self.membership().await;
        let reply = self.backend.metrics(&view).await?;
        Some(MetricsReport::from_reply(&reply))
    }

    pub async fn get_log(&self) -> Vec<LogEntry> {
        self.log.entries().await
    }

    #[cfg(test)]
    async fn cached(&self, key: &str) -> Option<String> {
        self.cache.lock().await.get(key).cloned()
    }
}
