use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendClient, DeleteOutcome, KvPair},
    cluster::{AddressTable, MemberId, MembershipView},
    command::Command,
    config::Config,
    metrics::MetricsReport,
    oplog::{LogEntry, OperationLog},
    proxy::{NodeProxy, WriteAction},
    session::{SessionId, SessionRegistry},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    UnknownSession { session_id: SessionId },
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownSession { session_id } => {
                write!(f, "session {session_id} is not logged in")
            }
        }
    }
}

impl std::error::Error for DispatchError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    Deleted,
    Absent,
    Failed,
}

/// Typed outcome of one command line. Backend failures show up as `ok: false`, a missing
/// value or an empty list; malformed input as `Invalid`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchResult {
    Put {
        key: String,
        value: String,
        action: WriteAction,
        previous: Option<String>,
        ok: bool,
    },
    Get {
        key: String,
        /// `None` when the backend returned `""`, which also covers a stored empty value.
        value: Option<String>,
    },
    Delete {
        key: String,
        status: DeleteStatus,
        previous: Option<String>,
    },
    List {
        pairs: Vec<KvPair>,
    },
    Log {
        entries: Vec<LogEntry>,
    },
    Metrics {
        report: Option<MetricsReport>,
    },
    AddLearner {
        node_id: MemberId,
        api_addr: String,
        ok: bool,
    },
    ChangeMembership {
        node_ids: Vec<MemberId>,
        ok: bool,
    },
    Exit {
        session_id: SessionId,
    },
    Invalid {
        message: String,
    },
}

impl DispatchResult {
    pub fn closes_session(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }
}

/// Routes command lines from logged-in sessions to their node proxies.
pub struct Dispatcher {
    sessions: Arc<SessionRegistry>,
    proxies: Vec<Arc<NodeProxy>>,
    log: OperationLog,
}

impl Dispatcher {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        proxies: Vec<Arc<NodeProxy>>,
        log: OperationLog,
    ) -> Self {
        Self {
            sessions,
            proxies,
            log,
        }
    }

    /// One proxy per session slot, all sharing one address table, one backend client and one
    /// operation log.
    pub fn try_from_config(config: &Config) -> anyhow::Result<Self> {
        let addresses = AddressTable::try_from_replicas(&config.replicas)?;
        if addresses.is_empty() {
            anyhow::bail!("at least one --replica ID=URL is required");
        }
        for member_id in &config.voters {
            if addresses.base_url(*member_id).is_none() {
                warn!(member_id, "voter has no replica address; it will always count as failed");
            }
        }
        let addresses = Arc::new(addresses);
        let backend = BackendClient::try_new(addresses, config.backend_timeouts())?;
        Ok(Self::with_backend(
            backend,
            config.voters.clone(),
            config.pool_size(),
        ))
    }

    pub fn with_backend(backend: BackendClient, voters: Vec<MemberId>, pool_size: usize) -> Self {
        let log = OperationLog::new();
        let proxies = (0..pool_size)
            .map(|id| {
                Arc::new(NodeProxy::new(
                    id,
                    backend.clone(),
                    MembershipView::new(voters.clone()),
                    log.clone(),
                ))
            })
            .collect();
        Self::new(Arc::new(SessionRegistry::new(pool_size)), proxies, log)
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn proxy(&self, session_id: SessionId) -> Option<&Arc<NodeProxy>> {
        self.proxies.get(session_id)
    }

    pub fn operation_log(&self) -> &OperationLog {
        &self.log
    }

    pub async fn login(&self) -> Option<SessionId> {
        self.sessions.acquire().await
    }

    pub async fn dispatch(
        &self,
        session_id: SessionId,
        line: &str,
    ) -> Result<DispatchResult, DispatchError> {
        let unknown = DispatchError::UnknownSession { session_id };
        if !self.sessions.is_active(session_id).await {
            return Err(unknown);
        }
        let own = self.proxies.get(session_id).ok_or(unknown.clone())?;

        let cmd = match Command::parse(line) {
            Ok(cmd) => cmd,
            Err(err) => {
                debug!(session_id, error = %err, "rejected command line");
                return Ok(DispatchResult::Invalid {
                    message: err.to_string(),
                });
            }
        };
        let proxy = if cmd.targets_primary() {
            self.proxies.first().ok_or(unknown.clone())?
        } else {
            own
        };
        debug!(session_id, command = cmd.name(), proxy_id = proxy.id(), "dispatching");

        let result = match cmd {
            Command::Put { key, value } => {
                let existing = proxy.get(&key).await;
                let (action, previous) = if existing.is_empty() {
                    (WriteAction::Added, None)
                } else {
                    (WriteAction::Updated, Some(existing))
                };
                let ok = proxy.put(&key, &value, action).await;
                DispatchResult::Put {
                    key,
                    value,
                    action,
                    previous,
                    ok,
                }
            }
            Command::Get { key } => {
                let value = proxy.get(&key).await;
                DispatchResult::Get {
                    key,
                    value: (!value.is_empty()).then_some(value),
                }
            }
            Command::Delete { key } => {
                let (status, previous) = match proxy.delete(&key).await {
                    DeleteOutcome::Deleted { previous } => (DeleteStatus::Deleted, Some(previous)),
                    DeleteOutcome::Absent => (DeleteStatus::Absent, None),
                    DeleteOutcome::Failed { previous } => (DeleteStatus::Failed, Some(previous)),
                };
                DispatchResult::Delete {
                    key,
                    status,
                    previous,
                }
            }
            Command::List => DispatchResult::List {
                pairs: proxy.list().await,
            },
            Command::Log => DispatchResult::Log {
                entries: proxy.get_log().await,
            },
            Command::Metrics => DispatchResult::Metrics {
                report: proxy.metrics().await,
            },
            Command::AddLearner { node_id, api_addr } => {
                let ok = proxy.add_learner(node_id, &api_addr).await.is_some();
                DispatchResult::AddLearner {
                    node_id,
                    api_addr,
                    ok,
                }
            }
            Command::ChangeMembership { node_ids } => {
                let ok = proxy.change_membership(&node_ids).await.is_some();
                DispatchResult::ChangeMembership { node_ids, ok }
            }
            Command::Exit => {
                self.sessions.release(session_id).await.map_err(|_| unknown)?;
                info!(session_id, "client logged out");
                DispatchResult::Exit { session_id }
            }
        };
        Ok(result)
    }
}
