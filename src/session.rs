use tokio::sync::Mutex;
use tracing::info;

pub type SessionId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    OutOfRange { session_id: SessionId, pool_size: usize },
    NotAcquired { session_id: SessionId },
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfRange {
                session_id,
                pool_size,
            } => write!(f, "session id {session_id} out of range (pool size {pool_size})"),
            Self::NotAcquired { session_id } => write!(f, "session id {session_id} is not in use"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Fixed-size pool of session ids. The lowest free id is handed out first.
#[derive(Debug)]
pub struct SessionRegistry {
    slots: Mutex<Vec<bool>>,
}

impl SessionRegistry {
    pub fn new(pool_size: usize) -> Self {
        Self {
            slots: Mutex::new(vec![false; pool_size]),
        }
    }

    pub async fn pool_size(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Returns `None` when every id is taken; never waits for one to free up.
    pub async fn acquire(&self) -> Option<SessionId> {
        let mut slots = self.slots.lock().await;
        let Some(session_id) = slots.iter().position(|occupied| !occupied) else {
            info!("no session id available");
            return None;
        };
        slots[session_id] = true;
        info!(session_id, "session acquired");
        Some(session_id)
    }

    /// Double release and unknown ids are rejected and leave the pool untouched.
    pub async fn release(&self, session_id: SessionId) -> Result<(), SessionError> {
        let mut slots = self.slots.lock().await;
        let pool_size = slots.len();
        let slot = slots.get_mut(session_id).ok_or(SessionError::OutOfRange {
            session_id,
            pool_size,
        })?;
        if !*slot {
            return Err(SessionError::NotAcquired { session_id });
        }
        *slot = false;
        info!(session_id, "session released");
        Ok(())
    }

    pub async fn is_active(&self, session_id: SessionId) -> bool {
        self.slots
            .lock()
            .await
            .get(session_id)
            .copied()
            .unwrap_or(false)
    }

    pub async fn in_use(&self) -> usize {
        self.slots.lock().await.iter().filter(|s| **s).count()
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, sync::Arc};

    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn lowest_free_id_wins() {
        let registry = SessionRegistry::new(3);
        assert_eq!(registry.acquire().await, Some(0));
        assert_eq!(registry.acquire().await, Some(1));
        assert_eq!(registry.acquire().await, Some(2));
        assert_eq!(registry.acquire().await, None);

        registry.release(1).await.unwrap();
        assert_eq!(registry.acquire().await, Some(1));
        assert_eq!(registry.in_use().await, 3);
    }

    #[tokio::test]
    async fn double_release_is_rejected() {
        let registry = SessionRegistry::new(2);
        let id = registry.acquire().await.unwrap();
        registry.release(id).await.unwrap();
        assert_eq!(
            registry.release(id).await,
            Err(SessionError::NotAcquired { session_id: id })
        );
        assert!(!registry.is_active(id).await);
        assert_eq!(registry.acquire().await, Some(id));
    }

    #[tokio::test]
    async fn out_of_range_release_is_rejected() {
        let registry = SessionRegistry::new(2);
        assert_eq!(
            registry.release(7).await,
            Err(SessionError::OutOfRange {
                session_id: 7,
                pool_size: 2
            })
        );
        assert!(!registry.is_active(7).await);
    }

    #[tokio::test]
    async fn empty_pool_never_hands_out_ids() {
        let registry = SessionRegistry::new(0);
        assert_eq!(registry.acquire().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_never_double_allocates() {
        const N: usize = 64;
        let registry = Arc::new(SessionRegistry::new(N));
        let mut tasks = Vec::new();
        for _ in 0..N {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move { registry.acquire().await }));
        }

        let mut ids = BTreeSet::new();
        for task in tasks {
            let id = task.await.unwrap().expect("pool sized for every task");
            assert!(ids.insert(id), "id {id} handed out twice");
        }
        assert_eq!(ids, (0..N).collect::<BTreeSet<_>>());
        assert_eq!(registry.acquire().await, None);
    }
}
