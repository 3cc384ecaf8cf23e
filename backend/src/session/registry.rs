use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use uuid::Uuid;

use shared::LiveDetectionInfo;

use super::state::SessionDetectionState;

/// One authenticated user's session: the controller-owned detection state
/// plus a monitored value cell carrying the latest live-stream info. The
/// frame handler is the single producer, the display endpoint the single
/// reader; staleness is bounded by one frame.
pub struct UserSession {
    pub state: SessionDetectionState,
    live_tx: watch::Sender<Option<LiveDetectionInfo>>,
    live_rx: watch::Receiver<Option<LiveDetectionInfo>>,
}

impl UserSession {
    fn new() -> Self {
        let (live_tx, live_rx) = watch::channel(None);
        Self {
            state: SessionDetectionState::new(),
            live_tx,
            live_rx,
        }
    }

    pub fn publish_live(&self, info: Option<LiveDetectionInfo>) {
        // Receiver is owned alongside the sender, so send cannot fail.
        let _ = self.live_tx.send(info);
    }

    pub fn latest_live(&self) -> Option<LiveDetectionInfo> {
        self.live_rx.borrow().clone()
    }
}

/// All live sessions, keyed by user id. Every piece of mutable detection
/// state is scoped to one user's entry; handlers lock only their own
/// session, never the whole map for longer than the lookup.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<UserSession>>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fetch the user's session, creating it on first touch.
    pub async fn session(&self, user_id: Uuid) -> Arc<Mutex<UserSession>> {
        {
            let map = self.inner.read().await;
            if let Some(session) = map.get(&user_id) {
                return session.clone();
            }
        }

        let mut map = self.inner.write().await;
        map.entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(UserSession::new())))
            .clone()
    }

    /// Drop a user's session outright (logout / account removal).
    pub async fn remove(&self, user_id: Uuid) {
        self.inner.write().await.remove(&user_id);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn same_user_gets_the_same_session() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();

        let a = registry.session(user).await;
        let b = registry.session(user).await;
        assert!(Arc::ptr_eq(&a, &b));

        let other = registry.session(Uuid::new_v4()).await;
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[actix_web::test]
    async fn live_cell_publishes_and_clears() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();
        let session = registry.session(user).await;

        let guard = session.lock().await;
        assert!(guard.latest_live().is_none());

        let info = LiveDetectionInfo {
            diseases: vec!["Downy_Mildew (80.0%)".to_string()],
            average_confidence: 0.8,
            advisory: String::new(),
        };
        guard.publish_live(Some(info.clone()));
        assert_eq!(guard.latest_live(), Some(info));

        guard.publish_live(None);
        assert!(guard.latest_live().is_none());
    }

    #[actix_web::test]
    async fn remove_forgets_the_session() {
        let registry = SessionRegistry::new();
        let user = Uuid::new_v4();

        let a = registry.session(user).await;
        registry.remove(user).await;
        let b = registry.session(user).await;
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
