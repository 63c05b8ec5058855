//! Session Registry (C3): the map from `client_id` to live `Session`,
//! plus the counters the Supervisor's shutdown drain waits on.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::info;
use tokio::sync::Notify;

use crate::session::Session;

/// Concurrent registry of active sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    inflight: AtomicUsize,
    drained: Notify,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `session` under its `client_id`.
    ///
    /// If a session already occupies that id (a reconnect racing the old
    /// connection's teardown), the existing session is closed with
    /// `GOING_AWAY`. The swap itself is a single atomic `insert` (not a
    /// separate remove-then-insert), so two connections racing to register
    /// the same id can never both see no prior entry and leave one session
    /// orphaned in the map.
    pub async fn add(&self, session: Arc<Session>) {
        let client_id = session.client_id.clone();
        if let Some(old) = self.sessions.insert(client_id.clone(), session) {
            info!(target: "gateway::registry", "replacing existing session for {client_id}");
            old.close(1001, "replaced by new connection").await;
        }
    }

    /// Remove and return the session for `client_id`, if present.
    pub fn remove(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(client_id).map(|(_, s)| s)
    }

    /// Remove `client_id` only if the currently-registered session is the
    /// same instance as `session`.
    ///
    /// A teardown path (read-loop exit, router write failure) looks up a
    /// session and later wants to remove it, but a reconnect can install a
    /// new session under the same id in between. Removing by id alone would
    /// then delete the new, live session instead of the stale one; this
    /// checks identity first.
    pub fn remove_if_current(&self, client_id: &str, session: &Arc<Session>) {
        self.sessions
            .remove_if(client_id, |_, current| Arc::ptr_eq(current, session));
    }

    /// Look up the session for `client_id`.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(client_id).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every registered session with the given code/reason.
    pub async fn broadcast_close(&self, code: u16, reason: &str) {
        let sessions: Vec<_> = self.sessions.iter().map(|e| e.value().clone()).collect();
        for session in sessions {
            session.close(code, reason).await;
        }
    }

    /// Mark one in-flight operation (a handshake in progress, or a publish
    /// not yet acknowledged) as started.
    pub fn inc_inflight(&self) {
        self.inflight.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark one in-flight operation as finished, waking any `wait_drain`
    /// waiter if this was the last one.
    pub fn dec_inflight(&self) {
        if self.inflight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }

    #[must_use]
    pub fn inflight_count(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Wait until in-flight work reaches zero, or `timeout` elapses.
    /// Returns `true` if drained, `false` on timeout.
    pub async fn wait_drain(&self, timeout: Duration) -> bool {
        if self.inflight_count() == 0 {
            return true;
        }
        let notified = self.drained.notified();
        tokio::select! {
            () = notified => self.inflight_count() == 0,
            () = tokio::time::sleep(timeout) => self.inflight_count() == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // `Session::new` requires a real `SplitSink<WebSocket, Message>`, which
    // can only be produced from an actual upgraded connection. Registry
    // logic that does not touch the sink (inflight counting, drain) is
    // tested directly; collision/close behavior is covered by the
    // integration tests that drive a real connection.

    #[tokio::test]
    async fn test_inflight_round_trip() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.inflight_count(), 0);
        registry.inc_inflight();
        registry.inc_inflight();
        assert_eq!(registry.inflight_count(), 2);
        registry.dec_inflight();
        assert_eq!(registry.inflight_count(), 1);
        registry.dec_inflight();
        assert_eq!(registry.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_drain_returns_immediately_when_empty() {
        let registry = SessionRegistry::new();
        let drained = registry.wait_drain(Duration::from_millis(50)).await;
        assert!(drained);
    }

    #[tokio::test]
    async fn test_wait_drain_wakes_on_last_decrement() {
        let registry = SessionRegistry::new();
        registry.inc_inflight();

        let registry2 = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry2.dec_inflight();
        });

        let drained = registry.wait_drain(Duration::from_secs(1)).await;
        assert!(drained);
    }

    #[tokio::test]
    async fn test_wait_drain_times_out_if_never_drained() {
        let registry = SessionRegistry::new();
        registry.inc_inflight();
        let drained = registry.wait_drain(Duration::from_millis(20)).await;
        assert!(!drained);
    }
}
