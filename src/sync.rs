//! Progress registry backing the SSE endpoint (§6's **[ADD]**): the
//! platform sync driver publishes `ProgressEvent`s into a session's
//! channel, `routes::sse::sync_progress` drains them. Keyed by an opaque
//! session id rather than organization so an operator's admin-panel tab can
//! watch exactly the sync run it kicked off.

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

pub type SessionId = Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub organization_id: Uuid,
    pub adapter: String,
    pub leads_synced: u32,
    pub bounces_ingested: u32,
    pub done: bool,
}

/// `DashMap<SessionId, mpsc::Sender<ProgressEvent>>`, exactly as named in
/// the specification. Dropping a session's sender (client disconnect)
/// removes the registration so publishers stop buffering for a dead
/// subscriber.
#[derive(Default)]
pub struct ProgressRegistry {
    senders: DashMap<SessionId, mpsc::Sender<ProgressEvent>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: SessionId) -> mpsc::Receiver<ProgressEvent> {
        let (tx, rx) = mpsc::channel(32);
        self.senders.insert(session_id, tx);
        rx
    }

    pub fn unregister(&self, session_id: SessionId) {
        self.senders.remove(&session_id);
    }

    /// Best-effort publish; a full or closed channel just drops the event
    /// rather than blocking the sync driver.
    pub fn publish(&self, session_id: SessionId, event: ProgressEvent) {
        if let Some(sender) = self.senders.get(&session_id) {
            let _ = sender.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_after_unregister_is_a_silent_no_op() {
        let registry = ProgressRegistry::new();
        let session_id = Uuid::new_v4();
        let _rx = registry.register(session_id);
        registry.unregister(session_id);
        registry.publish(
            session_id,
            ProgressEvent {
                organization_id: Uuid::new_v4(),
                adapter: "test".into(),
                leads_synced: 0,
                bounces_ingested: 0,
                done: true,
            },
        );
    }

    #[tokio::test]
    async fn registered_session_receives_published_event() {
        let registry = ProgressRegistry::new();
        let session_id = Uuid::new_v4();
        let mut rx = registry.register(session_id);
        registry.publish(
            session_id,
            ProgressEvent {
                organization_id: Uuid::new_v4(),
                adapter: "test".into(),
                leads_synced: 3,
                bounces_ingested: 1,
                done: false,
            },
        );
        let event = rx.recv().await.expect("event should be delivered");
        assert_eq!(event.leads_synced, 3);
    }
}
