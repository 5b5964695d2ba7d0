//! Topic-scoped fan-out pub/sub for connected subscribers.
//!
//! [`TopicBroker`] keeps no message history and makes no delivery guarantee
//! beyond "delivered to subscribers registered at publish time". Sessions
//! are identified by a broker-assigned UUID and carry an `mpsc` sender that
//! the transport layer drains into its socket.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Manages subscriber sessions and their topic registrations.
#[derive(Clone, Default)]
pub struct TopicBroker {
    /// Active sessions: session id -> sender.
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::Sender<String>>>>,
    /// Subscriptions: topic -> set of session ids.
    topic_subscriptions: Arc<RwLock<HashMap<String, HashSet<Uuid>>>>,
    /// Reverse mapping: session id -> set of topics, for cleanup on
    /// disconnect.
    session_topics: Arc<RwLock<HashMap<Uuid, HashSet<String>>>>,
}

impl TopicBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new session and returns its id.
    pub async fn add_session(&self, sender: mpsc::Sender<String>) -> Uuid {
        let session_id = Uuid::new_v4();
        self.sessions.write().await.insert(session_id, sender);
        session_id
    }

    /// Removes a session and unsubscribes it from every topic, so the
    /// subscriber sets never accumulate dead handles.
    ///
    /// Lock ordering: sessions → topic_subscriptions → session_topics,
    /// matching `subscribe`/`unsubscribe` to prevent deadlocks.
    pub async fn remove_session(&self, session_id: Uuid) {
        if self.sessions.write().await.remove(&session_id).is_none() {
            return; // Already removed
        }

        let topics = {
            let session_topics = self.session_topics.read().await;
            session_topics.get(&session_id).cloned()
        };

        if let Some(ref topics) = topics {
            let mut topic_subs = self.topic_subscriptions.write().await;
            for topic in topics {
                if let Some(listeners) = topic_subs.get_mut(topic) {
                    listeners.remove(&session_id);
                    if listeners.is_empty() {
                        topic_subs.remove(topic);
                    }
                }
            }
        }

        if topics.is_some() {
            self.session_topics.write().await.remove(&session_id);
        }
    }

    /// Subscribes a session to a topic. Idempotent per (topic, session).
    pub async fn subscribe(&self, topic: String, session_id: Uuid) {
        let mut topic_subs = self.topic_subscriptions.write().await;
        topic_subs
            .entry(topic.clone())
            .or_default()
            .insert(session_id);

        let mut session_topics = self.session_topics.write().await;
        session_topics.entry(session_id).or_default().insert(topic);
    }

    /// Unsubscribes a session from a topic. Empty topic sets are pruned.
    pub async fn unsubscribe(&self, topic: &str, session_id: Uuid) {
        let mut topic_subs = self.topic_subscriptions.write().await;
        if let Some(listeners) = topic_subs.get_mut(topic) {
            listeners.remove(&session_id);
            if listeners.is_empty() {
                topic_subs.remove(topic);
            }
        }

        let mut session_topics = self.session_topics.write().await;
        if let Some(topics) = session_topics.get_mut(&session_id) {
            topics.remove(topic);
            if topics.is_empty() {
                session_topics.remove(&session_id);
            }
        }
    }

    /// Delivers a message to every session currently subscribed to the
    /// topic. Sessions that register after this call do not receive it.
    ///
    /// Delivery uses `try_send`: a session whose buffer is full is too slow
    /// and loses this message (logged), without blocking other subscribers
    /// or holding a registry lock across the send.
    pub async fn publish(&self, topic: &str, message_json: String) {
        let listeners: Vec<Uuid> = {
            let topic_subs = self.topic_subscriptions.read().await;
            match topic_subs.get(topic) {
                Some(set) => set.iter().copied().collect(),
                None => return,
            }
        };

        let sessions = self.sessions.read().await;
        for session_id in listeners {
            if let Some(sender) = sessions.get(&session_id) {
                if let Err(e) = sender.try_send(message_json.clone()) {
                    tracing::warn!(
                        session_id = %session_id,
                        topic = %topic,
                        "dropping published message for slow consumer: {}",
                        e
                    );
                }
            }
        }
    }

    /// Number of sessions currently subscribed to a topic. Test and
    /// diagnostics helper.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topic_subscriptions
            .read()
            .await
            .get(topic)
            .map(|set| set.len())
            .unwrap_or(0)
    }
}
