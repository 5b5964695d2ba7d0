//! The change bridge: classify and republish.
//!
//! A single task drains the store's change feed, classifies each event by
//! the presence of its before/after snapshots, and publishes the result to
//! the topic derived from the relevant side's state. Each publish is
//! awaited before the next event is pulled, so subscribers observe
//! per-partition changes in commit order.
//!
//! The bridge holds no durable cursor: events committed while it is not
//! running are missed. A closed feed is fatal to the bridge only — request
//! handling continues, subscribers simply stop receiving updates.

use cryptid_broker::TopicBroker;
use cryptid_types::{ChangeEvent, SightingChange};
use tokio::sync::mpsc::UnboundedReceiver;

/// Runs the bridge loop until the change feed closes.
pub async fn run_bridge(mut changes: UnboundedReceiver<ChangeEvent>, broker: TopicBroker) {
    tracing::info!("change bridge started");

    while let Some(event) = changes.recv().await {
        let change = match SightingChange::try_from(event) {
            Ok(change) => change,
            Err(e) => {
                // Protocol violation: log and skip, never crash the bridge.
                tracing::warn!(error = %e, "skipping malformed change event");
                continue;
            }
        };

        let topic = change.topic();
        match serde_json::to_string(&change.into_message()) {
            Ok(json) => {
                tracing::debug!(topic = %topic, "publishing change");
                broker.publish(&topic, json).await;
            }
            Err(e) => {
                tracing::error!(topic = %topic, "failed to serialize change message: {}", e);
            }
        }
    }

    tracing::error!(
        "change feed closed; bridge stopping — subscribers will no longer receive updates"
    );
}
