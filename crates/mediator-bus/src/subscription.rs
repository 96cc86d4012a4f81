use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use mediator_protocol::BusEvent;
use mediator_stream::FanoutChannel;

use crate::error::BusError;
use crate::Bus;

struct Listener {
    parent_thread_id: Option<String>,
    handle: JoinHandle<()>,
}

/// Tracks one session's live topic-listener tasks, keyed by binding id, so
/// `unsubscribe` can cancel them and `subscribe` can adopt an
/// already-running one instead of starting a duplicate.
pub struct SubscriptionRegistry {
    bus: Bus,
    listeners: Mutex<HashMap<String, Listener>>,
}

impl SubscriptionRegistry {
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Starts (or adopts) a listener for `binding_id` on `topic`, forwarding
    /// each fanout message as a [`BusEvent`] over `events`.
    pub async fn subscribe(
        &self,
        topic: &str,
        binding_id: &str,
        parent_thread_id: Option<String>,
        events: mpsc::Sender<BusEvent>,
    ) -> Result<(), BusError> {
        let mut listeners = self.listeners.lock().await;
        if let Some(existing) = listeners.get(binding_id) {
            if !existing.handle.is_finished() {
                return Ok(());
            }
        }

        let addr = self.bus.topic_address(topic)?;
        let channel = FanoutChannel::new(&addr)?;
        let mut subscription = channel.subscribe().await?;

        let binding_id_owned = binding_id.to_owned();
        let parent_for_events = parent_thread_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                match subscription.read(None).await {
                    Ok((true, value)) => {
                        let payload = value
                            .get("payload")
                            .and_then(|p| p.as_str())
                            .unwrap_or_default()
                            .to_owned();
                        let event = BusEvent {
                            payload,
                            binding_id: binding_id_owned.clone(),
                            parent_thread_id: parent_for_events.clone(),
                        };
                        if events.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok((false, _)) => break,
                    Err(err) => {
                        tracing::warn!(%err, topic = %binding_id_owned, "bus topic listener stopped");
                        break;
                    }
                }
            }
        });

        listeners.insert(
            binding_id.to_owned(),
            Listener {
                parent_thread_id,
                handle,
            },
        );
        Ok(())
    }

    /// Cancels the listener for a single binding id.
    pub async fn unsubscribe_one(&self, binding_id: &str) -> bool {
        let mut listeners = self.listeners.lock().await;
        match listeners.remove(binding_id) {
            Some(listener) => {
                listener.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every listener whose subscribe request carried this parent
    /// thread id, returning the binding ids that were cancelled.
    pub async fn unsubscribe_by_parent(&self, parent_thread_id: &str) -> Vec<String> {
        let mut listeners = self.listeners.lock().await;
        let matching: Vec<String> = listeners
            .iter()
            .filter(|(_, l)| l.parent_thread_id.as_deref() == Some(parent_thread_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &matching {
            if let Some(listener) = listeners.remove(id) {
                listener.handle.abort();
            }
        }
        matching
    }

    /// Cancels every listener for this session, returning their binding ids.
    pub async fn unsubscribe_all(&self) -> Vec<String> {
        let mut listeners = self.listeners.lock().await;
        let ids: Vec<String> = listeners.keys().cloned().collect();
        for listener in listeners.values() {
            listener.handle.abort();
        }
        listeners.clear();
        ids
    }

    pub async fn is_empty(&self) -> bool {
        self.listeners.lock().await.is_empty()
    }
}
