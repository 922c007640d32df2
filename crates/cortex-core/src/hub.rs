use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use crate::event::{Event, Publish};
use crate::types::ConversationId;

struct Channel {
    tx: mpsc::UnboundedSender<Event>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>>,
}

impl Channel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

/// Per-conversation ordered event delivery.
///
/// Every conversation id owns exactly one unbounded FIFO channel, created on
/// first use. Publishing never blocks. A single relay drains a channel at a
/// time; a relay that reconnects resumes the same queue.
#[derive(Default)]
pub struct EventHub {
    channels: Mutex<HashMap<ConversationId, Channel>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<ConversationId, Channel>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue an event for a conversation.
    pub fn publish(&self, cid: &ConversationId, event: Event) {
        let topic = event.topic;
        let mut channels = self.channels();
        let channel = channels.entry(cid.clone()).or_insert_with(Channel::new);
        if channel.tx.send(event).is_err() {
            debug!(conversation = %cid, %topic, "Hub channel closed, event dropped");
        }
    }

    /// Attach a relay to a conversation's channel.
    pub fn subscribe(&self, cid: &ConversationId) -> Subscription {
        let mut channels = self.channels();
        let channel = channels.entry(cid.clone()).or_insert_with(Channel::new);
        Subscription {
            conversation: cid.clone(),
            rx: channel.rx.clone(),
        }
    }

    /// A publish handle bound to one conversation.
    pub fn publisher(self: &Arc<Self>, cid: &ConversationId) -> ConversationPublisher {
        ConversationPublisher {
            hub: Arc::clone(self),
            conversation: cid.clone(),
        }
    }

    /// Drop a conversation's channel. Undelivered events are discarded.
    pub fn remove(&self, cid: &ConversationId) -> bool {
        self.channels().remove(cid).is_some()
    }

    /// Number of live conversation channels.
    pub fn len(&self) -> usize {
        self.channels().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving side of one conversation's channel.
pub struct Subscription {
    conversation: ConversationId,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>>,
}

impl Subscription {
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }

    /// Wait for the next event. Returns `None` once the channel is removed
    /// from the hub and drained.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.lock().await.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Take every event queued right now.
    pub fn drain(&self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(ev) = self.try_recv() {
            events.push(ev);
        }
        events
    }
}

/// `Publish` implementation that routes into one conversation's channel.
#[derive(Clone)]
pub struct ConversationPublisher {
    hub: Arc<EventHub>,
    conversation: ConversationId,
}

impl ConversationPublisher {
    pub fn conversation(&self) -> &ConversationId {
        &self.conversation
    }
}

impl Publish for ConversationPublisher {
    fn publish(&self, event: Event) {
        self.hub.publish(&self.conversation, event);
    }
}
