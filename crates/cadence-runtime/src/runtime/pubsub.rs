use std::collections::HashMap;

use tracing::debug;

use crate::runtime::types::{EventTopic, RuntimeEvent, RuntimeEventSender};

/// One listener per topic. A listener that reports a disconnect is dropped.
pub struct RuntimePubSub<S: RuntimeEventSender> {
    subscribers: HashMap<EventTopic, S>,
}

impl<S: RuntimeEventSender> RuntimePubSub<S> {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
        }
    }

    /// Replaces any previous listener of `topic`.
    pub fn subscribe(&mut self, topic: EventTopic, sender: S) {
        self.subscribers.insert(topic, sender);
    }

    pub fn unsubscribe(&mut self, topic: EventTopic) -> bool {
        self.subscribers.remove(&topic).is_some()
    }

    #[cfg(test)]
    pub fn has_subscriber(&self, topic: EventTopic) -> bool {
        self.subscribers.contains_key(&topic)
    }

    pub fn broadcast(&mut self, event: RuntimeEvent) {
        let topic = event.topic();
        let delivered = match self.subscribers.get(&topic) {
            Some(subscriber) => subscriber.send(event),
            None => return,
        };
        if !delivered {
            debug!(?topic, "listener went away, unsubscribing");
            self.subscribers.remove(&topic);
        }
    }
}

impl<S: RuntimeEventSender> Default for RuntimePubSub<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{Sender, unbounded};

    use super::*;

    #[test]
    fn events_only_reach_their_topic() {
        let mut pubsub = RuntimePubSub::<Sender<RuntimeEvent>>::new();
        let (lifecycle_tx, lifecycle_rx) = unbounded();
        let (rumble_tx, rumble_rx) = unbounded();
        pubsub.subscribe(EventTopic::Lifecycle, lifecycle_tx);
        pubsub.subscribe(EventTopic::Rumble, rumble_tx);

        pubsub.broadcast(RuntimeEvent::Paused);
        pubsub.broadcast(RuntimeEvent::RumbleStop);
        pubsub.broadcast(RuntimeEvent::FrameRendered { frame: 1, lines: 263 });

        let lifecycle: Vec<_> = lifecycle_rx.try_iter().collect();
        let rumble: Vec<_> = rumble_rx.try_iter().collect();
        assert_eq!(lifecycle, vec![RuntimeEvent::Paused]);
        assert_eq!(rumble, vec![RuntimeEvent::RumbleStop]);
    }

    #[test]
    fn disconnected_subscriber_is_dropped() {
        let mut pubsub = RuntimePubSub::<Sender<RuntimeEvent>>::new();
        let (tx, rx) = unbounded();
        pubsub.subscribe(EventTopic::Lifecycle, tx);
        drop(rx);

        pubsub.broadcast(RuntimeEvent::Started);
        assert!(!pubsub.has_subscriber(EventTopic::Lifecycle));
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut pubsub = RuntimePubSub::<Sender<RuntimeEvent>>::new();
        let (tx, rx) = unbounded();
        pubsub.subscribe(EventTopic::Lifecycle, tx);

        assert!(pubsub.unsubscribe(EventTopic::Lifecycle));
        assert!(!pubsub.unsubscribe(EventTopic::Lifecycle));
        pubsub.broadcast(RuntimeEvent::Stopped);
        assert!(rx.try_recv().is_err());
    }
}
