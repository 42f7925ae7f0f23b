use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{Payload, TopicName};

/// Last payload attempted per topic.
///
/// Each topic owns its own slot: publishers of different topics never wait for each other, while
/// publishers of the same topic are serialized for as long as they hold the slot's [`TopicGuard`].
#[derive(Clone, Default)]
pub struct PublishCache {
    slots: Arc<DashMap<TopicName, Arc<Slot>>>,
}

#[derive(Default)]
struct Slot {
    serial: Arc<Mutex<()>>,
    last: RwLock<Option<Payload>>,
}

impl PublishCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes exclusive ownership of `topic` until the guard is dropped.
    pub async fn lock(&self, topic: &TopicName) -> TopicGuard {
        let slot = self.slots.entry(topic.clone()).or_default().value().clone();
        let serial = slot.serial.clone().lock_owned().await;
        TopicGuard { slot, _serial: serial }
    }

    /// Last payload recorded for `topic`, without waiting for in-flight publishes.
    pub fn get(&self, topic: &str) -> Option<Payload> {
        self.slots.get(topic).and_then(|slot| slot.last.read().clone())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub struct TopicGuard {
    slot: Arc<Slot>,
    _serial: OwnedMutexGuard<()>,
}

impl TopicGuard {
    #[inline]
    pub fn last(&self) -> Option<Payload> {
        self.slot.last.read().clone()
    }

    #[inline]
    pub fn is_duplicate(&self, payload: &Payload) -> bool {
        self.slot.last.read().as_ref() == Some(payload)
    }

    #[inline]
    pub fn record(&self, payload: Payload) {
        *self.slot.last.write() = Some(payload);
    }
}
