//! Change notifications for external observers.
//!
//! Events are plain values: a GUID and, for state changes, the two states.
//! Observers that need more re-query the curator. Every published event also
//! bumps a revision counter, so a poller can compare revisions instead of
//! subscribing.

use std::sync::atomic::{AtomicU64, Ordering};

use curator_assets::TransformState;
use curator_common::Guid;
use tokio::sync::broadcast;

/// Something observable changed in the curator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuratorEvent {
    /// A sub-asset appeared.
    AssetAdded(Guid),
    /// A sub-asset disappeared.
    AssetRemoved(Guid),
    /// An asset's document changed.
    AssetUpdated(Guid),
    /// An asset's transform state changed.
    StateChanged {
        /// Main GUID of the asset.
        guid: Guid,
        /// Previous state.
        old: TransformState,
        /// New state.
        new: TransformState,
    },
    /// Another platform profile became active.
    ActivePlatformChanged,
    /// The asset list was rebuilt from scratch; observers should re-query
    /// everything.
    AssetListReset,
}

/// Broadcasts [`CuratorEvent`]s to any number of subscribers.
///
/// `publish` is synchronous and never blocks. Without subscribers events are
/// dropped; slow subscribers see `RecvError::Lagged` instead of slowing the
/// curator down.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<CuratorEvent>,
    revision: AtomicU64,
}

impl EventBus {
    /// Creates a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            revision: AtomicU64::new(0),
        }
    }

    /// Publishes one event.
    pub fn publish(&self, event: CuratorEvent) {
        self.revision.fetch_add(1, Ordering::SeqCst);
        let _ = self.tx.send(event);
    }

    /// Publishes events in order.
    pub fn publish_all(&self, events: impl IntoIterator<Item = CuratorEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Subscribes to every future event.
    pub fn subscribe(&self) -> broadcast::Receiver<CuratorEvent> {
        self.tx.subscribe()
    }

    /// Number of events published so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn publish_without_subscribers_still_counts() {
        let bus = EventBus::new(4);
        bus.publish(CuratorEvent::AssetListReset);
        assert_eq!(bus.revision(), 1);
    }

    #[test]
    fn subscribers_see_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let guid = Guid::from_u128(5);
        bus.publish_all([
            CuratorEvent::AssetAdded(guid),
            CuratorEvent::StateChanged {
                guid,
                old: TransformState::Unknown,
                new: TransformState::NeedsTransform,
            },
        ]);

        assert_eq!(rx.try_recv().unwrap(), CuratorEvent::AssetAdded(guid));
        assert!(matches!(
            rx.try_recv().unwrap(),
            CuratorEvent::StateChanged {
                new: TransformState::NeedsTransform,
                ..
            }
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(bus.revision(), 2);
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new(16);
        bus.publish(CuratorEvent::ActivePlatformChanged);
        let mut rx = bus.subscribe();
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn lagged_subscriber_gets_error() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..10 {
            bus.publish(CuratorEvent::AssetUpdated(Guid::from_u128(i + 1)));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
    }
}
