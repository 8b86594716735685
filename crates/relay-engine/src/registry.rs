//! Session-scoped registry of live engine objects.
//!
//! Four transport slots keyed by (role, kind) plus per-kind producers and
//! consumers. Storage and lookup only: validation lives in the orchestrator.
//! Writes are last-writer-wins per key; a replaced transport is orphaned,
//! not closed. One registry holds exactly one session's worth of state, so
//! the single-session limitation is a property of whoever constructs it.

use std::sync::Arc;

use parking_lot::Mutex;

use relay_media::{MediaConsumer, MediaProducer, MediaTransport};
use relay_protocol::{MediaKind, SlotState, TransportRole};

struct TransportSlot {
    transport: Arc<dyn MediaTransport>,
    state: SlotState,
}

#[derive(Default)]
struct Slots {
    transports: [Option<TransportSlot>; 4],
    producers: [Option<Arc<dyn MediaProducer>>; 2],
    consumers: [Option<Arc<dyn MediaConsumer>>; 2],
}

fn slot_index(role: TransportRole, kind: MediaKind) -> usize {
    let role = match role {
        TransportRole::Producer => 0,
        TransportRole::Consumer => 1,
    };
    role * 2 + kind_index(kind)
}

fn kind_index(kind: MediaKind) -> usize {
    match kind {
        MediaKind::Video => 0,
        MediaKind::Audio => 1,
    }
}

/// The mutable heart of one signaling session.
#[derive(Default)]
pub struct TransportRegistry {
    // Never held across an engine await.
    slots: Mutex<Slots>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a transport in its slot, replacing (and orphaning) any previous
    /// occupant. The slot starts over in `Created`.
    pub fn store_transport(
        &self,
        role: TransportRole,
        kind: MediaKind,
        transport: Arc<dyn MediaTransport>,
    ) {
        self.slots.lock().transports[slot_index(role, kind)] = Some(TransportSlot {
            transport,
            state: SlotState::Created,
        });
    }

    /// Look up a slot's transport and its current state.
    pub fn transport(
        &self,
        role: TransportRole,
        kind: MediaKind,
    ) -> Option<(Arc<dyn MediaTransport>, SlotState)> {
        self.slots.lock().transports[slot_index(role, kind)]
            .as_ref()
            .map(|slot| (Arc::clone(&slot.transport), slot.state))
    }

    /// Advance a slot's state. A no-op if the slot is empty.
    pub fn set_slot_state(&self, role: TransportRole, kind: MediaKind, state: SlotState) {
        if let Some(slot) = self.slots.lock().transports[slot_index(role, kind)].as_mut() {
            slot.state = state;
        }
    }

    /// Whether a transport exists for the slot, in any state.
    pub fn has_transport(&self, role: TransportRole, kind: MediaKind) -> bool {
        self.slots.lock().transports[slot_index(role, kind)].is_some()
    }

    pub fn store_producer(&self, kind: MediaKind, producer: Arc<dyn MediaProducer>) {
        self.slots.lock().producers[kind_index(kind)] = Some(producer);
    }

    pub fn producer(&self, kind: MediaKind) -> Option<Arc<dyn MediaProducer>> {
        self.slots.lock().producers[kind_index(kind)]
            .as_ref()
            .map(Arc::clone)
    }

    pub fn store_consumer(&self, kind: MediaKind, consumer: Arc<dyn MediaConsumer>) {
        self.slots.lock().consumers[kind_index(kind)] = Some(consumer);
    }

    pub fn consumer(&self, kind: MediaKind) -> Option<Arc<dyn MediaConsumer>> {
        self.slots.lock().consumers[kind_index(kind)]
            .as_ref()
            .map(Arc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_media::mock::MockEngine;
    use relay_media::{MediaEngine, RouterSettings, TransportSettings, WorkerSettings};

    async fn transport(engine: &MockEngine) -> Arc<dyn MediaTransport> {
        let worker = engine.create_worker(&WorkerSettings::default()).await.unwrap();
        let router = worker.create_router(&RouterSettings::default()).await.unwrap();
        router
            .create_transport(&TransportSettings::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let engine = MockEngine::new();
        let registry = TransportRegistry::new();

        registry.store_transport(
            TransportRole::Producer,
            MediaKind::Video,
            transport(&engine).await,
        );
        registry.store_transport(
            TransportRole::Consumer,
            MediaKind::Video,
            transport(&engine).await,
        );

        assert!(registry.has_transport(TransportRole::Producer, MediaKind::Video));
        assert!(registry.has_transport(TransportRole::Consumer, MediaKind::Video));
        assert!(!registry.has_transport(TransportRole::Producer, MediaKind::Audio));
        assert!(!registry.has_transport(TransportRole::Consumer, MediaKind::Audio));
    }

    #[tokio::test]
    async fn test_overwrite_is_last_writer_wins() {
        let engine = MockEngine::new();
        let registry = TransportRegistry::new();

        let first = transport(&engine).await;
        let second = transport(&engine).await;
        registry.store_transport(TransportRole::Producer, MediaKind::Video, first);
        registry.set_slot_state(
            TransportRole::Producer,
            MediaKind::Video,
            SlotState::Connected,
        );
        registry.store_transport(
            TransportRole::Producer,
            MediaKind::Video,
            Arc::clone(&second),
        );

        let (held, state) = registry
            .transport(TransportRole::Producer, MediaKind::Video)
            .unwrap();
        assert_eq!(held.id(), second.id());
        // Overwriting resets the slot's lifecycle.
        assert_eq!(state, SlotState::Created);
    }
}
