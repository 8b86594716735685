//! In-memory engine for tests.
//!
//! Implements the full engine surface without any media plumbing. Every
//! constructed object is retained and every call counted so tests can assert
//! construction counts, routing decisions and pause state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use relay_protocol::{
    ConsumerId, ConsumerType, DtlsParameters, IceCandidates, IceParameters, MediaKind, ProducerId,
    RtpCapabilities, RtpParameters, TransportId,
};

use crate::engine::{
    MediaConsumer, MediaEngine, MediaProducer, MediaRouter, MediaTransport, MediaWorker,
};
use crate::settings::{RouterSettings, TransportSettings, WorkerSettings};
use crate::{EngineError, EngineResult};

/// Shared observable state of a [`MockEngine`].
pub struct MockState {
    /// Number of workers created so far.
    pub workers_created: AtomicUsize,

    /// Number of routers created so far.
    pub routers_created: AtomicUsize,

    /// Every transport ever created, in creation order.
    pub transports: Mutex<Vec<Arc<MockTransport>>>,

    /// Every consumer ever created, in creation order.
    pub consumers: Mutex<Vec<Arc<MockConsumer>>>,

    /// Answer the router gives to `can_consume`.
    pub can_consume: AtomicBool,

    /// Type reported by newly created consumers.
    pub consumer_type: Mutex<ConsumerType>,

    /// When set, the next transport creation fails once.
    pub fail_next_transport: AtomicBool,

    /// When set, applying a bitrate cap fails.
    pub fail_bitrate_cap: AtomicBool,

    producers: Mutex<HashMap<ProducerId, MediaKind>>,
    died_tx: watch::Sender<Option<String>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            workers_created: AtomicUsize::new(0),
            routers_created: AtomicUsize::new(0),
            transports: Mutex::new(Vec::new()),
            consumers: Mutex::new(Vec::new()),
            can_consume: AtomicBool::new(true),
            consumer_type: Mutex::new(ConsumerType::Simple),
            fail_next_transport: AtomicBool::new(false),
            fail_bitrate_cap: AtomicBool::new(false),
            producers: Mutex::new(HashMap::new()),
            died_tx: watch::channel(None).0,
        }
    }
}

/// In-memory [`MediaEngine`] implementation.
#[derive(Default)]
pub struct MockEngine {
    state: Arc<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the observable state, valid across all created objects.
    pub fn state(&self) -> Arc<MockState> {
        Arc::clone(&self.state)
    }

    /// Simulate a fatal worker fault.
    pub fn kill_worker(&self, reason: &str) {
        self.state.died_tx.send_replace(Some(reason.to_string()));
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_worker(
        &self,
        _settings: &WorkerSettings,
    ) -> EngineResult<Arc<dyn MediaWorker>> {
        self.state.workers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockWorker {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockWorker {
    state: Arc<MockState>,
}

#[async_trait]
impl MediaWorker for MockWorker {
    fn pid(&self) -> u32 {
        0
    }

    async fn create_router(
        &self,
        _settings: &RouterSettings,
    ) -> EngineResult<Arc<dyn MediaRouter>> {
        self.state.routers_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockRouter {
            state: Arc::clone(&self.state),
        }))
    }

    async fn died(&self) -> String {
        let mut rx = self.state.died_tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return "mock engine dropped".to_string();
            }
        }
    }
}

struct MockRouter {
    state: Arc<MockState>,
}

#[async_trait]
impl MediaRouter for MockRouter {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        RtpCapabilities(json!({
            "codecs": [
                { "kind": "audio", "mimeType": "audio/opus", "clockRate": 48000, "channels": 2 },
                { "kind": "video", "mimeType": "video/VP8", "clockRate": 90000 },
            ],
            "headerExtensions": [],
        }))
    }

    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        _rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<bool> {
        let known = self.state.producers.lock().contains_key(producer_id);
        Ok(known && self.state.can_consume.load(Ordering::SeqCst))
    }

    async fn create_transport(
        &self,
        _settings: &TransportSettings,
    ) -> EngineResult<Arc<dyn MediaTransport>> {
        if self.state.fail_next_transport.swap(false, Ordering::SeqCst) {
            return Err(EngineError::Request("transport creation refused".into()));
        }
        let transport = Arc::new(MockTransport::new(Arc::clone(&self.state)));
        self.state.transports.lock().push(Arc::clone(&transport));
        Ok(transport)
    }
}

/// Observable mock transport.
pub struct MockTransport {
    id: TransportId,

    /// Number of connect calls received.
    pub connect_calls: AtomicUsize,

    /// Whether connect completed.
    pub connected: AtomicBool,

    /// Last applied incoming-bitrate cap.
    pub max_incoming_bitrate: Mutex<Option<u32>>,

    state: Arc<MockState>,
}

impl MockTransport {
    fn new(state: Arc<MockState>) -> Self {
        Self {
            id: TransportId(Uuid::new_v4().to_string()),
            connect_calls: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
            max_incoming_bitrate: Mutex::new(None),
            state,
        }
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    fn id(&self) -> TransportId {
        self.id.clone()
    }

    fn ice_parameters(&self) -> IceParameters {
        IceParameters(json!({ "usernameFragment": "mock", "password": "mock", "iceLite": true }))
    }

    fn ice_candidates(&self) -> IceCandidates {
        IceCandidates(json!([
            { "foundation": "1", "ip": "127.0.0.1", "port": 40000, "protocol": "udp", "type": "host" }
        ]))
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        DtlsParameters(json!({ "role": "auto", "fingerprints": [] }))
    }

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> EngineResult<()> {
        if self.state.fail_bitrate_cap.load(Ordering::SeqCst) {
            return Err(EngineError::Request("bitrate cap rejected".into()));
        }
        *self.max_incoming_bitrate.lock() = Some(bitrate);
        Ok(())
    }

    async fn connect(&self, _dtls_parameters: DtlsParameters) -> EngineResult<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        _rtp_parameters: RtpParameters,
    ) -> EngineResult<Arc<dyn MediaProducer>> {
        let id = ProducerId(Uuid::new_v4().to_string());
        self.state.producers.lock().insert(id.clone(), kind);
        Ok(Arc::new(MockProducer { id, kind }))
    }

    async fn consume(
        &self,
        producer_id: ProducerId,
        _rtp_capabilities: RtpCapabilities,
        paused: bool,
    ) -> EngineResult<Arc<dyn MediaConsumer>> {
        let kind = self
            .state
            .producers
            .lock()
            .get(&producer_id)
            .copied()
            .ok_or_else(|| EngineError::Request("unknown producer".into()))?;
        let consumer = Arc::new(MockConsumer {
            id: ConsumerId(Uuid::new_v4().to_string()),
            kind,
            consumer_type: *self.state.consumer_type.lock(),
            paused: AtomicBool::new(paused),
            resume_calls: AtomicUsize::new(0),
            preferred_layers: Mutex::new(None),
        });
        self.state.consumers.lock().push(Arc::clone(&consumer));
        Ok(consumer)
    }
}

struct MockProducer {
    id: ProducerId,
    kind: MediaKind,
}

impl MediaProducer for MockProducer {
    fn id(&self) -> ProducerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn paused(&self) -> bool {
        false
    }
}

/// Observable mock consumer.
pub struct MockConsumer {
    id: ConsumerId,
    kind: MediaKind,
    consumer_type: ConsumerType,

    /// Current pause state.
    pub paused: AtomicBool,

    /// Number of resume calls received.
    pub resume_calls: AtomicUsize,

    /// Layers selected via `set_preferred_layers`.
    pub preferred_layers: Mutex<Option<(u8, u8)>>,
}

#[async_trait]
impl MediaConsumer for MockConsumer {
    fn id(&self) -> ConsumerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> RtpParameters {
        RtpParameters(json!({ "codecs": [], "encodings": [{ "ssrc": 1 }] }))
    }

    fn consumer_type(&self) -> ConsumerType {
        self.consumer_type
    }

    fn producer_paused(&self) -> bool {
        false
    }

    fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    async fn set_preferred_layers(&self, spatial: u8, temporal: u8) -> EngineResult<()> {
        *self.preferred_layers.lock() = Some((spatial, temporal));
        Ok(())
    }

    async fn resume(&self) -> EngineResult<()> {
        self.resume_calls.fetch_add(1, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaEngine as _;

    #[tokio::test]
    async fn test_kill_worker_resolves_died() {
        let engine = MockEngine::new();
        let worker = engine
            .create_worker(&WorkerSettings::default())
            .await
            .unwrap();

        engine.kill_worker("out of memory");
        assert_eq!(worker.died().await, "out of memory");
    }
}
