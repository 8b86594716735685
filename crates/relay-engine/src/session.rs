//! The session orchestrator.
//!
//! Validates each protocol request against the per-slot state machine,
//! drives the registry through the engine client, and publishes producer
//! availability. Engine calls are never retried; their faults come back on
//! the single request that issued them.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use relay_media::{
    MediaEngine, RouterSettings, TransportSettings, WorkerSettings,
};
use relay_protocol::{
    ConsumerInfo, ConsumerType, DtlsParameters, MediaKind, ProducerId, RtpCapabilities,
    RtpParameters, SignalError, SignalEvent, SlotState, TransportConnectInfo, TransportRole,
};

use crate::client::EngineClient;
use crate::notify::{ChannelId, ProducerNotifier, Subscription};
use crate::registry::TransportRegistry;

/// Default simulcast layer selection applied to new simulcast consumers.
const DEFAULT_SPATIAL_LAYER: u8 = 2;
const DEFAULT_TEMPORAL_LAYER: u8 = 2;

/// Engine settings handed to the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker process settings.
    pub worker: WorkerSettings,

    /// Router settings.
    pub router: RouterSettings,

    /// Per-transport settings.
    pub transport: TransportSettings,
}

/// Orchestrates one signaling session's worth of engine state.
///
/// The registry holds exactly four transport slots, so a process running one
/// orchestrator supports one active producer/consumer session set; channels
/// connected at the same time share (and race for) those slots.
pub struct SessionOrchestrator {
    client: EngineClient,
    registry: TransportRegistry,
    transport_settings: TransportSettings,
    notifier: ProducerNotifier,
}

impl SessionOrchestrator {
    pub fn new(engine: Arc<dyn MediaEngine>, config: EngineConfig) -> Self {
        Self {
            client: EngineClient::new(engine, config.worker, config.router),
            registry: TransportRegistry::new(),
            transport_settings: config.transport,
            notifier: ProducerNotifier::new(),
        }
    }

    /// Create the worker eagerly at startup.
    pub async fn ensure_worker(&self) -> Result<(), SignalError> {
        self.client.ensure_worker().await?;
        Ok(())
    }

    /// Register a signaling channel with the availability topic.
    pub fn subscribe(&self) -> Subscription {
        self.notifier.subscribe()
    }

    /// The router's RTP capability set, creating the router on first call.
    #[instrument(name = "router_capabilities", skip(self))]
    pub async fn router_capabilities(&self) -> Result<RtpCapabilities, SignalError> {
        let router = self.client.ensure_router().await?;
        Ok(router.rtp_capabilities())
    }

    /// Create the transport for a slot and return its connection parameters.
    #[instrument(name = "create_transport", skip(self))]
    pub async fn create_transport(
        &self,
        role: TransportRole,
        kind: MediaKind,
    ) -> Result<TransportConnectInfo, SignalError> {
        let router = self.client.ensure_router().await?;
        info!(%role, %kind, "creating transport");
        let transport = router.create_transport(&self.transport_settings).await?;

        // Best effort: a refused cap downgrades the transport, not the call.
        if let Some(bitrate) = self.transport_settings.max_incoming_bitrate {
            if let Err(e) = transport.set_max_incoming_bitrate(bitrate).await {
                warn!(%role, %kind, "failed to apply incoming bitrate cap: {e}");
            }
        }

        let info = TransportConnectInfo {
            id: transport.id(),
            ice_parameters: transport.ice_parameters(),
            ice_candidates: transport.ice_candidates(),
            dtls_parameters: transport.dtls_parameters(),
        };
        self.registry.store_transport(role, kind, transport);
        info!(%role, %kind, "transport created");
        Ok(info)
    }

    /// Complete the DTLS handshake for a slot.
    #[instrument(name = "connect_transport", skip(self, dtls_parameters))]
    pub async fn connect_transport(
        &self,
        role: TransportRole,
        kind: MediaKind,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), SignalError> {
        let (transport, state) = self
            .registry
            .transport(role, kind)
            .ok_or(SignalError::TransportMissing { role, kind })?;
        if state != SlotState::Created {
            return Err(SignalError::InvalidState {
                role,
                kind,
                expected: SlotState::Created,
                actual: state,
            });
        }
        transport.connect(dtls_parameters).await?;
        self.registry.set_slot_state(role, kind, SlotState::Connected);
        info!(%role, %kind, "transport connected");
        Ok(())
    }

    /// Attach a media source to the connected producer transport for `kind`
    /// and announce availability to every channel but `origin`.
    #[instrument(name = "produce", skip(self, rtp_parameters))]
    pub async fn produce(
        &self,
        origin: ChannelId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId, SignalError> {
        let role = TransportRole::Producer;
        let (transport, state) = self
            .registry
            .transport(role, kind)
            .ok_or(SignalError::TransportMissing { role, kind })?;
        if !state.is_connected() {
            return Err(SignalError::InvalidState {
                role,
                kind,
                expected: SlotState::Connected,
                actual: state,
            });
        }
        let producer = transport.produce(kind, rtp_parameters).await?;
        let id = producer.id();
        self.registry.store_producer(kind, producer);
        self.registry.set_slot_state(role, kind, SlotState::Active);
        info!(%kind, producer = %id.0, "producer created");
        self.notifier.publish(origin, SignalEvent::ProducerAvailable);
        Ok(id)
    }

    /// Attach a media sink for the kind's producer to the connected consumer
    /// transport. Video consumers start paused.
    #[instrument(name = "consume", skip(self, rtp_capabilities))]
    pub async fn consume(
        &self,
        kind: MediaKind,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerInfo, SignalError> {
        let role = TransportRole::Consumer;
        let producer = self
            .registry
            .producer(kind)
            .ok_or(SignalError::ProducerMissing { kind })?;
        let producer_id = producer.id();

        let router = self.client.ensure_router().await?;
        if !router.can_consume(&producer_id, &rtp_capabilities).await? {
            warn!(%kind, "cannot consume");
            return Err(SignalError::CannotConsume { kind });
        }

        let (transport, state) = self
            .registry
            .transport(role, kind)
            .ok_or(SignalError::TransportMissing { role, kind })?;
        if !state.is_connected() {
            return Err(SignalError::InvalidState {
                role,
                kind,
                expected: SlotState::Connected,
                actual: state,
            });
        }

        let consumer = transport
            .consume(
                producer_id.clone(),
                rtp_capabilities,
                kind == MediaKind::Video,
            )
            .await?;
        if consumer.consumer_type() == ConsumerType::Simulcast {
            consumer
                .set_preferred_layers(DEFAULT_SPATIAL_LAYER, DEFAULT_TEMPORAL_LAYER)
                .await?;
        }

        let info = ConsumerInfo {
            producer_id,
            id: consumer.id(),
            kind: consumer.kind(),
            rtp_parameters: consumer.rtp_parameters(),
            consumer_type: consumer.consumer_type(),
            producer_paused: consumer.producer_paused(),
        };
        self.registry.store_consumer(kind, consumer);
        self.registry.set_slot_state(role, kind, SlotState::Active);
        info!(%kind, consumer = %info.id.0, "consumer created");
        Ok(info)
    }

    /// Resume the consumer for `kind`. Resuming an unpaused consumer is a
    /// successful no-op.
    #[instrument(name = "resume", skip(self))]
    pub async fn resume(&self, kind: MediaKind) -> Result<(), SignalError> {
        let consumer = self
            .registry
            .consumer(kind)
            .ok_or(SignalError::ConsumerMissing { kind })?;
        consumer.resume().await?;
        info!(%kind, "consumer resumed");
        Ok(())
    }

    /// Whether both producer transports exist. This is an approximation of
    /// availability: it says nothing about Producers or flowing media.
    pub fn is_producer_ready(&self) -> bool {
        self.registry
            .has_transport(TransportRole::Producer, MediaKind::Video)
            && self
                .registry
                .has_transport(TransportRole::Producer, MediaKind::Audio)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use serde_json::json;

    use relay_media::mock::{MockEngine, MockState};
    use relay_media::{MediaConsumer as _, MediaTransport as _};

    use super::*;

    fn orchestrator() -> (SessionOrchestrator, Arc<MockState>) {
        orchestrator_with(EngineConfig::default())
    }

    fn orchestrator_with(config: EngineConfig) -> (SessionOrchestrator, Arc<MockState>) {
        let engine = MockEngine::new();
        let state = engine.state();
        (SessionOrchestrator::new(Arc::new(engine), config), state)
    }

    fn caps() -> RtpCapabilities {
        RtpCapabilities(json!({ "codecs": [] }))
    }

    fn rtp() -> RtpParameters {
        RtpParameters(json!({ "codecs": [], "encodings": [] }))
    }

    fn dtls() -> DtlsParameters {
        DtlsParameters(json!({ "role": "client", "fingerprints": [] }))
    }

    async fn publish(orch: &SessionOrchestrator, kind: MediaKind) -> ProducerId {
        let origin = orch.subscribe().id();
        orch.create_transport(TransportRole::Producer, kind)
            .await
            .unwrap();
        orch.connect_transport(TransportRole::Producer, kind, dtls())
            .await
            .unwrap();
        orch.produce(origin, kind, rtp()).await.unwrap()
    }

    async fn open_consumer_transport(orch: &SessionOrchestrator, kind: MediaKind) {
        orch.create_transport(TransportRole::Consumer, kind)
            .await
            .unwrap();
        orch.connect_transport(TransportRole::Consumer, kind, dtls())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_capabilities_are_idempotent() {
        let (orch, state) = orchestrator();

        let first = orch.router_capabilities().await.unwrap();
        for _ in 0..4 {
            assert_eq!(orch.router_capabilities().await.unwrap(), first);
        }
        assert_eq!(state.routers_created.load(Ordering::SeqCst), 1);
        assert_eq!(state.workers_created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_consume_before_produce_is_typed_failure() {
        let (orch, _) = orchestrator();

        let err = orch.consume(MediaKind::Video, caps()).await.unwrap_err();
        assert_eq!(
            err,
            SignalError::ProducerMissing {
                kind: MediaKind::Video
            }
        );
    }

    #[tokio::test]
    async fn test_consume_rejected_by_capability_check() {
        let (orch, state) = orchestrator();
        publish(&orch, MediaKind::Video).await;
        open_consumer_transport(&orch, MediaKind::Video).await;

        state.can_consume.store(false, Ordering::SeqCst);
        let err = orch.consume(MediaKind::Video, caps()).await.unwrap_err();
        assert_eq!(
            err,
            SignalError::CannotConsume {
                kind: MediaKind::Video
            }
        );
    }

    #[tokio::test]
    async fn test_video_consumer_starts_paused_audio_does_not() {
        let (orch, state) = orchestrator();
        publish(&orch, MediaKind::Video).await;
        publish(&orch, MediaKind::Audio).await;
        open_consumer_transport(&orch, MediaKind::Video).await;
        open_consumer_transport(&orch, MediaKind::Audio).await;

        orch.consume(MediaKind::Video, caps()).await.unwrap();
        orch.consume(MediaKind::Audio, caps()).await.unwrap();

        let consumers = state.consumers.lock();
        let video = consumers.iter().find(|c| c.kind() == MediaKind::Video).unwrap();
        let audio = consumers.iter().find(|c| c.kind() == MediaKind::Audio).unwrap();
        assert!(video.paused.load(Ordering::SeqCst));
        assert!(!audio.paused.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_consume_reports_producer_not_paused() {
        let (orch, _) = orchestrator();
        publish(&orch, MediaKind::Video).await;
        open_consumer_transport(&orch, MediaKind::Video).await;

        let info = orch.consume(MediaKind::Video, caps()).await.unwrap();
        assert_eq!(info.kind, MediaKind::Video);
        assert!(!info.producer_paused);
    }

    #[tokio::test]
    async fn test_simulcast_consumer_gets_default_layers() {
        let (orch, state) = orchestrator();
        *state.consumer_type.lock() = ConsumerType::Simulcast;
        publish(&orch, MediaKind::Video).await;
        open_consumer_transport(&orch, MediaKind::Video).await;

        let info = orch.consume(MediaKind::Video, caps()).await.unwrap();
        assert_eq!(info.consumer_type, ConsumerType::Simulcast);

        let consumers = state.consumers.lock();
        assert_eq!(*consumers[0].preferred_layers.lock(), Some((2, 2)));
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let (orch, state) = orchestrator();
        publish(&orch, MediaKind::Audio).await;
        open_consumer_transport(&orch, MediaKind::Audio).await;
        orch.consume(MediaKind::Audio, caps()).await.unwrap();

        orch.resume(MediaKind::Audio).await.unwrap();
        orch.resume(MediaKind::Audio).await.unwrap();

        let consumers = state.consumers.lock();
        assert!(!consumers[0].paused.load(Ordering::SeqCst));
        assert_eq!(consumers[0].resume_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resume_without_consumer_is_typed_failure() {
        let (orch, _) = orchestrator();
        let err = orch.resume(MediaKind::Video).await.unwrap_err();
        assert_eq!(
            err,
            SignalError::ConsumerMissing {
                kind: MediaKind::Video
            }
        );
    }

    #[tokio::test]
    async fn test_connect_before_create_is_typed_failure() {
        let (orch, _) = orchestrator();
        let err = orch
            .connect_transport(TransportRole::Producer, MediaKind::Video, dtls())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::TransportMissing {
                role: TransportRole::Producer,
                kind: MediaKind::Video
            }
        );
    }

    #[tokio::test]
    async fn test_produce_before_connect_is_typed_failure() {
        let (orch, _) = orchestrator();
        let origin = orch.subscribe().id();
        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();

        let err = orch
            .produce(origin, MediaKind::Video, rtp())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SignalError::InvalidState {
                role: TransportRole::Producer,
                kind: MediaKind::Video,
                expected: SlotState::Connected,
                actual: SlotState::Created,
            }
        );
    }

    #[tokio::test]
    async fn test_slot_overwrite_orphans_first_transport() {
        let (orch, state) = orchestrator();

        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        let second = orch
            .create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        orch.connect_transport(TransportRole::Producer, MediaKind::Video, dtls())
            .await
            .unwrap();

        let transports = state.transports.lock();
        assert_eq!(transports.len(), 2);
        // The first occupant is orphaned: nothing ever touches it again.
        assert_eq!(transports[0].connect_calls.load(Ordering::SeqCst), 0);
        assert_eq!(transports[1].connect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transports[1].id(), second.id);
    }

    #[tokio::test]
    async fn test_producer_ready_needs_both_transports_only() {
        let (orch, _) = orchestrator();
        assert!(!orch.is_producer_ready());

        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        assert!(!orch.is_producer_ready());

        orch.create_transport(TransportRole::Producer, MediaKind::Audio)
            .await
            .unwrap();
        // Ready with zero producers: existence of the two transports is all
        // the check looks at.
        assert!(orch.is_producer_ready());
    }

    #[tokio::test]
    async fn test_bitrate_cap_applied_when_configured() {
        let config = EngineConfig {
            transport: TransportSettings {
                max_incoming_bitrate: Some(1_500_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let (orch, state) = orchestrator_with(config);

        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        let transports = state.transports.lock();
        assert_eq!(*transports[0].max_incoming_bitrate.lock(), Some(1_500_000));
    }

    #[tokio::test]
    async fn test_bitrate_cap_failure_is_not_fatal() {
        let config = EngineConfig {
            transport: TransportSettings {
                max_incoming_bitrate: Some(1_500_000),
                ..Default::default()
            },
            ..Default::default()
        };
        let (orch, state) = orchestrator_with(config);
        state.fail_bitrate_cap.store(true, Ordering::SeqCst);

        // Creation still succeeds; the cap is simply absent.
        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        let transports = state.transports.lock();
        assert_eq!(*transports[0].max_incoming_bitrate.lock(), None);
    }

    #[tokio::test]
    async fn test_transport_creation_fault_is_engine_error() {
        let (orch, state) = orchestrator();
        state.fail_next_transport.store(true, Ordering::SeqCst);

        let err = orch
            .create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::Engine(_)));

        // The session stays usable: the next attempt succeeds.
        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_produce_notifies_other_channels_only() {
        let (orch, _) = orchestrator();
        let mut a = orch.subscribe();
        let mut b = orch.subscribe();

        orch.create_transport(TransportRole::Producer, MediaKind::Video)
            .await
            .unwrap();
        orch.connect_transport(TransportRole::Producer, MediaKind::Video, dtls())
            .await
            .unwrap();
        orch.produce(a.id(), MediaKind::Video, rtp()).await.unwrap();

        assert_eq!(b.try_recv(), Some(SignalEvent::ProducerAvailable));
        assert_eq!(a.try_recv(), None);
    }
}
