//! Engine object traits.
//!
//! These mirror the surface the orchestrator needs from the external SFU:
//! worker and router singletons, transports keyed by the caller, and the
//! producer/consumer objects attached to them. Negotiation payloads stay
//! opaque JSON end to end.

use std::sync::Arc;

use async_trait::async_trait;

use relay_protocol::{
    ConsumerId, ConsumerType, DtlsParameters, IceCandidates, IceParameters, MediaKind, ProducerId,
    RtpCapabilities, RtpParameters, TransportId,
};

use crate::settings::{RouterSettings, TransportSettings, WorkerSettings};
use crate::EngineResult;

/// Entry point to an SFU engine implementation.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Spawn or attach the engine worker.
    async fn create_worker(&self, settings: &WorkerSettings) -> EngineResult<Arc<dyn MediaWorker>>;
}

/// Process-level handle to the engine.
#[async_trait]
pub trait MediaWorker: Send + Sync {
    /// Worker identifier (the process id for real workers).
    fn pid(&self) -> u32;

    /// Create a router on this worker.
    async fn create_router(&self, settings: &RouterSettings) -> EngineResult<Arc<dyn MediaRouter>>;

    /// Resolves once with the reason when the worker reports a fatal fault.
    async fn died(&self) -> String;
}

/// Capability negotiation context bound to one worker.
#[async_trait]
pub trait MediaRouter: Send + Sync {
    /// The process-wide RTP capability set.
    fn rtp_capabilities(&self) -> RtpCapabilities;

    /// Whether a sink with the given capabilities can attach to the producer.
    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<bool>;

    /// Create a WebRTC transport endpoint.
    async fn create_transport(
        &self,
        settings: &TransportSettings,
    ) -> EngineResult<Arc<dyn MediaTransport>>;
}

/// A WebRTC transport endpoint for one (role, kind) slot.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    fn id(&self) -> TransportId;

    fn ice_parameters(&self) -> IceParameters;

    fn ice_candidates(&self) -> IceCandidates;

    fn dtls_parameters(&self) -> DtlsParameters;

    /// Apply an incoming-bitrate cap to this transport.
    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> EngineResult<()>;

    /// Complete the DTLS handshake with the peer's parameters.
    async fn connect(&self, dtls_parameters: DtlsParameters) -> EngineResult<()>;

    /// Attach a media source to this transport.
    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> EngineResult<Arc<dyn MediaProducer>>;

    /// Attach a media sink for the given producer to this transport.
    async fn consume(
        &self,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
        paused: bool,
    ) -> EngineResult<Arc<dyn MediaConsumer>>;
}

/// A media source attached to a producer transport.
pub trait MediaProducer: Send + Sync {
    fn id(&self) -> ProducerId;

    fn kind(&self) -> MediaKind;

    /// Whether the source itself is currently paused.
    fn paused(&self) -> bool;
}

/// A media sink attached to a consumer transport.
#[async_trait]
pub trait MediaConsumer: Send + Sync {
    fn id(&self) -> ConsumerId;

    fn kind(&self) -> MediaKind;

    /// RTP parameters the client needs to receive the track.
    fn rtp_parameters(&self) -> RtpParameters;

    /// How the engine built this consumer.
    fn consumer_type(&self) -> ConsumerType;

    /// Whether the upstream producer is paused.
    fn producer_paused(&self) -> bool;

    /// Whether this consumer is currently paused.
    fn paused(&self) -> bool;

    /// Select the preferred simulcast/SVC layers.
    async fn set_preferred_layers(&self, spatial: u8, temporal: u8) -> EngineResult<()>;

    /// Resume a paused consumer. Resuming an unpaused consumer is a no-op.
    async fn resume(&self) -> EngineResult<()>;
}
