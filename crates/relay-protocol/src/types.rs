//! Common types used across signaling messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Media kind carried by a transport, producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Video track.
    Video,

    /// Audio track.
    Audio,
}

impl MediaKind {
    /// Returns the wire name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical role of a transport slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportRole {
    /// Sends media into the relay.
    Producer,

    /// Receives media from the relay.
    Consumer,
}

impl TransportRole {
    /// Returns the wire name for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for TransportRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine-assigned transport identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportId(pub String);

/// Engine-assigned producer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProducerId(pub String);

/// Engine-assigned consumer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsumerId(pub String);

/// RTP capability set, passed through to the engine verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub serde_json::Value);

/// RTP parameters for a producer or consumer, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub serde_json::Value);

/// DTLS handshake parameters, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DtlsParameters(pub serde_json::Value);

/// ICE parameters of a transport, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceParameters(pub serde_json::Value);

/// ICE candidate list of a transport, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidates(pub serde_json::Value);

/// How the engine built a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    /// Single encoding.
    Simple,

    /// Multiple spatial encodings.
    Simulcast,

    /// Scalable video coding.
    Svc,

    /// Server-side pipe.
    Pipe,
}

/// Connection parameters returned from a transport creation request.
///
/// The caller completes its own side of the handshake with these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConnectInfo {
    /// Transport identifier.
    pub id: TransportId,

    /// ICE parameters of the relay side.
    pub ice_parameters: IceParameters,

    /// ICE candidates of the relay side.
    pub ice_candidates: IceCandidates,

    /// DTLS parameters of the relay side.
    pub dtls_parameters: DtlsParameters,
}

/// Payload returned from a successful consume request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfo {
    /// Producer this consumer is bound to.
    pub producer_id: ProducerId,

    /// Consumer identifier.
    pub id: ConsumerId,

    /// Media kind of the consumed track.
    pub kind: MediaKind,

    /// RTP parameters the client needs to receive the track.
    pub rtp_parameters: RtpParameters,

    /// How the engine built the consumer.
    #[serde(rename = "type")]
    pub consumer_type: ConsumerType,

    /// Whether the upstream producer is itself paused.
    pub producer_paused: bool,
}
