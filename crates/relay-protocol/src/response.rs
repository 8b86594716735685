//! Responses and events sent from the relay to a browser client.

use serde::{Deserialize, Serialize};

use crate::error::SignalError;
use crate::types::{ConsumerInfo, ProducerId, RtpCapabilities, TransportConnectInfo};

/// Success payloads of the signaling methods.
///
/// Untagged: variants are tried in declaration order when deserializing, so
/// the catch-all capability blob must stay after the structured payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalResponse {
    /// Connection parameters for a freshly created transport.
    TransportCreated(TransportConnectInfo),

    /// Payload of a successful consume.
    Consumed(ConsumerInfo),

    /// Identifier of a freshly created producer.
    Produced { id: ProducerId },

    /// The router's RTP capability set.
    RouterCapabilities(RtpCapabilities),

    /// Bare acknowledgement.
    Ack {},
}

impl SignalResponse {
    /// Bare acknowledgement payload.
    pub fn ack() -> Self {
        Self::Ack {}
    }
}

/// Fire-and-forget notifications fanned out to signaling channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SignalEvent {
    /// A producer came up; consumers may now subscribe.
    ProducerAvailable,
}

/// A response as framed on the signaling channel.
///
/// Exactly one of `ok` and `error` is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Correlation id echoed from the request.
    pub id: u64,

    /// Success payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<SignalResponse>,

    /// Rendered failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    /// Build a success frame.
    pub fn ok(id: u64, response: SignalResponse) -> Self {
        Self {
            id,
            ok: Some(response),
            error: None,
        }
    }

    /// Build a failure frame from a signaling error.
    pub fn error(id: u64, error: &SignalError) -> Self {
        Self {
            id,
            ok: None,
            error: Some(error.to_string()),
        }
    }
}
