//! Requests sent from a browser client to the relay.

use serde::{Deserialize, Serialize};

use crate::types::{DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, TransportId};

/// Signaling methods a client can invoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalRequest {
    /// Fetch the router's RTP capability set.
    GetRouterCapabilities,

    /// Create the producer transport for a kind.
    CreateProducerTransport { kind: MediaKind },

    /// Complete the DTLS handshake on the producer transport for a kind.
    ConnectProducerTransport {
        kind: MediaKind,
        dtls_parameters: DtlsParameters,
    },

    /// Attach a media source to the connected producer transport.
    Produce {
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },

    /// Create the consumer transport for a kind.
    CreateConsumerTransport { kind: MediaKind },

    /// Complete the DTLS handshake on the consumer transport for a kind.
    ConnectConsumerTransport {
        kind: MediaKind,
        dtls_parameters: DtlsParameters,
    },

    /// Attach a media sink for the kind's producer.
    Consume {
        kind: MediaKind,
        rtp_capabilities: RtpCapabilities,
    },

    /// Resume the consumer for a kind.
    Resume { kind: MediaKind },
}

/// A request as framed on the signaling channel.
///
/// The client picks the correlation id; the response echoes it back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Client-chosen correlation id.
    pub id: u64,

    /// The invoked method and its payload.
    #[serde(flatten)]
    pub request: SignalRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_method_names() {
        let frame: RequestFrame = serde_json::from_str(
            r#"{"id":7,"method":"create-producer-transport","kind":"video"}"#,
        )
        .unwrap();
        assert_eq!(frame.id, 7);
        assert_eq!(
            frame.request,
            SignalRequest::CreateProducerTransport {
                kind: MediaKind::Video
            }
        );
    }

    #[test]
    fn test_request_camel_case_fields() {
        let frame: RequestFrame = serde_json::from_str(
            r#"{"id":1,"method":"consume","kind":"audio","rtpCapabilities":{"codecs":[]}}"#,
        )
        .unwrap();
        match frame.request {
            SignalRequest::Consume { kind, .. } => assert_eq!(kind, MediaKind::Audio),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_request_without_payload() {
        let frame: RequestFrame =
            serde_json::from_str(r#"{"id":0,"method":"get-router-capabilities"}"#).unwrap();
        assert_eq!(frame.request, SignalRequest::GetRouterCapabilities);
    }
}
