//! WebSocket signaling channel.
//!
//! One persistent connection per browser client, multiplexing the
//! orchestrator's operations as request/response frames and forwarding
//! producer-availability events in between.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, StreamExt};
use serde::Serialize;
use tracing::{info, warn};

use relay_engine::{ChannelId, SessionOrchestrator};
use relay_protocol::{
    RequestFrame, ResponseFrame, SignalError, SignalEvent, SignalRequest, SignalResponse,
    TransportRole,
};

use crate::AppState;

/// Upgrade handler for the signaling endpoint.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_channel(socket, state))
}

async fn handle_channel(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut subscription = state.orchestrator.subscribe();
    let channel = subscription.id();
    info!(%channel, "signaling channel connected");

    // Late-joiner replay: both producer transports already exist, so this
    // channel gets the availability event at connect time.
    if state.orchestrator.is_producer_ready()
        && send_json(&mut sink, &SignalEvent::ProducerAvailable)
            .await
            .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(response) =
                        dispatch(&state.orchestrator, channel, text.as_str()).await
                    else {
                        continue;
                    };
                    if send_json(&mut sink, &response).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%channel, "signaling channel error: {e}");
                    break;
                }
            },
            event = subscription.recv() => match event {
                Some(event) => {
                    if send_json(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    info!(%channel, "signaling channel disconnected");
}

async fn send_json<T: Serialize>(
    sink: &mut SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(payload).expect("wire types serialize to JSON");
    sink.send(Message::Text(text.into())).await
}

/// Parse one request frame and run it. Returns `None` when the frame is
/// malformed beyond recovering a correlation id.
async fn dispatch(
    orchestrator: &SessionOrchestrator,
    channel: ChannelId,
    text: &str,
) -> Option<ResponseFrame> {
    let frame: RequestFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%channel, "malformed request: {e}");
            let id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64));
            return id.map(|id| {
                ResponseFrame::error(id, &SignalError::BadRequest(e.to_string()))
            });
        }
    };

    Some(match handle_request(orchestrator, channel, frame.request).await {
        Ok(response) => ResponseFrame::ok(frame.id, response),
        Err(error) => {
            warn!(%channel, id = frame.id, "request failed: {error}");
            ResponseFrame::error(frame.id, &error)
        }
    })
}

/// Map one protocol method onto the orchestrator.
async fn handle_request(
    orchestrator: &SessionOrchestrator,
    channel: ChannelId,
    request: SignalRequest,
) -> Result<SignalResponse, SignalError> {
    match request {
        SignalRequest::GetRouterCapabilities => orchestrator
            .router_capabilities()
            .await
            .map(SignalResponse::RouterCapabilities),
        SignalRequest::CreateProducerTransport { kind } => orchestrator
            .create_transport(TransportRole::Producer, kind)
            .await
            .map(SignalResponse::TransportCreated),
        SignalRequest::ConnectProducerTransport {
            kind,
            dtls_parameters,
        } => orchestrator
            .connect_transport(TransportRole::Producer, kind, dtls_parameters)
            .await
            .map(|_| SignalResponse::ack()),
        // Transports are addressed by kind; the id in the request is
        // informational only.
        SignalRequest::Produce {
            kind,
            rtp_parameters,
            ..
        } => orchestrator
            .produce(channel, kind, rtp_parameters)
            .await
            .map(|id| SignalResponse::Produced { id }),
        SignalRequest::CreateConsumerTransport { kind } => orchestrator
            .create_transport(TransportRole::Consumer, kind)
            .await
            .map(SignalResponse::TransportCreated),
        SignalRequest::ConnectConsumerTransport {
            kind,
            dtls_parameters,
        } => orchestrator
            .connect_transport(TransportRole::Consumer, kind, dtls_parameters)
            .await
            .map(|_| SignalResponse::ack()),
        SignalRequest::Consume {
            kind,
            rtp_capabilities,
        } => orchestrator
            .consume(kind, rtp_capabilities)
            .await
            .map(SignalResponse::Consumed),
        SignalRequest::Resume { kind } => orchestrator
            .resume(kind)
            .await
            .map(|_| SignalResponse::ack()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_engine::EngineConfig;
    use relay_media::mock::MockEngine;
    use relay_protocol::SignalEvent;

    use super::*;

    fn orchestrator() -> SessionOrchestrator {
        SessionOrchestrator::new(Arc::new(MockEngine::new()), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_dispatch_capabilities() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();

        let response = dispatch(&orch, channel, r#"{"id":1,"method":"get-router-capabilities"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, 1);
        assert!(response.error.is_none());
        assert!(matches!(
            response.ok,
            Some(SignalResponse::RouterCapabilities(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_with_id() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();

        let response = dispatch(&orch, channel, r#"{"id":5,"method":"no-such-method"}"#)
            .await
            .unwrap();
        assert_eq!(response.id, 5);
        assert!(response.error.unwrap().starts_with("malformed request"));
    }

    #[tokio::test]
    async fn test_dispatch_malformed_without_id_is_dropped() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();

        assert!(dispatch(&orch, channel, "not json").await.is_none());
        assert!(dispatch(&orch, channel, r#"{"method":"resume"}"#).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_failure_carries_message() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();

        let response = dispatch(
            &orch,
            channel,
            r#"{"id":2,"method":"consume","kind":"video","rtpCapabilities":{}}"#,
        )
        .await
        .unwrap();
        assert_eq!(response.error.as_deref(), Some("no video producer exists"));
    }

    #[tokio::test]
    async fn test_produce_fans_out_to_other_channel() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();
        let mut other = orch.subscribe();

        for request in [
            r#"{"id":1,"method":"create-producer-transport","kind":"video"}"#,
            r#"{"id":2,"method":"connect-producer-transport","kind":"video","dtlsParameters":{}}"#,
            r#"{"id":3,"method":"produce","transportId":"t","kind":"video","rtpParameters":{}}"#,
        ] {
            let response = dispatch(&orch, channel, request).await.unwrap();
            assert!(response.error.is_none(), "{request} failed");
        }

        assert_eq!(other.try_recv(), Some(SignalEvent::ProducerAvailable));
    }

    #[tokio::test]
    async fn test_consumer_transport_routes_to_consumer_slot() {
        let orch = orchestrator();
        let channel = orch.subscribe().id();

        let response = dispatch(
            &orch,
            channel,
            r#"{"id":1,"method":"create-consumer-transport","kind":"audio"}"#,
        )
        .await
        .unwrap();
        assert!(response.error.is_none());
        // Consumer slots do not satisfy the producer-readiness check.
        assert!(!orch.is_producer_ready());
    }
}
