//! JSON-RPC client for the external SFU worker process.
//!
//! The worker executable owns all media routing; this module only spawns it
//! and sequences requests over its stdio. Framing is one JSON object per
//! line in each direction: requests carry `{id, method, data}`, replies
//! `{id, ok}` or `{id, error}`, and unsolicited notifications `{event, data}`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use relay_protocol::{
    ConsumerId, ConsumerType, DtlsParameters, IceCandidates, IceParameters, MediaKind, ProducerId,
    RtpCapabilities, RtpParameters, TransportId,
};

use crate::engine::{
    MediaConsumer, MediaEngine, MediaProducer, MediaRouter, MediaTransport, MediaWorker,
};
use crate::settings::{RouterSettings, TransportSettings, WorkerSettings};
use crate::{EngineError, EngineResult};

/// Engine implementation backed by an external worker process.
#[derive(Debug, Default)]
pub struct WorkerProcessEngine;

impl WorkerProcessEngine {
    /// Create the engine entry point. Nothing is spawned until
    /// [`MediaEngine::create_worker`] is called.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaEngine for WorkerProcessEngine {
    async fn create_worker(&self, settings: &WorkerSettings) -> EngineResult<Arc<dyn MediaWorker>> {
        let worker = ProcessWorker::spawn(settings)?;
        Ok(Arc::new(worker))
    }
}

/// A request as written to the worker's stdin.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    id: u64,
    method: &'a str,
    data: Value,
}

/// Any line read from the worker's stdout: a reply when `id` is present,
/// otherwise a notification.
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Shared RPC plumbing between all handles of one worker.
struct WorkerRpc {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>,
    line_tx: mpsc::UnboundedSender<String>,
    died_tx: watch::Sender<Option<String>>,
}

impl WorkerRpc {
    fn new(line_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            line_tx,
            died_tx: watch::channel(None).0,
        }
    }

    /// Issue one request and wait for its reply.
    async fn request(&self, method: &str, data: Value) -> EngineResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let line = serde_json::to_string(&WireRequest { id, method, data })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        if self.line_tx.send(line).is_err() {
            self.pending.lock().remove(&id);
            return Err(EngineError::ChannelClosed);
        }

        match rx.await {
            Ok(Ok(ok)) => Ok(ok),
            Ok(Err(message)) => Err(EngineError::Request(message)),
            Err(_) => Err(EngineError::ChannelClosed),
        }
    }

    /// Route one stdout line to its pending request or the fault watcher.
    fn handle_line(&self, line: &str) {
        let message: WireMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("unparseable worker line: {e}");
                return;
            }
        };

        if let Some(id) = message.id {
            let Some(tx) = self.pending.lock().remove(&id) else {
                warn!(id, "worker reply without pending request");
                return;
            };
            let result = match message.error {
                Some(error) => Err(error),
                None => Ok(message.ok.unwrap_or(Value::Null)),
            };
            let _ = tx.send(result);
            return;
        }

        match message.event.as_deref() {
            Some("died") => {
                let reason = message
                    .data
                    .as_ref()
                    .and_then(|d| d.get("reason"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown fault")
                    .to_string();
                self.mark_died(reason);
            }
            Some(event) => debug!(event, "unhandled worker notification"),
            None => warn!("worker line is neither reply nor notification"),
        }
    }

    /// Record the fatal fault once and fail everything still in flight.
    fn mark_died(&self, reason: String) {
        let newly_dead = {
            let mut dead = false;
            self.died_tx.send_if_modified(|current| {
                if current.is_none() {
                    *current = Some(reason.clone());
                    dead = true;
                }
                dead
            });
            dead
        };
        if !newly_dead {
            return;
        }
        let pending = std::mem::take(&mut *self.pending.lock());
        for (_, tx) in pending {
            let _ = tx.send(Err(format!("worker died: {reason}")));
        }
    }
}

async fn read_loop(stdout: ChildStdout, rpc: Arc<WorkerRpc>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => rpc.handle_line(&line),
            Ok(None) => break,
            Err(e) => {
                warn!("worker stdout read failed: {e}");
                break;
            }
        }
    }
    rpc.mark_died("worker stdio closed".to_string());
}

async fn write_loop(mut stdin: ChildStdin, mut line_rx: mpsc::UnboundedReceiver<String>) {
    while let Some(mut line) = line_rx.recv().await {
        line.push('\n');
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            warn!("worker stdin write failed: {e}");
            break;
        }
        if let Err(e) = stdin.flush().await {
            warn!("worker stdin flush failed: {e}");
            break;
        }
    }
}

/// Live handle to a spawned worker process.
struct ProcessWorker {
    rpc: Arc<WorkerRpc>,
    pid: u32,
    // Held so the process is killed when the last handle drops.
    _child: Mutex<Child>,
}

impl ProcessWorker {
    fn spawn(settings: &WorkerSettings) -> EngineResult<Self> {
        let mut child = Command::new(&settings.executable)
            .arg(format!("--log-level={}", settings.log_level))
            .arg(format!("--rtc-min-port={}", settings.rtc_min_port))
            .arg(format!("--rtc-max-port={}", settings.rtc_max_port))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("worker stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Spawn("worker stdout unavailable".to_string()))?;
        let pid = child.id().unwrap_or_default();

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        let rpc = Arc::new(WorkerRpc::new(line_tx));

        tokio::spawn(read_loop(stdout, Arc::clone(&rpc)));
        tokio::spawn(write_loop(stdin, line_rx));

        info!(pid, "worker process spawned");
        Ok(Self {
            rpc,
            pid,
            _child: Mutex::new(child),
        })
    }
}

#[async_trait]
impl MediaWorker for ProcessWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn create_router(&self, settings: &RouterSettings) -> EngineResult<Arc<dyn MediaRouter>> {
        let ok = self
            .rpc
            .request(
                "worker.createRouter",
                json!({ "mediaCodecs": settings.media_codecs }),
            )
            .await?;
        let reply: RouterReply = parse_reply(ok)?;
        Ok(Arc::new(ProcessRouter {
            rpc: Arc::clone(&self.rpc),
            id: reply.id,
            rtp_capabilities: RtpCapabilities(reply.rtp_capabilities),
        }))
    }

    async fn died(&self) -> String {
        let mut rx = self.rpc.died_tx.subscribe();
        loop {
            if let Some(reason) = rx.borrow().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                return "worker handle dropped".to_string();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouterReply {
    id: String,
    rtp_capabilities: Value,
}

struct ProcessRouter {
    rpc: Arc<WorkerRpc>,
    id: String,
    rtp_capabilities: RtpCapabilities,
}

#[async_trait]
impl MediaRouter for ProcessRouter {
    fn rtp_capabilities(&self) -> RtpCapabilities {
        self.rtp_capabilities.clone()
    }

    async fn can_consume(
        &self,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> EngineResult<bool> {
        let ok = self
            .rpc
            .request(
                "router.canConsume",
                json!({
                    "routerId": self.id,
                    "producerId": producer_id,
                    "rtpCapabilities": rtp_capabilities,
                }),
            )
            .await?;
        let reply: CanConsumeReply = parse_reply(ok)?;
        Ok(reply.can_consume)
    }

    async fn create_transport(
        &self,
        settings: &TransportSettings,
    ) -> EngineResult<Arc<dyn MediaTransport>> {
        let ok = self
            .rpc
            .request(
                "router.createWebRtcTransport",
                json!({
                    "routerId": self.id,
                    "listenInfos": settings.listen_infos,
                    "initialAvailableOutgoingBitrate": settings.initial_available_outgoing_bitrate,
                }),
            )
            .await?;
        let reply: TransportReply = parse_reply(ok)?;
        Ok(Arc::new(ProcessTransport {
            rpc: Arc::clone(&self.rpc),
            id: TransportId(reply.id),
            ice_parameters: IceParameters(reply.ice_parameters),
            ice_candidates: IceCandidates(reply.ice_candidates),
            dtls_parameters: DtlsParameters(reply.dtls_parameters),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CanConsumeReply {
    can_consume: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransportReply {
    id: String,
    ice_parameters: Value,
    ice_candidates: Value,
    dtls_parameters: Value,
}

struct ProcessTransport {
    rpc: Arc<WorkerRpc>,
    id: TransportId,
    ice_parameters: IceParameters,
    ice_candidates: IceCandidates,
    dtls_parameters: DtlsParameters,
}

#[async_trait]
impl MediaTransport for ProcessTransport {
    fn id(&self) -> TransportId {
        self.id.clone()
    }

    fn ice_parameters(&self) -> IceParameters {
        self.ice_parameters.clone()
    }

    fn ice_candidates(&self) -> IceCandidates {
        self.ice_candidates.clone()
    }

    fn dtls_parameters(&self) -> DtlsParameters {
        self.dtls_parameters.clone()
    }

    async fn set_max_incoming_bitrate(&self, bitrate: u32) -> EngineResult<()> {
        self.rpc
            .request(
                "transport.setMaxIncomingBitrate",
                json!({ "transportId": self.id, "bitrate": bitrate }),
            )
            .await?;
        Ok(())
    }

    async fn connect(&self, dtls_parameters: DtlsParameters) -> EngineResult<()> {
        self.rpc
            .request(
                "transport.connect",
                json!({ "transportId": self.id, "dtlsParameters": dtls_parameters }),
            )
            .await?;
        Ok(())
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> EngineResult<Arc<dyn MediaProducer>> {
        let ok = self
            .rpc
            .request(
                "transport.produce",
                json!({
                    "transportId": self.id,
                    "kind": kind,
                    "rtpParameters": rtp_parameters,
                }),
            )
            .await?;
        let reply: ProduceReply = parse_reply(ok)?;
        Ok(Arc::new(ProcessProducer {
            id: ProducerId(reply.id),
            kind,
            paused: reply.paused,
        }))
    }

    async fn consume(
        &self,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
        paused: bool,
    ) -> EngineResult<Arc<dyn MediaConsumer>> {
        let ok = self
            .rpc
            .request(
                "transport.consume",
                json!({
                    "transportId": self.id,
                    "producerId": producer_id,
                    "rtpCapabilities": rtp_capabilities,
                    "paused": paused,
                }),
            )
            .await?;
        let reply: ConsumeReply = parse_reply(ok)?;
        Ok(Arc::new(ProcessConsumer {
            rpc: Arc::clone(&self.rpc),
            id: ConsumerId(reply.id),
            kind: reply.kind,
            rtp_parameters: RtpParameters(reply.rtp_parameters),
            consumer_type: reply.consumer_type,
            producer_paused: reply.producer_paused,
            paused: Mutex::new(reply.paused),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProduceReply {
    id: String,
    #[serde(default)]
    paused: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumeReply {
    id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    #[serde(rename = "type")]
    consumer_type: ConsumerType,
    #[serde(default)]
    producer_paused: bool,
    #[serde(default)]
    paused: bool,
}

struct ProcessProducer {
    id: ProducerId,
    kind: MediaKind,
    paused: bool,
}

impl MediaProducer for ProcessProducer {
    fn id(&self) -> ProducerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn paused(&self) -> bool {
        self.paused
    }
}

struct ProcessConsumer {
    rpc: Arc<WorkerRpc>,
    id: ConsumerId,
    kind: MediaKind,
    rtp_parameters: RtpParameters,
    consumer_type: ConsumerType,
    producer_paused: bool,
    paused: Mutex<bool>,
}

#[async_trait]
impl MediaConsumer for ProcessConsumer {
    fn id(&self) -> ConsumerId {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> RtpParameters {
        self.rtp_parameters.clone()
    }

    fn consumer_type(&self) -> ConsumerType {
        self.consumer_type
    }

    fn producer_paused(&self) -> bool {
        self.producer_paused
    }

    fn paused(&self) -> bool {
        *self.paused.lock()
    }

    async fn set_preferred_layers(&self, spatial: u8, temporal: u8) -> EngineResult<()> {
        self.rpc
            .request(
                "consumer.setPreferredLayers",
                json!({
                    "consumerId": self.id,
                    "spatialLayer": spatial,
                    "temporalLayer": temporal,
                }),
            )
            .await?;
        Ok(())
    }

    async fn resume(&self) -> EngineResult<()> {
        self.rpc
            .request("consumer.resume", json!({ "consumerId": self.id }))
            .await?;
        *self.paused.lock() = false;
        Ok(())
    }
}

fn parse_reply<T: serde::de::DeserializeOwned>(ok: Value) -> EngineResult<T> {
    serde_json::from_value(ok).map_err(|e| EngineError::Protocol(e.to_string()))
}
