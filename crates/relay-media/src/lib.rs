//! SFU media engine boundary.
//!
//! The engine that actually forwards packets is an external worker process;
//! everything media-related (routing, congestion control, codecs, ICE/DTLS)
//! lives behind it. This crate owns the seam: object-safe traits for the
//! engine's worker, router, transport, producer and consumer objects, a
//! JSON-RPC client that drives a real worker over stdio, and an in-memory
//! mock for tests.

mod engine;
mod error;
pub mod mock;
mod settings;
mod worker;

pub use engine::{
    MediaConsumer, MediaEngine, MediaProducer, MediaRouter, MediaTransport, MediaWorker,
};
pub use error::EngineError;
pub use settings::{RouterSettings, TransportSettings, WorkerSettings};
pub use worker::WorkerProcessEngine;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
