//! Typed signaling messages for the relay.
//!
//! This crate defines the request/response protocol carried over the
//! persistent signaling channel between a browser client and the relay,
//! plus the shared media types and the error taxonomy every operation uses.

mod error;
mod request;
mod response;
mod state;
mod types;

pub use error::SignalError;
pub use request::{RequestFrame, SignalRequest};
pub use response::{ResponseFrame, SignalEvent, SignalResponse};
pub use state::SlotState;
pub use types::{
    ConsumerId, ConsumerInfo, ConsumerType, DtlsParameters, IceCandidates, IceParameters,
    MediaKind, ProducerId, RtpCapabilities, RtpParameters, TransportConnectInfo, TransportId,
    TransportRole,
};
