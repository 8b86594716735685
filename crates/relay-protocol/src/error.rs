//! Error taxonomy for signaling operations.

use thiserror::Error;

use crate::state::SlotState;
use crate::types::{MediaKind, TransportRole};

/// Failures a signaling operation can resolve with.
///
/// Every method shares this contract: expected protocol failures and engine
/// call faults both come back as the request's error payload, and the
/// session stays usable afterwards. Nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The router refused the consume request for the offered capabilities.
    #[error("cannot consume {kind}")]
    CannotConsume { kind: MediaKind },

    /// Consume was requested before any producer for the kind existed.
    #[error("no {kind} producer exists")]
    ProducerMissing { kind: MediaKind },

    /// Resume was requested before any consumer for the kind existed.
    #[error("no {kind} consumer exists")]
    ConsumerMissing { kind: MediaKind },

    /// The operation needs a transport slot that was never created.
    #[error("no {role} {kind} transport exists")]
    TransportMissing {
        role: TransportRole,
        kind: MediaKind,
    },

    /// The operation arrived out of order for its transport slot.
    #[error("{role} {kind} transport is {actual}, expected {expected}")]
    InvalidState {
        role: TransportRole,
        kind: MediaKind,
        expected: SlotState,
        actual: SlotState,
    },

    /// The media engine rejected or failed the underlying call.
    #[error("engine error: {0}")]
    Engine(String),

    /// The request frame could not be interpreted.
    #[error("malformed request: {0}")]
    BadRequest(String),
}
