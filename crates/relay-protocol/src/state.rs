//! Per-slot transport state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one (role, kind) transport slot.
///
/// A slot that was never created has no state at all; operations against it
/// fail with a missing-transport error rather than an invalid-state one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Transport exists but the DTLS handshake has not completed.
    Created,

    /// Transport completed its connect call.
    Connected,

    /// A producer or consumer is attached to the transport.
    Active,
}

impl SlotState {
    /// Returns true if the slot completed its connect call.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected | Self::Active)
    }

    /// Returns the display name for this state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Connected => "connected",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
