//! Session signaling orchestration for the relay.
//!
//! This crate sequences calls into the SFU engine in the order the protocol
//! requires, owns the registry mapping logical (role, kind) slots to live
//! engine objects, and fans producer availability out to connected
//! signaling channels.

mod client;
mod notify;
mod registry;
mod session;

pub use client::EngineClient;
pub use notify::{ChannelId, Notification, ProducerNotifier, Subscription};
pub use registry::TransportRegistry;
pub use session::{EngineConfig, SessionOrchestrator};
