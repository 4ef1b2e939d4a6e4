//! Foundational types shared across hatbot crates.
//!
//! Provides the immutable inbound message snapshot, the outbound/history
//! collaborator traits implemented by the platform adapter, the shared
//! shutdown signal, and the wall-clock helper used by artifact expiry checks.

pub mod message;
pub mod outbound;
pub mod shutdown;
pub mod time_utils;

pub use message::{mentions_actor, IncomingMessage, MessageFlags};
pub use outbound::{ChannelHistory, ChannelNames, ChatOutbound};
pub use shutdown::{shutdown_channel, wait_for_shutdown};
pub use time_utils::system_time_to_unix_ms;
