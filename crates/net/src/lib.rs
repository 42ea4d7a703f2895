#![warn(missing_docs)]
//! Wire protocol and transport for the multiplayer core: versioned JSON
//! envelopes, framing codec, pending-message tracking, message routing,
//! QUIC endpoints, and reconnect/heartbeat policy.

pub mod codec;
pub mod ident;
pub mod pending;
pub mod protocol;
pub mod reconnect;
pub mod router;
pub mod transport;
pub mod wire;

pub use codec::{catalog_hash, decode, encode, FRAME_MAGIC, MAX_FRAME_LEN};
pub use ident::MessageIdGen;
pub use pending::{PendingMessages, DEFAULT_MAX_AGE_MS, DEFAULT_PENDING_CAP};
pub use protocol::{
    Envelope, MessageFactory, MessageType, Metadata, Payload, ResourceDelta, ValidationError,
    PROTOCOL_VERSION,
};
pub use reconnect::{connect_with_retry, Heartbeat, ReconnectPolicy, HEARTBEAT_INTERVAL};
pub use router::{MessageHandler, MessageRouter, ProcessOutcome};
pub use transport::{ClientEndpoint, RelayEndpoint, TlsMode};
pub use wire::{loopback_pair, LoopbackWire, QuicWire, Wire};
