/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public dashboard adapter crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod http;
pub mod types;
pub mod ws;

// Re-export commonly used types from http
pub use http::{ClientConfig, DashboardClient, DashboardError, Result, StreamBackend};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    AccountEvent,
    AccountEventKind,
    CLOSE_ABNORMAL,
    ConnectionId,
    EnvelopeError,
    InboundEnvelope,
    StreamTransport,
    TransportEvent,
    TransportEventSender,
    TransportHandle,
    WsTransport,
    stream_url_for,
};
