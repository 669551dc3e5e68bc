/*
[INPUT]:  Stream URL and raw message frames
[OUTPUT]: Transport lifecycle events and typed envelopes
[POS]:    WebSocket layer - private user data stream
[UPDATE]: When adding envelope types or changing connection logic
*/

pub mod message;
pub mod transport;

pub use message::{
    AccountEvent, AccountEventKind, BinanceEventPayload, EnvelopeError, ErrorPayload,
    HelloPayload, InboundEnvelope, StatusPayload,
};
pub use transport::{
    CLOSE_ABNORMAL, ConnectionId, DEFAULT_CONNECT_TIMEOUT, StreamTransport, TransportEvent,
    TransportEventSender, TransportHandle, WsTransport, stream_url_for,
};
