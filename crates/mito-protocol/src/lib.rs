//! Shared wire definitions for UI ↔ backend communication.
//!
//! Everything that crosses the host transport lives here: correlation and
//! step identifiers, the request/response envelopes, the error descriptor the
//! backend attaches to `edit_error` replies, and the closed per-operation
//! schemas the broker's typed methods serialise. Keeping this in a dedicated
//! crate lets hosts encode/decode frames without pulling in the broker runtime.

mod envelope;
mod ids;
pub mod ops;
pub mod payloads;

pub use envelope::{
    ErrorDescriptor, EventKind, OutboundMessage, ProtocolError, RequestEnvelope,
    ResponseEnvelope, ResponseEvent, RESERVED_KEYS,
};
pub use ids::{CorrelationId, StepId, CORRELATION_ID_LEN};
pub use ops::{ApiCall, EditOp, LogEvent, UpdateOp};
