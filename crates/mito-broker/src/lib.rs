//! Request broker: the UI-side half of the Mito backend protocol.
//!
//! Responsibilities:
//! - minting correlation ids and dispatching request envelopes through the
//!   host transport
//! - holding replies the host pushes in until the request that caused them
//!   claims them, bounded by a per-call retry budget
//! - driving UI side effects (refresh, error modal, loading indicator) through
//!   injected hooks
//! - exposing one typed method per backend operation

pub mod api;
mod broker;
pub mod config;
mod hooks;
mod pending;

pub use api::{EditOutcome, UpdateOutcome};
pub use broker::{RequestBroker, SendOptions};
pub use config::BrokerConfig;
pub use hooks::{LoadingCounter, NoopHooks, UiHooks};
pub use pending::PendingResponses;

pub use mito_protocol as protocol;
pub use mito_transport as transport;
