use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use mito_protocol::{
    CorrelationId, OutboundMessage, RequestEnvelope, ResponseEnvelope, ResponseEvent,
};
use mito_transport::HostTransport;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::config::BrokerConfig;
use crate::hooks::UiHooks;
use crate::pending::PendingResponses;

/// Per-call knobs for [`RequestBroker::send`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Number of poll slots to wait; `None` uses the configured default.
    pub max_retries: Option<u32>,
    /// Dispatch and resolve immediately without waiting for a reply.
    pub do_not_wait_for_reply: bool,
}

impl SendOptions {
    pub fn retries(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            do_not_wait_for_reply: false,
        }
    }

    pub fn fire_and_forget() -> Self {
        Self {
            max_retries: None,
            do_not_wait_for_reply: true,
        }
    }
}

/// Correlates fire-and-forget requests with out-of-band replies.
///
/// Cheap to clone; every clone shares the same pending queue, so any number
/// of UI components can have requests in flight at once.
#[derive(Clone)]
pub struct RequestBroker {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn HostTransport>,
    hooks: Arc<dyn UiHooks>,
    pending: PendingResponses,
    outstanding: Mutex<HashSet<CorrelationId>>,
    config: BrokerConfig,
}

impl RequestBroker {
    pub fn new(
        transport: Arc<dyn HostTransport>,
        hooks: Arc<dyn UiHooks>,
        config: BrokerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                hooks,
                pending: PendingResponses::new(),
                outstanding: Mutex::new(HashSet::new()),
                config,
            }),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.inner.config
    }

    /// Replies received but not claimed yet, orphans included.
    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    /// Requests whose caller is still waiting.
    pub fn outstanding_len(&self) -> usize {
        self.inner.outstanding.lock().len()
    }

    /// Sends `message` and resolves with the reply's `data`, or `None` when no
    /// reply arrived within the budget.
    pub async fn send(&self, message: OutboundMessage, options: SendOptions) -> Option<Value> {
        self.send_raw(message, options)
            .await
            .and_then(|envelope| envelope.data)
    }

    /// Like [`send`](Self::send) but yields the whole claimed envelope, so
    /// callers can tell an `edit_error` from a reply without data.
    pub async fn send_raw(
        &self,
        message: OutboundMessage,
        options: SendOptions,
    ) -> Option<ResponseEnvelope> {
        let reservation = self.reserve_id();
        let envelope = message.into_envelope(reservation.id.clone());

        if !self.dispatch(&envelope) {
            return None;
        }
        if options.do_not_wait_for_reply {
            return None;
        }

        let max_retries = options
            .max_retries
            .unwrap_or_else(|| self.inner.config.default_max_retries());
        let budget = self.inner.config.wait_budget(max_retries);

        let mut indicator = LoadingIndicator::new(self.inner.hooks.as_ref());
        let wait = self.inner.pending.wait_for(&reservation.id, budget);
        tokio::pin!(wait);
        let reply = tokio::select! {
            biased;
            reply = &mut wait => reply,
            _ = tokio::time::sleep(self.inner.config.loading_delay) => {
                indicator.show();
                wait.await
            }
        };
        drop(indicator);

        match &reply {
            Some(reply) => debug!(
                target: "mito::broker",
                request_id = %reservation.id,
                kind = %envelope.kind(),
                event = ?reply.event,
                "reply claimed"
            ),
            None => warn!(
                target: "mito::broker",
                request_id = %reservation.id,
                kind = %envelope.kind(),
                max_retries,
                "no reply within retry budget"
            ),
        }
        reply
    }

    /// Ingestion hook the host calls for every backend message. Never panics;
    /// malformed input is logged and dropped.
    pub fn receive_response(&self, message: Value) {
        let envelope = match ResponseEnvelope::from_value(message) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(target: "mito::broker", error = %err, "dropping malformed response");
                return;
            }
        };

        let event = envelope.event.clone();
        let modal_error = (event == ResponseEvent::EditError && !envelope.has_inline_data())
            .then(|| envelope.error_descriptor());
        trace!(
            target: "mito::broker",
            request_id = %envelope.id,
            event = ?event,
            "response received"
        );
        self.inner.pending.push(envelope);

        match event {
            ResponseEvent::Response => self.inner.hooks.refresh(),
            ResponseEvent::EditError => match modal_error {
                Some(error) => self.inner.hooks.show_error(&error),
                None => debug!(
                    target: "mito::broker",
                    "edit error carries inline data; leaving it to the caller"
                ),
            },
            ResponseEvent::Unknown(kind) => {
                debug!(target: "mito::broker", event = %kind, "unrecognised response event queued")
            }
        }
    }

    pub fn receive_response_slice(&self, bytes: &[u8]) {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(value) => self.receive_response(value),
            Err(err) => {
                warn!(target: "mito::broker", error = %err, bytes = bytes.len(), "dropping undecodable response")
            }
        }
    }

    pub fn receive_response_str(&self, text: &str) {
        self.receive_response_slice(text.as_bytes());
    }

    fn reserve_id(&self) -> IdReservation {
        let mut outstanding = self.inner.outstanding.lock();
        let id = loop {
            let candidate = CorrelationId::generate();
            if outstanding.insert(candidate.clone()) {
                break candidate;
            }
        };
        IdReservation {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    fn dispatch(&self, envelope: &RequestEnvelope) -> bool {
        let frame = match envelope.encode() {
            Ok(frame) => Bytes::from(frame),
            Err(err) => {
                warn!(
                    target: "mito::broker",
                    request_id = %envelope.id,
                    error = %err,
                    "failed to encode request"
                );
                return false;
            }
        };
        match self.inner.transport.send(frame) {
            Ok(()) => {
                debug!(
                    target: "mito::broker",
                    request_id = %envelope.id,
                    event = envelope.event().as_str(),
                    kind = %envelope.kind(),
                    step_id = envelope.step_id().map(|s| s.as_str()),
                    "request dispatched"
                );
                true
            }
            Err(err) => {
                warn!(
                    target: "mito::broker",
                    request_id = %envelope.id,
                    error = %err,
                    "host transport rejected request"
                );
                false
            }
        }
    }
}

/// Keeps an id in the outstanding set for as long as its caller waits.
struct IdReservation {
    id: CorrelationId,
    inner: Arc<Inner>,
}

impl Drop for IdReservation {
    fn drop(&mut self) {
        self.inner.outstanding.lock().remove(&self.id);
    }
}

/// Balances `loading_started` with exactly one `loading_finished`, including
/// when the waiting future is dropped.
struct LoadingIndicator<'a> {
    hooks: &'a dyn UiHooks,
    shown: bool,
}

impl<'a> LoadingIndicator<'a> {
    fn new(hooks: &'a dyn UiHooks) -> Self {
        Self {
            hooks,
            shown: false,
        }
    }

    fn show(&mut self) {
        if !self.shown {
            self.shown = true;
            self.hooks.loading_started();
        }
    }
}

impl Drop for LoadingIndicator<'_> {
    fn drop(&mut self) {
        if self.shown {
            self.hooks.loading_finished();
        }
    }
}
