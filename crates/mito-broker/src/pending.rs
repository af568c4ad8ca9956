use std::time::Duration;

use mito_protocol::{CorrelationId, ResponseEnvelope};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Replies that arrived but have not been claimed yet.
///
/// Scan-and-remove happens under one lock with no await in between, so an
/// envelope is claimed at most once. Envelopes nobody claims stay here.
#[derive(Debug, Default)]
pub struct PendingResponses {
    queue: Mutex<Vec<ResponseEnvelope>>,
    arrivals: Notify,
}

impl PendingResponses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, envelope: ResponseEnvelope) {
        self.queue.lock().push(envelope);
        self.arrivals.notify_waiters();
    }

    /// Removes and returns the first envelope whose id matches.
    pub fn claim(&self, id: &CorrelationId) -> Option<ResponseEnvelope> {
        let mut queue = self.queue.lock();
        let position = queue.iter().position(|envelope| &envelope.id == id)?;
        Some(queue.remove(position))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Waits up to `budget` for a reply with `id`, waking on every push.
    pub async fn wait_for(&self, id: &CorrelationId, budget: Duration) -> Option<ResponseEnvelope> {
        let deadline = Instant::now() + budget;
        loop {
            // Register interest before scanning so a push between the scan
            // and the await still wakes us.
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(envelope) = self.claim(id) {
                return Some(envelope);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.claim(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn reply(id: &str, data: serde_json::Value) -> ResponseEnvelope {
        ResponseEnvelope::response(id, Some(data))
    }

    #[test]
    fn claim_removes_first_match_only() {
        let pending = PendingResponses::new();
        pending.push(reply("_a", json!(1)));
        pending.push(reply("_b", json!(2)));
        pending.push(reply("_a", json!(3)));

        let first = pending.claim(&CorrelationId::from("_a")).expect("first _a");
        assert_eq!(first.data, Some(json!(1)));
        assert_eq!(pending.len(), 2);

        let duplicate = pending.claim(&CorrelationId::from("_a")).expect("duplicate _a");
        assert_eq!(duplicate.data, Some(json!(3)));
        assert!(pending.claim(&CorrelationId::from("_a")).is_none());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_wakes_on_push() {
        let pending = Arc::new(PendingResponses::new());
        let producer = {
            let pending = pending.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                pending.push(reply("_other", json!("x")));
                pending.push(reply("_mine", json!("y")));
            })
        };
        let started = Instant::now();
        let envelope = pending
            .wait_for(&CorrelationId::from("_mine"), Duration::from_secs(1))
            .await
            .expect("reply arrives");
        assert_eq!(envelope.data, Some(json!("y")));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(40) && waited < Duration::from_millis(50));
        assert_eq!(pending.len(), 1);
        producer.await.expect("producer");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_gives_up_at_budget() {
        let pending = PendingResponses::new();
        let started = Instant::now();
        let envelope = pending
            .wait_for(&CorrelationId::from("_never"), Duration::from_millis(500))
            .await;
        assert!(envelope.is_none());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(500) && waited < Duration::from_millis(510));
    }
}
