#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mito_broker::protocol::{ErrorDescriptor, RequestEnvelope};
use mito_broker::transport::LocalTransport;
use mito_broker::{BrokerConfig, LoadingCounter, RequestBroker, UiHooks};
use serde_json::Value;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct RecordingHooks {
    pub refreshes: AtomicUsize,
    pub errors: Mutex<Vec<ErrorDescriptor>>,
    pub loading_started: AtomicUsize,
    pub loading_finished: AtomicUsize,
    pub loading: LoadingCounter,
}

impl RecordingHooks {
    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<ErrorDescriptor> {
        self.errors.lock().unwrap().clone()
    }

    pub fn started(&self) -> usize {
        self.loading_started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.loading_finished.load(Ordering::SeqCst)
    }
}

impl UiHooks for RecordingHooks {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn show_error(&self, error: &ErrorDescriptor) {
        self.errors.lock().unwrap().push(error.clone());
    }

    fn loading_started(&self) {
        self.loading_started.fetch_add(1, Ordering::SeqCst);
        self.loading.increment();
    }

    fn loading_finished(&self) {
        self.loading_finished.fetch_add(1, Ordering::SeqCst);
        self.loading.decrement();
    }
}

pub struct Harness {
    pub broker: RequestBroker,
    pub transport: Arc<LocalTransport>,
    pub hooks: Arc<RecordingHooks>,
}

pub fn harness() -> Harness {
    let transport = LocalTransport::new();
    let hooks = Arc::new(RecordingHooks::default());
    let broker = RequestBroker::new(transport.clone(), hooks.clone(), BrokerConfig::default());
    Harness {
        broker,
        transport,
        hooks,
    }
}

impl Harness {
    pub fn sent(&self) -> Vec<RequestEnvelope> {
        self.transport
            .sent()
            .iter()
            .map(|frame| RequestEnvelope::decode(frame).expect("broker sends valid envelopes"))
            .collect()
    }

    pub fn sent_values(&self) -> Vec<Value> {
        self.transport
            .sent()
            .iter()
            .map(|frame| serde_json::from_slice(frame).expect("broker sends valid json"))
            .collect()
    }

    /// Waits (in virtual time) until the broker has dispatched `count` frames.
    pub async fn wait_for_sent(&self, count: usize) {
        while self.transport.sent_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Fake backend: answers every request through `respond`, which returns
    /// the reply body (without `id`) and how long the backend "works".
    pub fn spawn_backend<F>(&self, respond: F) -> JoinHandle<()>
    where
        F: Fn(&RequestEnvelope) -> Option<(Duration, Value)> + Send + 'static,
    {
        let mut frames = self.transport.subscribe();
        let broker = self.broker.clone();
        tokio::spawn(async move {
            while let Ok(frame) = frames.recv().await {
                let Ok(request) = RequestEnvelope::decode(&frame) else {
                    continue;
                };
                let Some((delay, mut reply)) = respond(&request) else {
                    continue;
                };
                if let Value::Object(map) = &mut reply {
                    map.insert("id".into(), Value::String(request.id.to_string()));
                }
                let broker = broker.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    broker.receive_response(reply);
                });
            }
        })
    }
}
