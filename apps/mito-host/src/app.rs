use std::sync::Arc;

use mito_broker::protocol::{OutboundMessage, StepId};
use mito_broker::transport::ChannelTransport;
use mito_broker::{BrokerConfig, RequestBroker, SendOptions, UpdateOutcome};
use serde_json::Value;
use tracing::debug;

use crate::bridge::{BackendProcess, HostHooks};
use crate::cli::{CallArgs, Command};
use crate::error::HostError;

/// Starts the backend, runs one command against it and returns the JSON to
/// print.
pub async fn execute(backend: Option<&str>, command: Command) -> Result<Value, HostError> {
    let backend = backend.ok_or(HostError::MissingBackend)?;
    let config = BrokerConfig::from_env();
    debug!(
        target: "mito::host",
        poll_ms = config.poll_interval.as_millis() as u64,
        timeout_secs = config.default_timeout.as_secs(),
        "broker configured"
    );

    let (transport, frames) = ChannelTransport::new();
    let broker = RequestBroker::new(Arc::new(transport), HostHooks::new(), config);
    let process = BackendProcess::spawn(backend, frames, broker.clone())?;

    let result = dispatch(&broker, command).await;
    process.shutdown(broker).await;
    result
}

async fn dispatch(broker: &RequestBroker, command: Command) -> Result<Value, HostError> {
    match command {
        Command::Datafiles => {
            let files = broker
                .get_datafiles()
                .await
                .ok_or_else(|| HostError::NoReply("datafiles".into()))?;
            Ok(serde_json::to_value(files)?)
        }
        Command::Describe(args) => {
            let describe = broker
                .get_column_describe(args.sheet_index, args.column_id)
                .await
                .ok_or_else(|| HostError::NoReply("get_column_describe".into()))?;
            Ok(Value::Object(describe))
        }
        Command::Undo => update_result("undo", broker.update_undo().await),
        Command::Redo => update_result("redo", broker.update_redo().await),
        Command::Clear => update_result("clear", broker.update_clear().await),
        Command::Call(args) => call(broker, args).await,
    }
}

fn update_result(kind: &str, outcome: UpdateOutcome) -> Result<Value, HostError> {
    match outcome {
        UpdateOutcome::Acknowledged(data) => Ok(data.unwrap_or(Value::Null)),
        UpdateOutcome::Rejected(error) => Err(HostError::Backend(error)),
        UpdateOutcome::Unknown => Err(HostError::NoReply(kind.to_string())),
    }
}

async fn call(broker: &RequestBroker, args: CallArgs) -> Result<Value, HostError> {
    let mut message = OutboundMessage::new(args.event.into(), args.kind.clone());
    if let Some(params) = args.params {
        message = message.with_params(params);
    }
    if let Some(step_id) = args.step_id {
        message = message.with_step_id(StepId::from(step_id));
    }
    let options = SendOptions {
        max_retries: args.max_retries,
        do_not_wait_for_reply: false,
    };

    let reply = broker
        .send_raw(message, options)
        .await
        .ok_or(HostError::NoReply(args.kind))?;
    if reply.is_error() {
        return Err(HostError::Backend(reply.error_descriptor()));
    }
    Ok(reply.data.unwrap_or(Value::Null))
}
