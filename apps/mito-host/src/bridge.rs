//! Stdio bridge to a backend child process.
//!
//! Requests are written to the child's stdin as newline-delimited JSON; every
//! line the child prints on stdout is handed to the broker as a reply.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mito_broker::protocol::ErrorDescriptor;
use mito_broker::{LoadingCounter, RequestBroker, UiHooks};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::HostError;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct BackendProcess {
    child: Child,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl BackendProcess {
    /// Starts `command_line` and wires its pipes to `frames` (outbound) and
    /// `broker` (inbound).
    pub fn spawn(
        command_line: &str,
        frames: mpsc::UnboundedReceiver<Bytes>,
        broker: RequestBroker,
    ) -> Result<Self, HostError> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(HostError::MissingBackend)?;

        let mut command = TokioCommand::new(program);
        command
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| HostError::Spawn {
            program: program.to_string(),
            source,
        })?;
        info!(target: "mito::host", program, pid = ?child.id(), "backend started");

        let stdin = child.stdin.take().ok_or(HostError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(HostError::MissingPipe("stdout"))?;

        let writer = tokio::spawn(write_frames(stdin, frames));
        let reader = tokio::spawn(read_replies(BufReader::new(stdout), broker));

        Ok(Self {
            child,
            writer,
            reader,
        })
    }

    /// Drains queued requests, then stops the child. Takes the broker so its
    /// transport (and with it the frame channel) is released first.
    pub async fn shutdown(mut self, broker: RequestBroker) {
        self.reader.abort();
        drop(broker);

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.writer)
            .await
            .is_err()
        {
            warn!(target: "mito::host", "backend writer did not drain in time");
            self.writer.abort();
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!(target: "mito::host", %status, "backend exited"),
            Ok(Err(err)) => warn!(target: "mito::host", error = %err, "failed to reap backend"),
            Err(_) => {
                if let Err(err) = self.child.start_kill() {
                    warn!(target: "mito::host", error = %err, "failed to kill backend");
                }
            }
        }
    }
}

async fn write_frames<W>(mut stdin: W, mut frames: mpsc::UnboundedReceiver<Bytes>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        trace!(target: "mito::host", bytes = frame.len(), "writing request frame");
        let written = async {
            stdin.write_all(&frame).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(err) = written {
            warn!(target: "mito::host", error = %err, "backend stdin closed");
            return;
        }
    }
    // Closing stdin tells the backend no more requests are coming.
    let _ = stdin.shutdown().await;
}

async fn read_replies<R>(reader: R, broker: RequestBroker)
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if !line.is_empty() {
                    broker.receive_response_str(line);
                }
            }
            Ok(None) => {
                debug!(target: "mito::host", "backend stdout closed");
                break;
            }
            Err(err) => {
                warn!(target: "mito::host", error = %err, "failed to read backend stdout");
                break;
            }
        }
    }
}

/// UI hooks for a terminal host: errors go to stderr, the spinner is a log line.
#[derive(Default)]
pub struct HostHooks {
    loading: LoadingCounter,
}

impl HostHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[cfg(test)]
    fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }
}

impl UiHooks for HostHooks {
    fn refresh(&self) {
        debug!(target: "mito::host", "backend state changed");
    }

    fn show_error(&self, error: &ErrorDescriptor) {
        warn!(target: "mito::host", error_type = %error.error_type, "backend reported an error");
        eprintln!("⚠️  {}\n   {}", error.header, error.to_fix);
    }

    fn loading_started(&self) {
        if self.loading.increment() == 1 {
            info!(target: "mito::host", "waiting on backend…");
        }
    }

    fn loading_finished(&self) {
        self.loading.decrement();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use mito_broker::protocol::{EventKind, OutboundMessage, ResponseEvent};
    use mito_broker::transport::ChannelTransport;
    use mito_broker::{BrokerConfig, SendOptions};
    use test_timeout::tokio_timeout_test;

    #[tokio_timeout_test(10)]
    async fn echoed_requests_are_claimed_by_their_sender() {
        let (transport, frames) = ChannelTransport::new();
        let hooks = HostHooks::new();
        let broker = RequestBroker::new(Arc::new(transport), hooks.clone(), BrokerConfig::default());
        let backend = BackendProcess::spawn("cat", frames, broker.clone()).expect("spawn cat");

        // `cat` echoes the request envelope, which carries our id.
        let reply = broker
            .send_raw(
                OutboundMessage::new(EventKind::ApiCall, "datafiles"),
                SendOptions::retries(40),
            )
            .await
            .expect("echo claimed");
        assert_eq!(reply.event, ResponseEvent::Unknown("api_call".into()));
        assert!(!hooks.is_loading());

        backend.shutdown(broker).await;
    }

    #[test]
    fn empty_backend_command_is_rejected() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async {
            let (transport, frames) = ChannelTransport::new();
            let broker =
                RequestBroker::new(Arc::new(transport), HostHooks::new(), BrokerConfig::default());
            let err = BackendProcess::spawn("   ", frames, broker)
                .err()
                .expect("blank command fails");
            assert!(matches!(err, HostError::MissingBackend));
        });
    }
}
