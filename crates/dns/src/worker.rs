use std::fmt::Display;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::sink::{RecordSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Add,
    Delete,
}

impl Display for RecordAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordAction::Add => write!(f, "add"),
            RecordAction::Delete => write!(f, "delete"),
        }
    }
}

/// One requested change to the published A-record set.
#[derive(Debug, Clone)]
pub struct RecordMessage {
    pub domain: String,
    pub ip: Ipv4Addr,
    pub action: RecordAction,
}

/// Applies record changes from a message stream, strictly in arrival order.
/// An alternative to the reconciler for ad-hoc maintenance; never run both
/// against the same sink.
pub struct RecordWorker<S> {
    sink: Arc<S>,
    messages: flume::Receiver<RecordMessage>,
}

impl<S> RecordWorker<S>
where
    S: RecordSink + Send + Sync + 'static,
{
    pub fn new(sink: Arc<S>, messages: flume::Receiver<RecordMessage>) -> Self {
        Self { sink, messages }
    }

    pub async fn run(self, cancellation: CancellationToken) {
        loop {
            tokio::select! {
                message = self.messages.recv_async() => {
                    let Ok(message) = message else {
                        trace!("all record senders are dropped, stopping worker");
                        return;
                    };

                    if let Err(err) = self.process(&message).await {
                        tracing::error!(
                            action = %message.action,
                            ip = %message.ip,
                            domain = %message.domain,
                            "failed to apply record change: {err}"
                        );
                    }
                },
                _ = cancellation.cancelled() => {
                    trace!("cancellation received, stopping record worker");
                    return;
                }
            }
        }
    }

    async fn process(&self, message: &RecordMessage) -> Result<(), SinkError> {
        match message.action {
            RecordAction::Add => self.sink.add(message.ip).await,
            RecordAction::Delete => self.sink.delete(message.ip).await,
        }
    }
}
