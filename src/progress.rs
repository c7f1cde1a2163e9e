use tokio::sync::mpsc;

use crate::model::{RunState, TestResult};

/// Display-only events emitted while a run is in flight.
#[derive(Clone, Debug)]
pub enum Progress {
    State(RunState),
    Status(String),
    /// Discovery finished; `count` probes are about to run.
    Candidates { count: usize },
    ProbeFinished { index: usize, result: TestResult },
}

pub type ProgressSender = mpsc::UnboundedSender<Progress>;

// Keeps the status log returned by discovery and mirrors every message onto
// the optional progress channel. A dropped receiver is ignored.
#[derive(Clone, Debug, Default)]
pub(crate) struct StatusLog {
    messages: Vec<String>,
    sink: Option<ProgressSender>,
}

impl StatusLog {
    pub(crate) fn new(sink: Option<ProgressSender>) -> Self {
        Self {
            messages: Vec::new(),
            sink,
        }
    }

    pub(crate) fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        if let Some(sink) = self.sink.as_ref() {
            let _ = sink.send(Progress::Status(message.clone()));
        }
        self.messages.push(message);
    }

    pub(crate) fn into_messages(self) -> Vec<String> {
        self.messages
    }
}

pub(crate) fn emit(sink: Option<&ProgressSender>, event: Progress) {
    if let Some(sink) = sink {
        let _ = sink.send(event);
    }
}
