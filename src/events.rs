use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::info;

use crate::components::confirm_dialog::PendingConfirmation;
use crate::data::abi::ContractAbi;
use crate::invocation::{InvocationError, InvocationOutcome, InvocationState};

/// Identifies a rendered contract instance for the lifetime of the session.
pub type InstanceId = u64;

/// One line of the terminal panel.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub time: DateTime<Local>,
    pub message: String,
}

/// Logging callback handed to every invocation. Messages end up in the
/// terminal panel and in the tracing log file.
#[derive(Debug, Clone)]
pub struct LogSink {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl LogSink {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(target: "terminal", "{message}");
        let _ = self.tx.send(AppEvent::Log(LogEntry {
            time: Local::now(),
            message,
        }));
    }
}

/// Events sent from background tasks to the main app loop
#[derive(Debug)]
pub enum AppEvent {
    // Terminal
    Log(LogEntry),

    // Invocations
    Invoke {
        instance: InstanceId,
        function: usize,
        args: Vec<String>,
    },
    InvocationProgress {
        instance: InstanceId,
        function: usize,
        state: InvocationState,
    },
    InvocationFinished {
        instance: InstanceId,
        function: usize,
        outcome: Result<InvocationOutcome, InvocationError>,
    },
    ConfirmationRequested(PendingConfirmation),

    // Instances created by a deployment or a remote ABI lookup
    InstanceReady {
        name: String,
        address: Address,
        abi: Arc<ContractAbi>,
    },
    RemoveInstance(InstanceId),

    // Status
    Notice(String),
    Error(String),
}
