//! Append-only execution journal
//!
//! JSONL audit trail of completed executions and order lifecycle events.
//! Writes happen on a dedicated thread fed by a bounded channel; a full
//! buffer drops the event with an error log rather than stalling the
//! engine.

use crate::core::exit::ExitReason;
use crate::core::types::{Direction, ExecutionId, SlMode};
use anyhow::Result;
use chrono::NaiveDateTime;
use crossbeam::channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, SystemTime};
use tracing::{error, info};

/// Per-leg snapshot carried on a completed-execution record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegFill {
    pub symbol: String,
    pub quantity: u32,
    pub entry_price: f64,
    pub exit_price: f64,
}

/// One finished execution, appended when a monitor completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedExecution {
    pub execution_id: ExecutionId,
    pub user_id: String,
    pub strategy_type: String,
    pub direction: Direction,
    pub sl_mode: SlMode,
    pub legs: Vec<LegFill>,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub exit_reason: String,
    pub realized_pnl: f64,
}

impl CompletedExecution {
    pub fn exit_reason_of(reason: &ExitReason) -> String {
        reason.to_string()
    }
}

/// Journal event stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum JournalEvent {
    ExecutionCompleted(CompletedExecution),
    OrderSubmitted {
        order_id: String,
        symbol: String,
        side: String,
        quantity: u32,
        price: f64,
    },
    LegReplaced {
        execution_id: ExecutionId,
        exited_symbol: String,
        replacement_symbol: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: u64,
    #[serde(flatten)]
    pub event: JournalEvent,
}

impl JournalEntry {
    fn new(event: JournalEvent) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0))
            .as_millis() as u64;

        Self { timestamp, event }
    }
}

pub struct ExecutionJournal {
    sender: Option<Sender<JournalEvent>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl ExecutionJournal {
    pub fn new(path: PathBuf) -> Result<Self> {
        // 4096 buffered events covers bursts around square-off
        let (sender, receiver) = bounded(4096);

        let handle = thread::spawn(move || {
            Self::writer_loop(path, receiver);
        });

        Ok(Self {
            sender: Some(sender),
            thread_handle: Some(handle),
        })
    }

    fn writer_loop(path: PathBuf, receiver: Receiver<JournalEvent>) {
        let mut file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open journal file {:?}: {}", path, e);
                return;
            }
        };

        for event in receiver {
            let entry = JournalEntry::new(event);
            match serde_json::to_string(&entry) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{}", json) {
                        error!("failed to write journal entry: {}", e);
                    }
                }
                Err(e) => {
                    error!("failed to serialize journal entry: {}", e);
                }
            }
        }

        if let Err(e) = file.flush() {
            error!("failed to flush journal: {}", e);
        }
        info!("execution journal writer stopping");
    }

    /// Non-blocking append. Dropping an audit event is preferable to
    /// stalling the engine when the buffer is full.
    pub fn record(&self, event: JournalEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(event) {
                error!("journal buffer full or disconnected, dropping event: {:?}", e);
            }
        }
    }
}

impl Drop for ExecutionJournal {
    fn drop(&mut self) {
        // Drop the sender first so the writer thread's receive loop ends
        let _ = self.sender.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}
