//! Event payloads shipped out of the core to whatever process hosts the
//! HTTP/WebSocket surface (§6). The core only produces these; it never reads
//! them back.

use chrono::{DateTime, Utc};
use core_types::{AccountSnapshot, Decision, Symbol};
use serde::{Deserialize, Serialize};

/// Terminal status of a trader cycle (§7 "User-visible behavior").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStatus {
    Ok,
    Partial,
    Skipped,
    Failed,
}

/// Lifecycle state of a trader worker (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraderStatus {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsLogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsTraderStatusChanged {
    pub trader_id: String,
    pub status: TraderStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsCycleCompleted {
    pub trader_id: String,
    pub cycle_index: u64,
    pub status: CycleStatus,
    pub duration_ms: u64,
    pub universe: Vec<Symbol>,
    pub decisions: Vec<Decision>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WsAccountUpdate {
    pub trader_id: String,
    pub snapshot: AccountSnapshot,
}

/// The top-level message enum broadcast over the control-plane's WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum WsMessage {
    Log(WsLogMessage),
    TraderStatusChanged(WsTraderStatusChanged),
    CycleCompleted(WsCycleCompleted),
    AccountUpdate(WsAccountUpdate),
}
