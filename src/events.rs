// 10.0: operation audit trail. every phase change of an orchestrated operation is
// recorded; the receipt hands the full history back to the caller. this is a
// trust-sensitive financial flow, so failures keep their verbatim reasons.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    OpenPosition,
    AddCollateral,
    Mint,
    Burn,
    WithdrawAll,
    WithdrawPartial,
}

// 10.1: the per-operation state machine. Building and AwaitingSignature can only
// move forward; Confirmed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    Idle,
    Building,
    AwaitingSignature,
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEvent {
    pub kind: OpKind,
    pub phase: OpPhase,
    pub at: Timestamp,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    kind: OpKind,
    events: Vec<OpEvent>,
}

impl OperationLog {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            events: vec![OpEvent {
                kind,
                phase: OpPhase::Idle,
                at: Timestamp::now(),
                detail: None,
            }],
        }
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn transition(&mut self, phase: OpPhase, detail: Option<String>) {
        tracing::debug!(kind = ?self.kind, ?phase, detail = detail.as_deref(), "operation phase");
        self.events.push(OpEvent {
            kind: self.kind,
            phase,
            at: Timestamp::now(),
            detail,
        });
    }

    pub fn current(&self) -> OpPhase {
        self.events.last().map(|e| e.phase).unwrap_or(OpPhase::Idle)
    }

    pub fn phases(&self) -> Vec<OpPhase> {
        self.events.iter().map(|e| e.phase).collect()
    }

    pub fn events(&self) -> &[OpEvent] {
        &self.events
    }
}
