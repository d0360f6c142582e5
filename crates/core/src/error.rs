//! Bus-level error type. Wraps the governance crate's stable
//! [`ErrorKind`] taxonomy with a human-readable message and, where
//! relevant, the message/agent ID involved.

use agent_bus_governance::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{kind}: {detail}")]
pub struct BusError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl BusError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

pub type BusResult<T> = Result<T, BusError>;
