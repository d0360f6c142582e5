//! Human/consensus review lane for messages whose impact score clears
//! the deliberation threshold.

use std::collections::HashMap;

use agent_bus_governance::{Decision, ErrorKind, Message};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{BusError, BusResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliberationState {
    Pending,
    Resolved(Decision),
    TimedOut,
}

#[derive(Debug, Clone)]
struct DeliberationEntry {
    conversation_id: Uuid,
    submitted_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
    state: DeliberationState,
    reviewer: Option<String>,
    message: Message,
}

/// Correlates a message awaiting review with its eventual
/// ALLOW/DENY/REVIEW-timeout result.
pub struct DeliberationRouter {
    capacity: usize,
    deadline: chrono::Duration,
    entries: Mutex<HashMap<Uuid, DeliberationEntry>>,
}

impl DeliberationRouter {
    pub fn new(capacity: usize, deadline_ms: u64) -> Self {
        Self {
            capacity,
            deadline: chrono::Duration::milliseconds(deadline_ms as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Submit a message for deliberation, storing a copy so it can
    /// later be resumed by [`DeliberationRouter::take`] once a result
    /// (or a timeout) is posted. Fails with `DELIBERATION_FULL` if the
    /// queue is already at capacity.
    pub fn submit(&self, message: &Message) -> BusResult<()> {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            return Err(BusError::new(
                ErrorKind::DeliberationFull,
                "deliberation queue is at capacity",
            ));
        }
        let now = Utc::now();
        let conversation_id = message.conversation_id;
        entries.insert(
            conversation_id,
            DeliberationEntry {
                conversation_id,
                submitted_at: now,
                deadline: now + self.deadline,
                state: DeliberationState::Pending,
                reviewer: None,
                message: message.clone(),
            },
        );
        Ok(())
    }

    /// Post a reviewer's result for a pending deliberation.
    pub fn post_result(&self, conversation_id: Uuid, decision: Decision, reviewer: impl Into<String>) -> BusResult<()> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&conversation_id).ok_or_else(|| {
            BusError::new(ErrorKind::NoRoute, "no such deliberation in flight")
        })?;
        entry.state = DeliberationState::Resolved(decision);
        entry.reviewer = Some(reviewer.into());
        Ok(())
    }

    pub fn state(&self, conversation_id: Uuid) -> Option<DeliberationState> {
        self.entries.lock().get(&conversation_id).map(|e| e.state.clone())
    }

    /// Sweep entries past their wall-clock deadline with no posted
    /// result, marking them `TimedOut`. Returns the conversation IDs
    /// that timed out this sweep, so a caller can emit
    /// `DELIBERATION_TIMEOUT` decisions for each.
    pub fn expire_stale(&self) -> Vec<Uuid> {
        let now = Utc::now();
        let mut entries = self.entries.lock();
        let mut timed_out = Vec::new();
        for entry in entries.values_mut() {
            if matches!(entry.state, DeliberationState::Pending) && now > entry.deadline {
                entry.state = DeliberationState::TimedOut;
                timed_out.push(entry.conversation_id);
            }
        }
        timed_out
    }

    /// Remove a resolved or timed-out entry once its result has been
    /// consumed by the processor.
    pub fn remove(&self, conversation_id: Uuid) -> Option<DeliberationState> {
        self.entries.lock().remove(&conversation_id).map(|e| e.state)
    }

    /// Remove and return the suspended message plus its current state,
    /// so the caller can resume processing it. Used both for an
    /// explicit `post_result` resumption and for the automatic
    /// `DELIBERATION_TIMEOUT` sweep.
    pub fn take(&self, conversation_id: Uuid) -> Option<(DeliberationState, Message)> {
        self.entries
            .lock()
            .remove(&conversation_id)
            .map(|e| (e.state, e.message))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_bus_governance::{MessagePriority, MessageType};

    fn pending_message() -> Message {
        Message::new("agent-a", "agent-b", MessageType::GovernanceRequest, MessagePriority::High)
    }

    #[test]
    fn submit_then_post_result_resolves() {
        let router = DeliberationRouter::new(10, 60_000);
        let m = pending_message();
        let id = m.conversation_id;
        router.submit(&m).unwrap();
        assert_eq!(router.state(id), Some(DeliberationState::Pending));
        router.post_result(id, Decision::Allow, "reviewer-1").unwrap();
        assert_eq!(router.state(id), Some(DeliberationState::Resolved(Decision::Allow)));
    }

    #[test]
    fn queue_rejects_past_capacity() {
        let router = DeliberationRouter::new(1, 60_000);
        router.submit(&pending_message()).unwrap();
        let err = router.submit(&pending_message()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeliberationFull);
    }

    #[test]
    fn expire_stale_marks_past_deadline_pending_entries() {
        let router = DeliberationRouter::new(10, 0);
        let m = pending_message();
        let id = m.conversation_id;
        router.submit(&m).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let timed_out = router.expire_stale();
        assert_eq!(timed_out, vec![id]);
        assert_eq!(router.state(id), Some(DeliberationState::TimedOut));
    }

    #[test]
    fn resolved_entries_are_not_expired() {
        let router = DeliberationRouter::new(10, 0);
        let m = pending_message();
        let id = m.conversation_id;
        router.submit(&m).unwrap();
        router.post_result(id, Decision::Deny, "r").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(router.expire_stale().is_empty());
    }

    #[test]
    fn post_result_for_unknown_conversation_fails() {
        let router = DeliberationRouter::new(10, 60_000);
        let err = router.post_result(Uuid::new_v4(), Decision::Allow, "r").unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoRoute);
    }

    #[test]
    fn take_removes_entry_and_returns_the_suspended_message() {
        let router = DeliberationRouter::new(10, 60_000);
        let m = pending_message();
        let id = m.conversation_id;
        router.submit(&m).unwrap();
        let (state, taken) = router.take(id).unwrap();
        assert_eq!(state, DeliberationState::Pending);
        assert_eq!(taken.conversation_id, id);
        assert!(router.is_empty());
    }
}
