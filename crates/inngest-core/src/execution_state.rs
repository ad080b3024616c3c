//! Per-request execution state: memoized step entries from the Executor,
//! steps discovered this request, and the channel the core loop and the
//! handler task use to checkpoint with each other. See spec §3
//! "ExecutionState" and §4.4/§9 "Checkpoint channel".

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::model::{IncomingOp, SerializedError};
use crate::step::{FoundStep, StepOutcome};

/// A signal sent from the handler task (or a step tool it suspended on) to
/// the engine's core loop. Modeled as a bounded (size-1) channel: the core
/// loop is the receiver, step tools / the handler-completion hook are
/// senders. See Design Notes §9.
#[derive(Debug, Clone)]
pub enum Checkpoint {
    /// One or more new steps were discovered; look them up by hashed id in
    /// [`ExecutionState::found_steps`].
    StepsFound(Vec<String>),
    /// The handler returned successfully.
    FunctionResolved(serde_json::Value),
    /// The handler threw.
    FunctionRejected(SerializedError),
    /// A step the Executor asked to run was never discovered.
    StepNotFound(String),
}

pub type CheckpointSender = mpsc::Sender<Checkpoint>;
pub type CheckpointReceiver = mpsc::Receiver<Checkpoint>;

/// Create the bounded, size-1 checkpoint channel for one request.
pub fn checkpoint_channel() -> (CheckpointSender, CheckpointReceiver) {
    mpsc::channel(1)
}

/// Per-request execution state, shared (via `Arc`) between the core loop
/// task and the handler task it supervises.
pub struct ExecutionState {
    memoized: HashMap<String, IncomingOp>,
    found_steps: Mutex<HashMap<String, FoundStep>>,
    discovery_order: Mutex<Vec<String>>,
    pub checkpoint_tx: CheckpointSender,
    pub requested_run_step: Option<String>,
    /// Set while the handler is fanning out concurrent step creation
    /// (`Promise.all`-style); disables opportunistic early execution so
    /// concurrently-discovered steps aren't nondeterministically reordered.
    parallel_suppressed: AtomicBool,
}

impl ExecutionState {
    pub fn new(
        memoized: HashMap<String, IncomingOp>,
        checkpoint_tx: CheckpointSender,
        requested_run_step: Option<String>,
    ) -> Self {
        Self {
            memoized,
            found_steps: Mutex::new(HashMap::new()),
            discovery_order: Mutex::new(Vec::new()),
            checkpoint_tx,
            requested_run_step,
            parallel_suppressed: AtomicBool::new(false),
        }
    }

    pub fn memoized(&self, hashed_id: &str) -> Option<IncomingOp> {
        self.memoized.get(hashed_id).cloned()
    }

    pub fn memoized_len(&self) -> usize {
        self.memoized.len()
    }

    /// A clone of the full memoized map, handed to `transformFunctionInput`
    /// before replay begins.
    pub fn memoized_snapshot(&self) -> HashMap<String, IncomingOp> {
        self.memoized.clone()
    }

    /// Record a newly discovered step, preserving discovery order.
    pub fn record_found(&self, step: FoundStep) {
        let hashed_id = step.hashed_id.clone();
        self.found_steps.lock().unwrap().insert(hashed_id.clone(), step);
        self.discovery_order.lock().unwrap().push(hashed_id);
    }

    /// Mark a found step fulfilled and resolve its suspended awaiter.
    pub fn resolve_step(&self, hashed_id: &str, outcome: StepOutcome) {
        if let Some(step) = self.found_steps.lock().unwrap().get_mut(hashed_id) {
            step.resolve(outcome);
        }
    }

    pub fn is_fulfilled(&self, hashed_id: &str) -> bool {
        self.found_steps
            .lock()
            .unwrap()
            .get(hashed_id)
            .map(|s| s.fulfilled)
            .unwrap_or(false)
    }

    /// Hashed ids discovered this request, in discovery order.
    pub fn discovery_order(&self) -> Vec<String> {
        self.discovery_order.lock().unwrap().clone()
    }

    /// Hashed ids discovered this request that have no memoized entry at
    /// all (candidates for a `steps-found` report).
    pub fn unmemoized_discovered(&self) -> Vec<String> {
        self.discovery_order()
            .into_iter()
            .filter(|id| self.memoized(id).is_none())
            .collect()
    }

    /// Run a closure against a found step without removing it, used by the
    /// engine to build an `OutgoingOp` for a just-executed or just-planned
    /// step.
    pub fn with_found<R>(&self, hashed_id: &str, f: impl FnOnce(&FoundStep) -> R) -> Option<R> {
        self.found_steps.lock().unwrap().get(hashed_id).map(f)
    }

    pub fn take_handler(&self, hashed_id: &str) -> Option<crate::step::HandlerSlot> {
        self.found_steps
            .lock()
            .unwrap()
            .get(hashed_id)
            .map(|s| s.handler.clone())
    }

    /// The number of memoized steps that have been fulfilled from replay so
    /// far. Compared against `memoized_len()` for the determinism
    /// safeguard (spec §4.4).
    pub fn fulfilled_memoized_count(&self) -> usize {
        self.found_steps
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.fulfilled && self.memoized.contains_key(&s.hashed_id))
            .count()
    }

    /// True once every memoized step has been replayed (i.e. the handler
    /// has reached the first un-memoized step or completed).
    pub fn all_state_used(&self) -> bool {
        self.fulfilled_memoized_count() >= self.memoized_len()
    }

    pub fn set_parallel_suppressed(&self, suppressed: bool) {
        self.parallel_suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_parallel_suppressed(&self) -> bool {
        self.parallel_suppressed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepKind;

    fn state_with_memoized(n: usize) -> ExecutionState {
        let (tx, _rx) = checkpoint_channel();
        let memoized = (0..n)
            .map(|i| {
                (
                    format!("h{i}"),
                    IncomingOp {
                        id: format!("h{i}"),
                        data: Some(serde_json::json!(i)),
                        error: None,
                        input: None,
                    },
                )
            })
            .collect();
        ExecutionState::new(memoized, tx, None)
    }

    #[test]
    fn all_state_used_false_until_every_memoized_step_replayed() {
        let state = state_with_memoized(2);
        assert!(!state.all_state_used());

        let mut s0 = FoundStep::new("h0".into(), "a".into(), StepKind::Run);
        s0.fulfilled = true;
        state.record_found(s0);
        assert!(!state.all_state_used());

        let mut s1 = FoundStep::new("h1".into(), "b".into(), StepKind::Run);
        s1.fulfilled = true;
        state.record_found(s1);
        assert!(state.all_state_used());
    }

    #[test]
    fn unmemoized_discovered_excludes_memoized_ids() {
        let state = state_with_memoized(1);
        state.record_found(FoundStep::new("h0".into(), "a".into(), StepKind::Run));
        state.record_found(FoundStep::new("h9".into(), "b".into(), StepKind::Run));
        assert_eq!(state.unmemoized_discovered(), vec!["h9".to_string()]);
    }
}
