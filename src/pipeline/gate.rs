//! Turn lifecycle: at most one turn in flight, and its state.

use crate::pipeline::cancel::CancellationToken;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Lifecycle state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No active turn; ready for input.
    Idle,
    /// Workers started for the current turn.
    Running,
    /// Waiting for workers to finish on their own.
    Draining,
    /// Interrupted; waiting for workers to unwind.
    Cancelling,
}

impl PipelineState {
    /// True for every state except [`PipelineState::Idle`].
    pub fn is_active(self) -> bool {
        self != PipelineState::Idle
    }
}

#[derive(Debug)]
struct Slot {
    state: PipelineState,
    turn: u64,
    token: Option<CancellationToken>,
}

/// Serializes turns.
///
/// A turn holds the gate through a [`TurnPermit`] shared by all of its
/// workers. The gate reopens only when the last permit clone is dropped,
/// i.e. when every worker thread of the turn has actually exited.
#[derive(Debug)]
pub(crate) struct TurnGate {
    slot: Mutex<Slot>,
    idle: Condvar,
}

impl TurnGate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                state: PipelineState::Idle,
                turn: 0,
                token: None,
            }),
            idle: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.lock().state
    }

    /// Blocks until the gate is idle, then claims it for a new turn that
    /// is cancelled through `token`. Returns the turn number and its permit.
    pub(crate) fn acquire(self: &Arc<Self>, token: CancellationToken) -> (u64, Arc<TurnPermit>) {
        let mut slot = self.lock();
        while slot.state.is_active() {
            slot = self.idle.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
        slot.turn += 1;
        slot.state = PipelineState::Running;
        slot.token = Some(token);
        (slot.turn, Arc::new(TurnPermit { gate: self.clone() }))
    }

    /// Moves turn `turn` to `to` if it is current and in one of `from`.
    pub(crate) fn transition(&self, turn: u64, from: &[PipelineState], to: PipelineState) -> bool {
        let mut slot = self.lock();
        if slot.turn == turn && from.contains(&slot.state) {
            slot.state = to;
            true
        } else {
            false
        }
    }

    /// Cancels the turn in flight, or only turn `turn` when given.
    ///
    /// The token is set under the lock, so an interrupt can never land on a
    /// turn that started after the check.
    pub(crate) fn cancel(&self, turn: Option<u64>) -> bool {
        let mut slot = self.lock();
        let live = matches!(slot.state, PipelineState::Running | PipelineState::Draining);
        if !live || turn.is_some_and(|t| t != slot.turn) {
            return false;
        }
        if let Some(ref token) = slot.token {
            token.cancel();
        }
        slot.state = PipelineState::Cancelling;
        true
    }

    /// Waits up to `timeout` for the gate to become idle.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while slot.state.is_active() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            slot = self
                .idle
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn release(&self) {
        let mut slot = self.lock();
        slot.state = PipelineState::Idle;
        slot.token = None;
        drop(slot);
        self.idle.notify_all();
    }
}

/// Proof that a turn owns the gate. Dropping the last clone reopens it.
#[derive(Debug)]
pub(crate) struct TurnPermit {
    gate: Arc<TurnGate>,
}

impl Drop for TurnPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
