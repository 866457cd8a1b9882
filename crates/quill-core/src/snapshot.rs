//! Snapshots and incremental reuse
//!
//! A snapshot is a saved branch state plus the heartbeats it took to
//! produce, so reuse can re-credit exactly the work it skipped and
//! deterministic timeouts stay reproducible across cached and uncached
//! runs.
//!
//! Two restore modes, two operations: `with_restore_or_save` reinstalls
//! the full state for cross-run reuse, `restore_partial` reinstalls only
//! the environment and the report logs for same-branch speculative
//! backtracking. They are deliberately separate entry points; neither is
//! a parameterization of the other.
//!
//! The only way to build a `Snapshot` is `Session::save_snapshot`, which
//! drains the pending result handles into the saved state. That drain is
//! what keeps forked sub-results from being silently dropped (left
//! behind in a state about to be discarded) or double-reported (present
//! both in the live state and in the snapshot).

use crate::error::CoreResult;
use crate::session::{Session, SessionState};
use tracing::debug;

/// A saved branch state and the work it cost.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: SessionState,
    passed_heartbeats: u64,
}

impl Snapshot {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn passed_heartbeats(&self) -> u64 {
        self.passed_heartbeats
    }

    /// Restore only what speculative backtracking needs: the
    /// environment (which re-validates the instantiation caches by
    /// construction) and the message/info logs.
    pub fn restore_partial(&self, session: &mut Session) {
        session.state.set_env(self.state.env().clone());
        session.state.messages = self.state.messages.clone();
        session.state.infos = self.state.infos.clone();
    }
}

impl Session {
    /// Save the branch for future reuse, recording that it cost
    /// `passed_heartbeats`. Pending result handles move into the
    /// snapshot.
    pub fn save_snapshot(&mut self, passed_heartbeats: u64) -> Snapshot {
        let pending = self.state.drain_result_handles();
        let mut state = self.state.clone();
        state.set_pending(pending);
        Snapshot {
            state,
            passed_heartbeats,
        }
    }

    /// The incremental-compilation primitive. Cache keys are the
    /// caller's concern; this handles only the state and budget
    /// mechanics.
    ///
    /// With a cached entry: reinstall the snapshot state, re-add exactly
    /// the snapshot's heartbeats to the running counter, and return the
    /// cached value without running `action`. Without one: run `action`
    /// between two counter readings and save the measured cost.
    pub fn with_restore_or_save<T>(
        &mut self,
        cached: Option<(T, Snapshot)>,
        action: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<(T, Snapshot)> {
        if let Some((value, snapshot)) = cached {
            debug!(
                unit = %self.ctx.unit,
                passed = snapshot.passed_heartbeats,
                "reusing snapshot"
            );
            let current = self.state.heartbeats;
            self.state = snapshot.state.clone();
            self.state.heartbeats = current + snapshot.passed_heartbeats;
            return Ok((value, snapshot));
        }

        let before = self.state.heartbeats;
        let value = action(self)?;
        let passed = self.state.heartbeats - before;
        let snapshot = self.save_snapshot(passed);
        debug!(unit = %self.ctx.unit, passed, "saving snapshot");
        Ok((value, snapshot))
    }
}
