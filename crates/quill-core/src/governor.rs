//! Resource governor
//!
//! Cancellation, heartbeat accounting, and the recursion-depth guard.
//! All checks are cooperative: surrounding logic calls `check_system` at
//! its safepoints, and code without a safepoint runs to completion.
//!
//! Heartbeats count driver-defined units of work, not wall-clock time,
//! so the same input exhausts the same budget on every machine.

use crate::error::{CoreResult, ResourceError, SessionError};
use crate::options::keys;
use crate::session::Session;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared, single-write cancellation flag. Once set it stays set; any
/// branch holding a clone observes it at its next safepoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Session {
    /// Advance the branch's work counter by `n` units.
    pub fn consume_heartbeats(&mut self, n: u64) {
        self.state.heartbeats += n;
    }

    /// Heartbeats consumed since the top-level unit started.
    pub fn elapsed_heartbeats(&self) -> u64 {
        self.state.heartbeats.saturating_sub(self.ctx.start_heartbeats)
    }

    /// Raise `Interrupt` once the cancellation token is observed set.
    pub fn check_interrupted(&self) -> CoreResult<()> {
        match &self.ctx.cancel_token {
            Some(token) if token.is_set() => {
                debug!(unit = %self.ctx.unit, "cancellation observed");
                Err(SessionError::Interrupt)
            }
            _ => Ok(()),
        }
    }

    /// Raise a deterministic timeout once the heartbeat budget is
    /// exhausted. A budget of 0 never fails.
    pub fn check_max_heartbeats(&self) -> CoreResult<()> {
        let max = self.ctx.max_heartbeats;
        if max == 0 || self.elapsed_heartbeats() <= max {
            return Ok(());
        }
        let unit = if self.ctx.options.get_bool(keys::MODULE_NAME_AT_TIMEOUT) {
            self.ctx.unit.to_string()
        } else {
            "<redacted>".to_string()
        };
        let mut hint = format!(
            "\nuse `set_option {} <num>` to set the limit",
            keys::MAX_HEARTBEATS
        );
        if !self.ctx.diagnostics_enabled {
            hint.push_str(&format!(
                "\nuse `set_option {} true` to get diagnostic information",
                keys::DIAGNOSTICS
            ));
        }
        warn!(unit = %self.ctx.unit, limit = max, "heartbeat budget exhausted");
        Err(ResourceError::DeterministicTimeout {
            unit,
            limit: max,
            hint,
        }
        .into())
    }

    /// Interrupt check, then budget check; the safepoint entry point.
    pub fn check_system(&self) -> CoreResult<()> {
        self.check_interrupted()?;
        self.check_max_heartbeats()
    }

    /// Run `body` one recursion level deeper, raising past the cap.
    pub fn with_inc_rec_depth<T>(
        &mut self,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        if self.ctx.rec_depth >= self.ctx.max_rec_depth {
            return Err(ResourceError::RecursionDepth {
                limit: self.ctx.max_rec_depth,
            }
            .into());
        }
        self.ctx.rec_depth += 1;
        let result = body(self);
        self.ctx.rec_depth -= 1;
        result
    }

    /// Run `body` with the recursion cap raised to at least `cap`. The
    /// cap can only grow; a smaller value leaves it unchanged.
    pub fn with_at_least_max_rec_depth<T>(
        &mut self,
        cap: u32,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let saved = self.ctx.max_rec_depth;
        self.ctx.max_rec_depth = saved.max(cap);
        let result = body(self);
        self.ctx.max_rec_depth = saved;
        result
    }
}
