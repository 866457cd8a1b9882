//! Session error taxonomy
//!
//! Three disjoint kinds with different recovery rules:
//!
//! - `Interrupt`: the branch's result is no longer wanted. Recovered by
//!   exactly one top-level boundary, never by recovery combinators.
//! - `Resource`: a deterministic budget was exhausted (heartbeats,
//!   recursion depth). Recovered only by handlers that opt in.
//! - `Ordinary`: a reportable elaboration error. Recovered by default.
//!
//! "Try the next alternative on failure" logic must not retry after a
//! budget ran out, and must stop once the caller stopped caring; the
//! combinators below encode that rule so call sites cannot get it wrong.

use crate::message::Message;
use thiserror::Error;

/// Result type used throughout the session core
pub type CoreResult<T> = Result<T, SessionError>;

/// Deterministic budget exhaustion
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The heartbeat budget ran out. `unit` may be redacted for
    /// reproducible output; `hint` carries the remediation text.
    #[error("(deterministic) timeout at `{unit}`, maximum number of heartbeats ({limit}) has been reached{hint}")]
    DeterministicTimeout {
        unit: String,
        limit: u64,
        hint: String,
    },

    /// The recursion-depth cap was exceeded
    #[error("maximum recursion depth ({limit}) has been reached")]
    RecursionDepth { limit: u32 },
}

/// An error propagating through a session branch
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Cancellation: the branch's result is no longer wanted
    #[error("interrupted")]
    Interrupt,

    /// Heartbeat timeout or recursion limit
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Everything else, carried as a structured message
    #[error("{0}")]
    Ordinary(Message),
}

/// The three recovery classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Interrupt,
    Resource,
    Ordinary,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Interrupt => ErrorKind::Interrupt,
            SessionError::Resource(_) => ErrorKind::Resource,
            SessionError::Ordinary(_) => ErrorKind::Ordinary,
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, SessionError::Interrupt)
    }

    /// Build an ordinary error from a bare message
    pub fn ordinary(message: Message) -> Self {
        SessionError::Ordinary(message)
    }
}

/// Default recovery: the handler sees only `Ordinary` errors; `Interrupt`
/// and `Resource` pass through unchanged.
pub fn try_catch<T>(
    result: CoreResult<T>,
    handler: impl FnOnce(Message) -> CoreResult<T>,
) -> CoreResult<T> {
    match result {
        Err(SessionError::Ordinary(msg)) => handler(msg),
        other => other,
    }
}

/// Opt-in recovery: the handler additionally sees `Resource` errors;
/// only `Interrupt` passes through unchanged.
pub fn try_catch_runtime<T>(
    result: CoreResult<T>,
    handler: impl FnOnce(SessionError) -> CoreResult<T>,
) -> CoreResult<T> {
    match result {
        Err(SessionError::Interrupt) => Err(SessionError::Interrupt),
        Err(err) => handler(err),
        ok => ok,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Severity;

    fn ordinary() -> SessionError {
        SessionError::Ordinary(Message::plain(Severity::Error, "boom"))
    }

    fn timeout() -> SessionError {
        SessionError::Resource(ResourceError::DeterministicTimeout {
            unit: "demo".to_string(),
            limit: 50,
            hint: String::new(),
        })
    }

    #[test]
    fn test_kinds_are_disjoint() {
        assert_eq!(SessionError::Interrupt.kind(), ErrorKind::Interrupt);
        assert_eq!(timeout().kind(), ErrorKind::Resource);
        assert_eq!(ordinary().kind(), ErrorKind::Ordinary);
    }

    #[test]
    fn test_timeout_display_carries_limit() {
        let text = timeout().to_string();
        assert!(text.contains("(deterministic) timeout at `demo`"));
        assert!(text.contains("(50)"));
    }

    #[test]
    fn test_try_catch_recovers_ordinary_only() {
        let recovered = try_catch(Err::<i32, _>(ordinary()), |_| Ok(7));
        assert_eq!(recovered, Ok(7));

        let passed = try_catch(Err::<i32, _>(timeout()), |_| Ok(7));
        assert_eq!(passed, Err(timeout()));

        let passed = try_catch(Err::<i32, _>(SessionError::Interrupt), |_| Ok(7));
        assert_eq!(passed, Err(SessionError::Interrupt));
    }

    #[test]
    fn test_try_catch_runtime_recovers_resource_too() {
        let recovered = try_catch_runtime(Err::<i32, _>(timeout()), |_| Ok(7));
        assert_eq!(recovered, Ok(7));

        let recovered = try_catch_runtime(Err::<i32, _>(ordinary()), |_| Ok(7));
        assert_eq!(recovered, Ok(7));

        let passed = try_catch_runtime(Err::<i32, _>(SessionError::Interrupt), |_| Ok(7));
        assert_eq!(passed, Err(SessionError::Interrupt));
    }

    #[test]
    fn test_handler_not_invoked_on_passthrough() {
        let mut called = false;
        let _ = try_catch(Err::<(), _>(SessionError::Interrupt), |_| {
            called = true;
            Ok(())
        });
        assert!(!called);
    }

    #[test]
    fn test_success_passes_through() {
        assert_eq!(try_catch(Ok::<_, SessionError>(3), |_| Ok(0)), Ok(3));
        assert_eq!(try_catch_runtime(Ok::<_, SessionError>(3), |_| Ok(0)), Ok(3));
    }
}
