//! Quill session core
//!
//! The execution core of the Quill prover: everything that runs during
//! one compilation pass lives inside a session created here. The
//! elaborator, tactic engine, and kernel drive their work through this
//! crate's invariants:
//!
//! - **Session state & context** (`session`): one branch's mutable data
//!   plus its scoped configuration, with cache-invalidating environment
//!   access and atomic option updates.
//! - **Resource governor** (`governor`): cooperative cancellation,
//!   heartbeat-counted deterministic timeouts, recursion-depth guards.
//! - **Unique name generator** (`name_gen`): collision-free auxiliary
//!   names across forked branches.
//! - **Task forking** (`task`): capture a branch into a closure any
//!   executor can run, reporting into a result tree.
//! - **Snapshot / reuse** (`snapshot`): full-state reuse for incremental
//!   compilation, partial restore for speculative backtracking.
//! - **Error taxonomy** (`error`): Interrupt / Resource / Ordinary, with
//!   recovery combinators that cannot swallow the wrong kind.
//!
//! # Example
//!
//! ```
//! use quill_core::options::{OptionSchema, Options};
//! use quill_core::message::SourceMap;
//! use quill_core::name_gen::NameGenerator;
//! use quill_core::session::{Session, SessionContext, SessionState};
//! use quill_kernel::{Environment, Name};
//! use std::sync::Arc;
//!
//! let options = Options::new(Arc::new(OptionSchema::core()));
//! let ctx = SessionContext::new(
//!     Name::from("Demo"),
//!     Arc::new(SourceMap::empty("demo.qll")),
//!     options,
//! );
//! let state = SessionState::new(Environment::new(), NameGenerator::default());
//! let answer = Session::run_value(ctx, state, |session| {
//!     session.consume_heartbeats(1);
//!     session.check_system()?;
//!     Ok(2 + 2)
//! })
//! .unwrap();
//! assert_eq!(answer, 4);
//! ```

pub mod error;
pub mod governor;
pub mod info;
pub mod message;
pub mod name_gen;
pub mod options;
pub mod session;
pub mod snapshot;
pub mod task;
pub mod trace;

pub use error::{try_catch, try_catch_runtime, CoreResult, ErrorKind, ResourceError, SessionError};
pub use governor::CancelToken;
pub use info::{Annotation, InfoNode, InfoTree};
pub use message::{Message, MessageLog, Position, Severity, SourceMap};
pub use name_gen::NameGenerator;
pub use options::{OptionSchema, OptionValue, Options};
pub use session::{Outcome, Session, SessionContext, SessionState};
pub use snapshot::Snapshot;
pub use task::{ForkedTask, ResultHandle, ResultNode, TaskExecutor};
pub use trace::{TraceEntry, TraceState};
