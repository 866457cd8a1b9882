//! Session state and context
//!
//! One `Session` is one branch of one compilation pass: an immutable-per-
//! scope context plus exclusively-owned mutable state. The monadic
//! reader+state+exception stack of the source design maps onto an
//! explicit struct passed by `&mut`, with `CoreResult` as the exception
//! channel and clone-and-restore closures as the scoped reader
//! overrides.
//!
//! Branches never share mutable state. Forking (see `task`) copies the
//! state wholesale, which is cheap because the heavyweight member, the
//! environment, is structurally shared.

use crate::error::{CoreResult, SessionError};
use crate::governor::CancelToken;
use crate::info::{Annotation, InfoTree};
use crate::message::{Message, MessageLog, Severity, SourceMap};
use crate::name_gen::NameGenerator;
use crate::options::{keys, Options};
use crate::task::ResultHandle;
use crate::trace::{is_trace_enabled, TraceEntry, TraceState};
use quill_kernel::{Environment, Level, Name};
use std::sync::Arc;
use tracing::debug;

/// Immutable-per-scope configuration of one branch.
///
/// Scoped overrides clone the context, tweak the clone, and restore the
/// original on exit; nothing mutates a context in place across a scope
/// boundary.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Position map of the unit's source file
    pub source_map: Arc<SourceMap>,
    /// The compilation unit being processed
    pub unit: Name,
    pub options: Options,
    /// Recursion depth of the current scope
    pub rec_depth: u32,
    /// Effective recursion-depth cap
    pub max_rec_depth: u32,
    /// Heartbeat budget; 0 means unlimited
    pub max_heartbeats: u64,
    /// Heartbeat reading at the start of the top-level unit
    pub start_heartbeats: u64,
    /// Macro scope of the current expansion
    pub macro_scope: u64,
    /// Kept equal to the environment's diagnostics switch
    pub diagnostics_enabled: bool,
    pub cancel_token: Option<CancelToken>,
    /// Downgrade elaboration errors while speculating
    pub suppress_elab_errors: bool,
    /// Enabled trace categories, inherited by forked branches
    pub trace_categories: im::HashSet<Name>,
}

impl SessionContext {
    pub fn new(unit: Name, source_map: Arc<SourceMap>, options: Options) -> Self {
        let diagnostics_enabled = options.get_bool(keys::DIAGNOSTICS);
        let max_rec_depth = options.get_nat(keys::MAX_REC_DEPTH) as u32;
        let max_heartbeats = options.get_nat(keys::MAX_HEARTBEATS);
        SessionContext {
            source_map,
            unit,
            options,
            rec_depth: 0,
            max_rec_depth,
            max_heartbeats,
            start_heartbeats: 0,
            macro_scope: 0,
            diagnostics_enabled,
            cancel_token: None,
            suppress_elab_errors: false,
            trace_categories: im::HashSet::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel_token = Some(token);
        self
    }
}

/// The mutable data of one branch.
///
/// Owned exclusively by the branch; the only way another branch gets a
/// copy is through an explicit fork point.
#[derive(Debug, Clone)]
pub struct SessionState {
    env: Environment,
    /// Next macro scope to hand out, monotonic from 1
    pub next_macro_scope: u64,
    /// General fresh-index counter
    pub fresh_counter: u64,
    pub ngen: NameGenerator,
    /// Work consumed so far, advanced only by `consume_heartbeats`
    pub heartbeats: u64,
    pub traces: TraceState,
    pub infos: InfoTree,
    pub messages: MessageLog,
    /// Output produced by the branch, folded into a diagnostic at branch end
    pub captured_output: String,
    /// Memo of level instantiations, keyed off the current environment
    inst_sort_cache: hashbrown::HashMap<Name, (Vec<Level>, Level)>,
    /// Handles of forked sub-results, drained by the owner
    pending: Vec<ResultHandle>,
}

impl SessionState {
    pub fn new(env: Environment, ngen: NameGenerator) -> Self {
        SessionState {
            env,
            next_macro_scope: 1,
            fresh_counter: 0,
            ngen,
            heartbeats: 0,
            traces: TraceState::new(),
            infos: InfoTree::new(),
            messages: MessageLog::new(),
            captured_output: String::new(),
            inst_sort_cache: hashbrown::HashMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Replace the environment. Invalidates the instantiation memo in
    /// the same update; a cache entry computed against a superseded
    /// environment is never observable.
    pub fn set_env(&mut self, env: Environment) {
        self.env = env;
        self.inst_sort_cache.clear();
    }

    /// Update the environment in place, with the same invalidation.
    pub fn modify_env(&mut self, f: impl FnOnce(&mut Environment)) {
        f(&mut self.env);
        self.inst_sort_cache.clear();
    }

    /// Memoized level instantiation of a constant's sort.
    ///
    /// Returns `None` for unknown constants or arity mismatches. The
    /// memo keeps one entry per constant, revalidated against the
    /// argument levels.
    pub fn instantiate_sort_cached(&mut self, name: &Name, levels: &[Level]) -> Option<Level> {
        if let Some((cached_args, cached)) = self.inst_sort_cache.get(name) {
            if cached_args.as_slice() == levels {
                return Some(cached.clone());
            }
        }
        let decl = self.env.find(name)?;
        if decl.level_params.len() != levels.len() {
            return None;
        }
        let subst: Vec<(Name, Level)> = decl
            .level_params
            .iter()
            .cloned()
            .zip(levels.iter().cloned())
            .collect();
        let sort = decl.sort.instantiate(&subst);
        self.inst_sort_cache
            .insert(name.clone(), (levels.to_vec(), sort.clone()));
        Some(sort)
    }

    #[cfg(test)]
    pub(crate) fn inst_cache_len(&self) -> usize {
        self.inst_sort_cache.len()
    }

    /// Append a forked branch's handle to the pending list.
    pub fn log_result_handle(&mut self, handle: ResultHandle) {
        self.pending.push(handle);
    }

    /// Remove and return the pending handles in logging order.
    pub fn drain_result_handles(&mut self) -> Vec<ResultHandle> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_result_handles(&self) -> &[ResultHandle] {
        &self.pending
    }

    pub(crate) fn set_pending(&mut self, handles: Vec<ResultHandle>) {
        self.pending = handles;
    }
}

/// One branch: context plus state, passed by `&mut` through the driving
/// logic.
#[derive(Debug)]
pub struct Session {
    pub ctx: SessionContext,
    pub state: SessionState,
}

/// Result of driving a unit to completion through the top-level boundary.
#[derive(Debug)]
pub enum Outcome<T> {
    Completed { value: T, state: SessionState },
    /// The cancellation token fired. In-flight state, including any
    /// snapshots being assembled, is discarded rather than surfaced.
    Interrupted,
    Failed { code: i32, state: SessionState },
}

impl Session {
    /// Pair a context with a state, syncing the environment's
    /// diagnostics switch to the context.
    pub fn new(ctx: SessionContext, state: SessionState) -> Self {
        let mut session = Session { ctx, state };
        let diag = session.ctx.diagnostics_enabled;
        if session.state.env().diagnostics_enabled() != diag {
            session
                .state
                .modify_env(|env| env.set_diagnostics_enabled(diag));
        }
        session
    }

    /// Run `f` in a fresh branch, recording the heartbeat baseline.
    /// Returns the value and the final state, or the raised error.
    pub fn run<T>(
        mut ctx: SessionContext,
        state: SessionState,
        f: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<(T, SessionState)> {
        ctx.start_heartbeats = state.heartbeats;
        let mut session = Session::new(ctx, state);
        let value = f(&mut session)?;
        Ok((value, session.state))
    }

    /// `run`, discarding the final state.
    pub fn run_value<T>(
        ctx: SessionContext,
        state: SessionState,
        f: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        Session::run(ctx, state, f).map(|(value, _)| value)
    }

    /// The single boundary that recovers `Interrupt`.
    ///
    /// Interruption discards the branch's state outright, so snapshots
    /// half-built inside it can never be persisted. Other errors are
    /// folded into the message log and mapped to a failure code.
    pub fn run_to_completion<T>(
        mut ctx: SessionContext,
        state: SessionState,
        f: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> Outcome<T> {
        ctx.start_heartbeats = state.heartbeats;
        let unit = ctx.unit.clone();
        let mut session = Session::new(ctx, state);
        match f(&mut session) {
            Ok(value) => Outcome::Completed {
                value,
                state: session.state,
            },
            Err(SessionError::Interrupt) => {
                debug!(unit = %unit, "unit interrupted, discarding in-flight state");
                Outcome::Interrupted
            }
            Err(err) => {
                session
                    .state
                    .messages
                    .add(Message::plain(Severity::Error, err.to_string()));
                Outcome::Failed {
                    code: 1,
                    state: session.state,
                }
            }
        }
    }

    /// Build an ordinary error anchored at a byte offset of the unit's
    /// source.
    pub fn mk_error(&self, offset: usize, text: impl Into<String>) -> SessionError {
        SessionError::Ordinary(self.message_at(offset, Severity::Error, text))
    }

    /// Build a message anchored at a byte offset of the unit's source.
    pub fn message_at(
        &self,
        offset: usize,
        severity: Severity,
        text: impl Into<String>,
    ) -> Message {
        Message::new(
            self.ctx.source_map.file().to_string(),
            self.ctx.source_map.position(offset),
            severity,
            text,
        )
    }

    /// Apply an option update and run `body` against the adjusted
    /// context, restoring the previous context on exit.
    ///
    /// The diagnostics flag (context and environment switch together)
    /// and the resource caps are recomputed with the options in one
    /// step; `body` never observes a partially-updated context. A
    /// failing update leaves the session untouched.
    pub fn with_options<T>(
        &mut self,
        update: impl FnOnce(&mut Options) -> CoreResult<()>,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut options = self.ctx.options.clone();
        update(&mut options)?;

        let saved = self.ctx.clone();
        let diagnostics = options.get_bool(keys::DIAGNOSTICS);
        self.ctx.options = options;
        self.ctx.diagnostics_enabled = diagnostics;
        self.ctx.max_rec_depth = self.ctx.options.get_nat(keys::MAX_REC_DEPTH) as u32;
        self.ctx.max_heartbeats = self.ctx.options.get_nat(keys::MAX_HEARTBEATS);
        if self.state.env().diagnostics_enabled() != diagnostics {
            self.state
                .modify_env(|env| env.set_diagnostics_enabled(diagnostics));
        }

        let result = body(self);

        if self.state.env().diagnostics_enabled() != saved.diagnostics_enabled {
            self.state
                .modify_env(|env| env.set_diagnostics_enabled(saved.diagnostics_enabled));
        }
        self.ctx = saved;
        result
    }

    /// Hand out the next macro scope.
    pub fn fresh_macro_scope(&mut self) -> u64 {
        let scope = self.state.next_macro_scope;
        self.state.next_macro_scope += 1;
        scope
    }

    /// Run `body` inside a fresh macro scope.
    pub fn with_fresh_macro_scope<T>(
        &mut self,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let saved = self.ctx.macro_scope;
        self.ctx.macro_scope = self.fresh_macro_scope();
        let result = body(self);
        self.ctx.macro_scope = saved;
        result
    }

    /// Next value of the general fresh-index counter.
    pub fn next_fresh_index(&mut self) -> u64 {
        let index = self.state.fresh_counter;
        self.state.fresh_counter += 1;
        index
    }

    /// Run `body` with elaboration errors suppressed.
    pub fn with_suppressed_elab_errors<T>(
        &mut self,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let saved = self.ctx.suppress_elab_errors;
        self.ctx.suppress_elab_errors = true;
        let result = body(self);
        self.ctx.suppress_elab_errors = saved;
        result
    }

    /// Run `body` with one more trace category enabled.
    pub fn with_trace_category<T>(
        &mut self,
        category: Name,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let saved = self.ctx.trace_categories.clone();
        self.ctx.trace_categories.insert(category);
        let result = body(self);
        self.ctx.trace_categories = saved;
        result
    }

    /// Whether a trace category is enabled in this scope.
    pub fn is_trace_enabled(&self, category: &Name) -> bool {
        is_trace_enabled(&self.ctx.trace_categories, category)
    }

    /// Record a trace entry if its category is enabled. The message is
    /// only built when it will be kept.
    pub fn trace(&mut self, category: Name, text: impl FnOnce() -> String) {
        if self.is_trace_enabled(&category) {
            let entry = TraceEntry::new(category, text());
            self.state.traces.add(entry);
        }
    }

    /// Run `body`, re-parenting every annotation it produces under
    /// `annotation`.
    pub fn with_info_context<T>(
        &mut self,
        annotation: Annotation,
        body: impl FnOnce(&mut Session) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mark = self.state.infos.mark();
        let result = body(self);
        self.state.infos.group_from(mark, annotation);
        result
    }

    /// Append to the branch's captured output.
    pub fn emit_output(&mut self, text: &str) {
        self.state.captured_output.push_str(text);
    }

    /// Log a message unconditionally.
    pub fn log_message(&mut self, message: Message) {
        self.state.messages.add(message);
    }

    /// Log an elaboration error, unless the scope suppresses them
    /// (speculative elaboration whose failures are expected).
    pub fn log_error(&mut self, message: Message) {
        if self.ctx.suppress_elab_errors {
            return;
        }
        self.state.messages.add(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Position;
    use crate::options::{OptionSchema, OptionValue};
    use quill_kernel::Declaration;

    fn test_session() -> Session {
        let options = Options::new(Arc::new(OptionSchema::core()));
        let ctx = SessionContext::new(
            Name::from("Demo"),
            Arc::new(SourceMap::empty("demo.qll")),
            options,
        );
        let state = SessionState::new(Environment::new(), NameGenerator::default());
        Session::new(ctx, state)
    }

    #[test]
    fn test_run_returns_value_and_state() {
        let session = test_session();
        let (value, state) = Session::run(session.ctx, session.state, |s| {
            s.state.modify_env(|env| {
                env.add(Declaration::new(Name::from("t"), vec![], Level::zero()))
                    .unwrap();
            });
            Ok(42)
        })
        .unwrap();
        assert_eq!(value, 42);
        assert!(state.env().contains_on_branch(&Name::from("t")));
    }

    #[test]
    fn test_run_records_heartbeat_baseline() {
        let session = test_session();
        let mut state = session.state;
        state.heartbeats = 77;
        Session::run(session.ctx, state, |s| {
            assert_eq!(s.ctx.start_heartbeats, 77);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_env_mutation_invalidates_inst_cache() {
        let mut session = test_session();
        session.state.modify_env(|env| {
            env.add(Declaration::new(
                Name::from("c"),
                vec![Name::from("u")],
                Level::param(Name::from("u")),
            ))
            .unwrap();
        });

        let sort = session
            .state
            .instantiate_sort_cached(&Name::from("c"), &[Level::of_nat(2)])
            .unwrap();
        assert_eq!(sort, Level::of_nat(2));
        assert_eq!(session.state.inst_cache_len(), 1);

        session.state.modify_env(|env| {
            env.add(Declaration::new(Name::from("d"), vec![], Level::zero()))
                .unwrap();
        });
        assert_eq!(session.state.inst_cache_len(), 0);
    }

    #[test]
    fn test_inst_cache_revalidates_levels() {
        let mut session = test_session();
        session.state.modify_env(|env| {
            env.add(Declaration::new(
                Name::from("c"),
                vec![Name::from("u")],
                Level::param(Name::from("u")),
            ))
            .unwrap();
        });

        let first = session
            .state
            .instantiate_sort_cached(&Name::from("c"), &[Level::of_nat(1)])
            .unwrap();
        let second = session
            .state
            .instantiate_sort_cached(&Name::from("c"), &[Level::of_nat(3)])
            .unwrap();
        assert_eq!(first, Level::of_nat(1));
        assert_eq!(second, Level::of_nat(3));
    }

    #[test]
    fn test_with_options_propagates_and_restores() {
        let mut session = test_session();
        assert!(!session.ctx.diagnostics_enabled);

        session
            .with_options(
                |opts| opts.set(keys::DIAGNOSTICS, OptionValue::Bool(true)),
                |s| {
                    assert!(s.ctx.diagnostics_enabled);
                    assert!(s.state.env().diagnostics_enabled());
                    Ok(())
                },
            )
            .unwrap();

        assert!(!session.ctx.diagnostics_enabled);
        assert!(!session.state.env().diagnostics_enabled());
    }

    #[test]
    fn test_with_options_recomputes_caps() {
        let mut session = test_session();
        session
            .with_options(
                |opts| {
                    opts.set(keys::MAX_REC_DEPTH, OptionValue::Nat(3))?;
                    opts.set(keys::MAX_HEARTBEATS, OptionValue::Nat(9))
                },
                |s| {
                    assert_eq!(s.ctx.max_rec_depth, 3);
                    assert_eq!(s.ctx.max_heartbeats, 9);
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(session.ctx.max_rec_depth, 1000);
        assert_eq!(session.ctx.max_heartbeats, 200_000);
    }

    #[test]
    fn test_with_options_failed_update_leaves_session_untouched() {
        let mut session = test_session();
        let before_diag = session.ctx.diagnostics_enabled;
        let result: CoreResult<()> = session.with_options(
            |opts| opts.set("no.such.option", OptionValue::Bool(true)),
            |_| panic!("body must not run"),
        );
        assert!(result.is_err());
        assert_eq!(session.ctx.diagnostics_enabled, before_diag);
    }

    #[test]
    fn test_macro_scopes_are_monotonic() {
        let mut session = test_session();
        let a = session.fresh_macro_scope();
        let b = session.fresh_macro_scope();
        assert!(b > a);

        session
            .with_fresh_macro_scope(|s| {
                assert!(s.ctx.macro_scope > b);
                Ok(())
            })
            .unwrap();
        assert_eq!(session.ctx.macro_scope, 0);
    }

    #[test]
    fn test_trace_gated_by_category() {
        let mut session = test_session();
        session.trace(Name::from("elab.step"), || "dropped".to_string());
        assert!(session.state.traces.is_empty());

        session
            .with_trace_category(Name::from("elab"), |s| {
                s.trace(Name::from("elab.step"), || "kept".to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(session.state.traces.entries().len(), 1);
        assert_eq!(session.state.traces.entries()[0].text, "kept");
    }

    #[test]
    fn test_with_info_context_groups() {
        let mut session = test_session();
        session
            .with_info_context(Annotation::new(None, "outer"), |s| {
                s.state.infos.push_leaf(Annotation::new(None, "inner"));
                Ok(())
            })
            .unwrap();
        let roots = session.state.infos.roots();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].annotation.text, "outer");
        assert_eq!(roots[0].children[0].annotation.text, "inner");
    }

    #[test]
    fn test_log_error_respects_suppression() {
        let mut session = test_session();
        session
            .with_suppressed_elab_errors(|s| {
                let msg = s.message_at(0, Severity::Error, "speculative failure");
                s.log_error(msg);
                Ok(())
            })
            .unwrap();
        assert!(session.state.messages.is_empty());

        let msg = session.message_at(0, Severity::Error, "real failure");
        session.log_error(msg);
        assert!(session.state.messages.has_errors());
    }

    #[test]
    fn test_run_to_completion_maps_errors() {
        let session = test_session();
        let outcome = Session::run_to_completion(session.ctx, session.state, |s| {
            Err::<(), _>(s.mk_error(0, "boom"))
        });
        match outcome {
            Outcome::Failed { code, state } => {
                assert_eq!(code, 1);
                assert!(state.messages.has_errors());
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_run_to_completion_recovers_interrupt() {
        let session = test_session();
        let outcome =
            Session::run_to_completion(session.ctx, session.state, |_| {
                Err::<(), _>(SessionError::Interrupt)
            });
        assert!(matches!(outcome, Outcome::Interrupted));
    }

    #[test]
    fn test_message_at_uses_source_map() {
        let options = Options::new(Arc::new(OptionSchema::core()));
        let ctx = SessionContext::new(
            Name::from("Demo"),
            Arc::new(SourceMap::new("demo.qll", "ab\ncd")),
            options,
        );
        let state = SessionState::new(Environment::new(), NameGenerator::default());
        let session = Session::new(ctx, state);
        let msg = session.message_at(3, Severity::Warning, "here");
        assert_eq!(msg.pos, Position::new(2, 0));
        assert_eq!(&*msg.file, "demo.qll");
    }
}
