//! Task forking and the result tree
//!
//! A fork point captures the branch's context and state into a
//! `ForkedTask`: a self-contained closure any executor can run on any
//! thread. The parent keeps a `ResultHandle` to the node the task will
//! eventually produce; nodes form a tree because forked branches fork
//! further and log the nested handles into their own state.
//!
//! Isolation contract: concurrently-running tasks forked from the same
//! parent never observe each other's mutations. Everything in the state
//! is copied at the fork point (cheaply, the environment is persistent);
//! the only shared values are the environment snapshot and an explicitly
//! passed cancellation token.

use crate::error::{CoreResult, SessionError};
use crate::info::InfoNode;
use crate::message::{Message, MessageLog, Severity};
use crate::options::keys;
use crate::session::Session;
use crate::trace::TraceEntry;
use parking_lot::{Condvar, Mutex};
use quill_kernel::Name;
use std::sync::Arc;
use tracing::{debug, info};

/// One node of the result tree: everything a finished branch reports,
/// plus handles to the sub-branches it forked.
#[derive(Debug, Clone, Default)]
pub struct ResultNode {
    pub messages: Vec<Message>,
    pub traces: Vec<TraceEntry>,
    pub infos: Vec<InfoNode>,
    /// Nested handles, in the order the branch logged them
    pub children: Vec<ResultHandle>,
    /// The branch was cancelled; its partial output is not wanted
    pub interrupted: bool,
}

impl ResultNode {
    /// Visit this node and, in logging order, every (transitively)
    /// nested node, waiting for unfinished branches.
    pub fn walk(&self, f: &mut impl FnMut(&ResultNode)) {
        f(self);
        for child in &self.children {
            child.wait().walk(f);
        }
    }
}

/// Shared one-shot cell a forked task resolves exactly once.
#[derive(Debug, Default)]
struct ResultCell {
    slot: Mutex<Option<Arc<ResultNode>>>,
    cond: Condvar,
}

/// Handle to an asynchronously-produced result node.
#[derive(Debug, Clone, Default)]
pub struct ResultHandle {
    cell: Arc<ResultCell>,
}

impl ResultHandle {
    fn unresolved() -> Self {
        ResultHandle::default()
    }

    /// A handle that is already resolved, for results produced inline.
    pub fn resolved(node: ResultNode) -> Self {
        let handle = ResultHandle::unresolved();
        handle.resolve(node);
        handle
    }

    pub fn try_get(&self) -> Option<Arc<ResultNode>> {
        self.cell.slot.lock().clone()
    }

    /// Block until the producing task resolves the handle.
    pub fn wait(&self) -> Arc<ResultNode> {
        let mut slot = self.cell.slot.lock();
        loop {
            if let Some(node) = slot.clone() {
                return node;
            }
            self.cell.cond.wait(&mut slot);
        }
    }

    fn resolve(&self, node: ResultNode) {
        let mut slot = self.cell.slot.lock();
        if slot.is_none() {
            *slot = Some(Arc::new(node));
            self.cell.cond.notify_all();
        }
    }
}

/// A captured branch, ready to run on any executor.
///
/// Running never propagates an error: cancellation marks the node
/// `interrupted`, anything else becomes a logged error message.
pub struct ForkedTask {
    session: Session,
    handle: ResultHandle,
    action: Box<dyn FnOnce(&mut Session) -> CoreResult<()> + Send>,
}

impl ForkedTask {
    pub fn handle(&self) -> ResultHandle {
        self.handle.clone()
    }

    /// Run the captured action in isolation and resolve the handle with
    /// the branch's result node.
    pub fn run(mut self) {
        let outcome = (self.action)(&mut self.session);
        let session = &mut self.session;

        let mut interrupted = false;
        match outcome {
            Ok(()) => {}
            Err(SessionError::Interrupt) => {
                debug!(unit = %session.ctx.unit, "forked branch interrupted");
                interrupted = true;
            }
            Err(SessionError::Ordinary(msg)) => session.state.messages.add(msg),
            Err(err) => session
                .state
                .messages
                .add(Message::plain(Severity::Error, err.to_string())),
        }

        let captured = std::mem::take(&mut session.state.captured_output);
        if !captured.is_empty() {
            if session.ctx.options.get_bool(keys::STDERR_AS_MESSAGES) {
                session
                    .state
                    .messages
                    .add(Message::plain(Severity::Information, captured));
            } else {
                info!(target: "quill::output", unit = %session.ctx.unit, output = %captured);
            }
        }

        let node = ResultNode {
            messages: session.state.messages.take(),
            traces: session.state.traces.take(),
            infos: session.state.infos.take(),
            children: session.state.drain_result_handles(),
            interrupted,
        };
        self.handle.resolve(node);
    }
}

impl Session {
    /// Capture the current branch into an independently runnable task.
    ///
    /// The name generator is forked (the child keeps the fresh
    /// namespace, this branch keeps the advanced copy), the reporting
    /// buffers of the capture are reset so nothing the parent already
    /// reported is duplicated, and the heartbeat baseline stays at the
    /// top-level unit's start, so a nested fork cannot reset its own
    /// budget. A token passed here replaces the inherited one.
    pub fn fork_task(
        &mut self,
        cancel_token: Option<crate::governor::CancelToken>,
        action: impl FnOnce(&mut Session) -> CoreResult<()> + Send + 'static,
    ) -> (ResultHandle, ForkedTask) {
        let child_ngen = self.state.ngen.fork();

        let mut ctx = self.ctx.clone();
        if let Some(token) = cancel_token {
            ctx.cancel_token = Some(token);
        }

        let mut state = self.state.clone();
        state.ngen = child_ngen;
        state.traces.take();
        state.infos.take();
        state.messages = MessageLog::new();
        state.captured_output.clear();
        state.drain_result_handles();

        debug!(
            unit = %ctx.unit,
            elapsed = state.heartbeats.saturating_sub(ctx.start_heartbeats),
            "forking task"
        );

        let handle = ResultHandle::unresolved();
        let task = ForkedTask {
            session: Session::new(ctx, state),
            handle: handle.clone(),
            action: Box::new(action),
        };
        (handle, task)
    }

    /// Block on a forked result, recording the wait as a trace event.
    pub fn wait_for(&mut self, handle: &ResultHandle) -> Arc<ResultNode> {
        self.trace(Name::from("task.wait"), || {
            "waiting for forked result".to_string()
        });
        handle.wait()
    }
}

/// Runs forked tasks on detached threads, at most `max_tasks` at a time.
///
/// `spawn` blocks while the executor is at capacity; results still
/// arrive only through the tasks' handles.
#[derive(Clone)]
pub struct TaskExecutor {
    max_tasks: usize,
    shared: Arc<ExecShared>,
}

#[derive(Default)]
struct ExecShared {
    active: Mutex<usize>,
    cond: Condvar,
}

impl TaskExecutor {
    pub fn new(max_tasks: usize) -> Self {
        TaskExecutor {
            max_tasks: max_tasks.max(1),
            shared: Arc::new(ExecShared::default()),
        }
    }

    pub fn spawn(&self, task: ForkedTask) {
        let mut active = self.shared.active.lock();
        while *active >= self.max_tasks {
            self.shared.cond.wait(&mut active);
        }
        *active += 1;
        drop(active);

        let shared = Arc::clone(&self.shared);
        std::thread::spawn(move || {
            task.run();
            let mut active = shared.active.lock();
            *active -= 1;
            shared.cond.notify_all();
        });
    }

    /// Block until every spawned task has finished.
    pub fn wait_idle(&self) {
        let mut active = self.shared.active.lock();
        while *active > 0 {
            self.shared.cond.wait(&mut active);
        }
    }
}
