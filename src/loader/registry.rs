use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::types::{RequestId, TaskId};

use super::request::{LoadState, LoadingRequest};

/// Outcome of an [`RequestRegistry::update`] closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    Keep,
    /// Remove the entry and move it into the given terminal state.
    Retire(LoadState),
}

#[derive(Default)]
struct RegistryState {
    by_task: HashMap<TaskId, LoadingRequest>,
    by_request: HashMap<RequestId, TaskId>,
}

/// Index from transport task to the in-flight loading request it serves.
///
/// Only `Dispatched`/`Receiving` requests live here. Retiring an entry sets
/// its terminal state in the same critical section that removes it, so a
/// terminal request is never discoverable by task id.
#[derive(Default)]
pub struct RequestRegistry {
    state: Mutex<RegistryState>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the transport task for `request` and registers it in one
    /// critical section, so a callback for the new task always finds it.
    ///
    /// `create` runs under the registry lock and must not call back into the
    /// registry. Returns `None` without calling `create` when the request id
    /// is already registered.
    pub fn register(
        &self,
        mut request: LoadingRequest,
        create: impl FnOnce() -> TaskId,
    ) -> Option<TaskId> {
        let mut state = self.state.lock();
        if state.by_request.contains_key(&request.id) {
            return None;
        }

        let task = create();
        if state.by_task.contains_key(&task) {
            return None;
        }
        request.mark_dispatched(task);
        state.by_request.insert(request.id, task);
        state.by_task.insert(task, request);
        Some(task)
    }

    /// Snapshot of the request served by `task`.
    pub fn get(&self, task: TaskId) -> Option<LoadingRequest> {
        self.state.lock().by_task.get(&task).cloned()
    }

    pub fn task_of(&self, id: RequestId) -> Option<TaskId> {
        self.state.lock().by_request.get(&id).copied()
    }

    /// Mutates the request served by `task` under the registry lock.
    ///
    /// Returns `None` when the task is unknown. Otherwise returns the closure
    /// result and, if the closure asked to retire the entry, the removed
    /// request in its terminal state.
    pub fn update<R>(
        &self,
        task: TaskId,
        f: impl FnOnce(&mut LoadingRequest) -> (R, Retention),
    ) -> Option<(R, Option<LoadingRequest>)> {
        let mut state = self.state.lock();
        let request = state.by_task.get_mut(&task)?;
        let (result, retention) = f(request);

        let retired = match retention {
            Retention::Keep => None,
            Retention::Retire(terminal) => Self::retire_locked(&mut state, task, terminal),
        };
        Some((result, retired))
    }

    /// Removes the request served by `task`, leaving it in `terminal` state.
    pub fn remove(&self, task: TaskId, terminal: LoadState) -> Option<LoadingRequest> {
        let mut state = self.state.lock();
        Self::retire_locked(&mut state, task, terminal)
    }

    /// Removes the request with the given id, leaving it in `terminal` state.
    pub fn remove_request(&self, id: RequestId, terminal: LoadState) -> Option<LoadingRequest> {
        let mut state = self.state.lock();
        let task = *state.by_request.get(&id)?;
        Self::retire_locked(&mut state, task, terminal)
    }

    fn retire_locked(
        state: &mut RegistryState,
        task: TaskId,
        terminal: LoadState,
    ) -> Option<LoadingRequest> {
        debug_assert!(terminal.is_terminal());
        let mut request = state.by_task.remove(&task)?;
        state.by_request.remove(&request.id);
        request.state = terminal;
        Some(request)
    }

    /// Calls `f` for a snapshot of every registered request. The lock is not
    /// held while `f` runs, so `f` may call into the transport freely.
    pub fn for_each(&self, mut f: impl FnMut(&LoadingRequest)) {
        let snapshot: Vec<LoadingRequest> = self.state.lock().by_task.values().cloned().collect();
        for request in &snapshot {
            f(request);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().by_task.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
