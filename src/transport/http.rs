//! `HttpTransport`: reqwest + tokio implementation of [`Transport`].
//!
//! Every resumed task runs on its own tokio task, which keeps one task's
//! callbacks ordered while letting different tasks interleave. A per-task
//! control block carries the not-yet-started request, a suspend flag and a
//! cancellation token.

use std::{
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, RANGE};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::{
    Disposition, ResponseHead, TaskDelegate, Transport, TransportRequest, create_client,
};
use crate::common::errors::TransportError;
use crate::common::types::{AnyResult, TaskId, TaskIdAllocator};
use crate::configs::TransportConfig;

struct TaskControl {
    /// Set until the first `resume`.
    pending: Option<TransportRequest>,
    suspended: watch::Sender<bool>,
    cancel: CancellationToken,
    /// Closes once the runner has reported its completion.
    finished: Option<watch::Receiver<()>>,
}

pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout: Duration,
    runtime: tokio::runtime::Handle,
    ids: TaskIdAllocator,
    tasks: Arc<DashMap<TaskId, TaskControl>>,
    delegate: RwLock<Option<Weak<dyn TaskDelegate>>>,
    invalidated: AtomicBool,
}

impl HttpTransport {
    pub fn new(
        client: reqwest::Client,
        request_timeout: Duration,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            client,
            request_timeout,
            runtime,
            ids: TaskIdAllocator::new(),
            tasks: Arc::new(DashMap::new()),
            delegate: RwLock::new(None),
            invalidated: AtomicBool::new(false),
        }
    }

    /// Builds the client from config and binds to the current tokio runtime.
    pub fn from_config(config: &TransportConfig) -> AnyResult<Self> {
        let client = create_client(config)?;
        let runtime = tokio::runtime::Handle::try_current()?;
        Ok(Self::new(client, config.request_timeout(), runtime))
    }

    /// Number of tasks created and not yet finished.
    pub fn active_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn delegate(&self) -> Option<Weak<dyn TaskDelegate>> {
        self.delegate.read().clone()
    }

    fn report_complete(&self, task: TaskId, error: TransportError) {
        let delegate = self.delegate();
        self.runtime.spawn(async move {
            if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
                delegate.on_complete(task, Some(error));
            }
        });
    }
}

impl Transport for HttpTransport {
    fn bind(&self, delegate: Weak<dyn TaskDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    fn create_task(&self, request: TransportRequest) -> TaskId {
        let id = self.ids.next();
        let (suspended, _) = watch::channel(false);
        self.tasks.insert(
            id,
            TaskControl {
                pending: Some(request),
                suspended,
                cancel: CancellationToken::new(),
                finished: None,
            },
        );
        id
    }

    fn resume(&self, task: TaskId) {
        if self.invalidated.load(Ordering::Acquire) {
            // A running task is already cancelled and reports for itself.
            if self
                .tasks
                .remove_if(&task, |_, control| control.pending.is_some())
                .is_some()
            {
                self.report_complete(task, TransportError::SessionInvalidated);
            }
            return;
        }

        let Some(mut control) = self.tasks.get_mut(&task) else {
            trace!("resume for unknown task {}", task);
            return;
        };

        let pending = control.pending.take();
        match pending {
            Some(request) => {
                let ctx = TaskContext {
                    id: task,
                    client: self.client.clone(),
                    request_timeout: self.request_timeout,
                    suspended: control.suspended.subscribe(),
                    cancel: control.cancel.clone(),
                    delegate: self.delegate(),
                };
                let (finished, finished_rx) = watch::channel(());
                control.finished = Some(finished_rx);
                drop(control);

                let tasks = self.tasks.clone();
                self.runtime.spawn(async move {
                    let id = ctx.id;
                    let delegate = ctx.delegate.clone();
                    let outcome = run_task(ctx, request).await;
                    if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
                        delegate.on_complete(id, outcome.err());
                    }
                    tasks.remove(&id);
                    drop(finished);
                });
            }
            None => {
                control.suspended.send_replace(false);
            }
        }
    }

    fn suspend(&self, task: TaskId) {
        if let Some(control) = self.tasks.get(&task) {
            control.suspended.send_replace(true);
        }
    }

    fn cancel(&self, task: TaskId) {
        // A task that never started has no runner to report for it.
        if self
            .tasks
            .remove_if(&task, |_, control| control.pending.is_some())
            .is_some()
        {
            self.report_complete(task, TransportError::Cancelled);
            return;
        }

        if let Some(control) = self.tasks.get(&task) {
            control.cancel.cancel();
        }
    }

    fn invalidate(&self) {
        if self.invalidated.swap(true, Ordering::AcqRel) {
            return;
        }

        let ids: Vec<TaskId> = self.tasks.iter().map(|entry| *entry.key()).collect();
        debug!("Invalidating transport session ({} tasks)", ids.len());

        let mut unstarted = Vec::new();
        let mut running = Vec::new();
        for id in ids {
            if self
                .tasks
                .remove_if(&id, |_, control| control.pending.is_some())
                .is_some()
            {
                unstarted.push(id);
            } else if let Some(control) = self.tasks.get(&id) {
                control.cancel.cancel();
                running.extend(control.finished.clone());
            }
        }

        // Every cancelled task has reported before the session event goes out.
        let delegate = self.delegate();
        self.runtime.spawn(async move {
            if let Some(delegate) = delegate.as_ref().and_then(|d| d.upgrade()) {
                for id in unstarted {
                    delegate.on_complete(id, Some(TransportError::Cancelled));
                }
            }
            for mut finished in running {
                let _ = finished.changed().await;
            }
            if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
                delegate.on_session_invalidated(None);
            }
        });
    }
}

struct TaskContext {
    id: TaskId,
    client: reqwest::Client,
    request_timeout: Duration,
    suspended: watch::Receiver<bool>,
    cancel: CancellationToken,
    delegate: Option<Weak<dyn TaskDelegate>>,
}

impl TaskContext {
    fn delegate(&self) -> Result<Arc<dyn TaskDelegate>, TransportError> {
        self.delegate
            .as_ref()
            .and_then(|d| d.upgrade())
            .ok_or(TransportError::Cancelled)
    }

    async fn wait_while_suspended(&mut self) -> Result<(), TransportError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            if !*self.suspended.borrow_and_update() {
                return Ok(());
            }
            trace!("Task {} suspended", self.id);
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(TransportError::Cancelled),
                changed = self.suspended.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Waits for `fut` unless suspended, cancelled, or idle past the request
    /// timeout.
    async fn next<F: Future>(&mut self, fut: F) -> Result<F::Output, TransportError> {
        self.wait_while_suspended().await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransportError::Cancelled),
            out = tokio::time::timeout(self.request_timeout, fut) => {
                out.map_err(|_| TransportError::Timeout)
            }
        }
    }
}

async fn run_task(mut ctx: TaskContext, request: TransportRequest) -> Result<(), TransportError> {
    let mut builder = ctx
        .client
        .get(request.url.clone())
        .header(ACCEPT, "*/*")
        .header(ACCEPT_ENCODING, "identity");
    if let Some(range) = &request.range {
        builder = builder.header(RANGE, range);
    }

    debug!(
        "Task {}: GET {} (range={:?})",
        ctx.id, request.url, request.range
    );

    let response = ctx.next(builder.send()).await??;
    let head = ResponseHead::from_response(&response);
    trace!("Task {}: HTTP {}", ctx.id, head.status);

    if ctx.delegate()?.on_response(ctx.id, &head) == Disposition::Cancel {
        return Err(TransportError::Cancelled);
    }

    let mut stream = Box::pin(response.bytes_stream());
    loop {
        match ctx.next(stream.next()).await? {
            Some(Ok(chunk)) => {
                if ctx.delegate()?.on_data(ctx.id, chunk) == Disposition::Cancel {
                    return Err(TransportError::Cancelled);
                }
            }
            Some(Err(e)) => {
                warn!("Task {}: body read failed: {}", ctx.id, e);
                return Err(e.into());
            }
            None => return Ok(()),
        }
    }
}
