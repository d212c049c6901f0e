use std::sync::Arc;

use reqwest::Url;

use crate::common::errors::LoadError;
use crate::common::types::{RequestId, TaskId};

use super::sink::DataSink;

/// Byte window the consumer wants. `length == None` means "up to the end of
/// the resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    pub offset: u64,
    pub length: Option<u64>,
}

impl ByteWindow {
    pub fn bounded(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    pub fn to_end(offset: u64) -> Self {
        Self {
            offset,
            length: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Created,
    Dispatched,
    Receiving,
    Completed,
    Cancelled,
    Failed,
}

impl LoadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Dispatched | Self::Receiving)
    }
}

/// What the playback engine hands over when it needs bytes: the (possibly
/// prefixed) URL, the window, and the sink that receives the results.
#[derive(Clone)]
pub struct ResourceRequest {
    pub id: RequestId,
    pub url: String,
    pub window: Option<ByteWindow>,
    pub sink: Arc<dyn DataSink>,
}

impl ResourceRequest {
    pub fn new(url: impl Into<String>, window: Option<ByteWindow>, sink: Arc<dyn DataSink>) -> Self {
        Self {
            id: RequestId::generate(),
            url: url.into(),
            window,
            sink,
        }
    }
}

impl std::fmt::Debug for ResourceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRequest")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Authoritative state of one proxied request, owned by the registry while
/// its transport task is in flight.
#[derive(Clone)]
pub struct LoadingRequest {
    pub id: RequestId,
    pub target_url: Url,
    pub window: Option<ByteWindow>,
    /// Length of this window, once known.
    pub total_length: Option<u64>,
    pub bytes_delivered: u64,
    pub task_id: Option<TaskId>,
    pub state: LoadState,
    /// Reason recorded when this side aborts the task; reported instead of
    /// the transport's own cancellation error.
    pub failure: Option<LoadError>,
    sink: Arc<dyn DataSink>,
}

impl LoadingRequest {
    pub fn new(
        id: RequestId,
        target_url: Url,
        window: Option<ByteWindow>,
        sink: Arc<dyn DataSink>,
    ) -> Self {
        Self {
            id,
            target_url,
            window,
            total_length: window.and_then(|w| w.length),
            bytes_delivered: 0,
            task_id: None,
            state: LoadState::Created,
            failure: None,
            sink,
        }
    }

    pub fn sink(&self) -> &Arc<dyn DataSink> {
        &self.sink
    }

    pub fn mark_dispatched(&mut self, task: TaskId) {
        self.task_id = Some(task);
        self.state = LoadState::Dispatched;
    }

    /// Bytes still owed for this window, if its length is known.
    pub fn remaining(&self) -> Option<u64> {
        self.total_length
            .map(|total| total.saturating_sub(self.bytes_delivered))
    }

    pub fn is_satisfied(&self) -> bool {
        self.total_length == Some(self.bytes_delivered)
    }
}

impl std::fmt::Debug for LoadingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingRequest")
            .field("id", &self.id)
            .field("target_url", &self.target_url.as_str())
            .field("window", &self.window)
            .field("total_length", &self.total_length)
            .field("bytes_delivered", &self.bytes_delivered)
            .field("task_id", &self.task_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
