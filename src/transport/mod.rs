//! Transport boundary between the loader and an HTTP client.
//!
//! ```text
//!  ProxyManager ── create_task / resume / suspend / cancel ──► Transport
//!       ▲                                                        │
//!       └──── on_response / on_data / on_complete (TaskDelegate) ┘
//! ```
//!
//! Callbacks for one task are strictly ordered: one `on_response`, zero or
//! more `on_data`, then exactly one `on_complete`. Callbacks of different
//! tasks may interleave.

pub mod client;
pub mod http;

pub use client::create_client;
pub use http::HttpTransport;

use std::sync::Weak;

use bytes::Bytes;
use reqwest::{Url, header::HeaderMap};

use crate::common::errors::TransportError;
use crate::common::types::TaskId;

/// One outbound GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: Url,
    /// Value for the `Range` header, if any.
    pub range: Option<String>,
}

/// Status line and headers of a response, before any body bytes.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: HeaderMap,
    /// Declared body length (`Content-Length`), if any.
    pub content_length: Option<u64>,
}

impl ResponseHead {
    pub fn from_response(response: &reqwest::Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response.headers().clone(),
            content_length: response.content_length(),
        }
    }
}

/// Whether the transport should keep going after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Allow,
    /// Abort the task. The transport then reports
    /// `on_complete(Some(TransportError::Cancelled))`.
    Cancel,
}

/// Session-level receiver of task callbacks.
pub trait TaskDelegate: Send + Sync {
    fn on_response(&self, task: TaskId, head: &ResponseHead) -> Disposition;

    fn on_data(&self, task: TaskId, chunk: Bytes) -> Disposition;

    fn on_complete(&self, task: TaskId, error: Option<TransportError>);

    fn on_session_invalidated(&self, error: Option<TransportError>);
}

/// An HTTP client able to run, pause and abort tasks by id.
pub trait Transport: Send + Sync {
    /// Sets the delegate every task reports to.
    fn bind(&self, delegate: Weak<dyn TaskDelegate>);

    /// Creates a task in the suspended state. Nothing is sent until
    /// [`Transport::resume`] is called for it.
    fn create_task(&self, request: TransportRequest) -> TaskId;

    /// Starts a freshly created task, or continues a suspended one.
    fn resume(&self, task: TaskId);

    fn suspend(&self, task: TaskId);

    fn cancel(&self, task: TaskId);

    /// Cancels every task and reports `on_session_invalidated` once each of
    /// them has delivered its `on_complete`. The transport accepts no further
    /// work afterwards.
    fn invalidate(&self);
}
