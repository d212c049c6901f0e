//! `ProxyManager` — turns playback-engine loading requests into transport
//! tasks and feeds the transport's callbacks back into the right request.
//!
//! # Flow
//!
//! ```text
//!  engine ── should_wait_for_loading ──► start ──► resolve_range ──► Transport::create_task
//!                                                                        │
//!  DataSink ◄── set_content_info / respond / finish_loading ◄── TaskDelegate callbacks
//! ```
//!
//! All request state lives in the [`RequestRegistry`]. Sink calls are made
//! after the registry lock is released, with the byte count already
//! committed.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use super::{
    inspect::{ContentInfo, inspect},
    range::resolve_range,
    registry::{RequestRegistry, Retention},
    request::{LoadState, LoadingRequest, ResourceRequest},
    rewrite::UrlRewriter,
    sink::ResourceLoaderDelegate,
};
use crate::common::errors::{LoadError, LoadResult, TransportError};
use crate::common::types::{AnyResult, RequestId, TaskId};
use crate::configs::{Config, LoaderConfig};
use crate::transport::{
    Disposition, HttpTransport, ResponseHead, TaskDelegate, Transport, TransportRequest,
};

struct ManagerInner {
    registry: RequestRegistry,
    transport: Arc<dyn Transport>,
    rewriter: UrlRewriter,
}

/// Multiplexes many concurrent loading requests over one transport.
#[derive(Clone)]
pub struct ProxyManager {
    inner: Arc<ManagerInner>,
}

impl ProxyManager {
    pub fn new(transport: Arc<dyn Transport>, config: &LoaderConfig) -> Self {
        let inner = Arc::new(ManagerInner {
            registry: RequestRegistry::new(),
            transport,
            rewriter: UrlRewriter::new(config.url_prefix.clone()),
        });

        let delegate = Arc::downgrade(&inner);
        let delegate: Weak<dyn TaskDelegate> = delegate;
        inner.transport.bind(delegate);

        Self { inner }
    }

    /// Builds an [`HttpTransport`] on the current tokio runtime.
    pub fn from_config(config: &Config) -> AnyResult<Self> {
        let transport = HttpTransport::from_config(&config.transport)?;
        Ok(Self::new(Arc::new(transport), &config.loader))
    }

    /// URL to hand to the playback engine so its requests come back here.
    pub fn proxied_url(&self, origin: &str) -> String {
        self.inner.rewriter.wrap(origin)
    }

    /// Dispatches a loading request. Returns once the task is queued.
    ///
    /// A request that cannot be dispatched is finished on its sink with the
    /// error, and the same error is returned.
    pub fn start(&self, request: ResourceRequest) -> LoadResult<RequestId> {
        let sink = request.sink.clone();
        match self.inner.dispatch(request) {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!("Refusing to dispatch loading request: {}", e);
                sink.finish_loading(Err(e.clone()));
                Err(e)
            }
        }
    }

    /// Cancels an in-flight request. Returns `false` when it was not found,
    /// e.g. because it already finished. The sink is not called.
    pub fn cancel(&self, id: RequestId) -> bool {
        let Some(request) = self
            .inner
            .registry
            .remove_request(id, LoadState::Cancelled)
        else {
            trace!("Cancel for request {} ignored: not in flight", id);
            return false;
        };

        if let Some(task) = request.task_id {
            self.inner.transport.cancel(task);
        }
        debug!(
            "Cancelled request {} (task {:?}, {} bytes delivered)",
            id, request.task_id, request.bytes_delivered
        );
        true
    }

    /// Pauses every in-flight task, e.g. while the network link changes.
    pub fn suspend_all(&self) {
        let transport = &self.inner.transport;
        let mut count = 0usize;
        self.inner.registry.for_each(|request| {
            if let Some(task) = request.task_id {
                transport.suspend(task);
                count += 1;
            }
        });
        info!("Suspended {} loading tasks", count);
    }

    pub fn resume_all(&self) {
        let transport = &self.inner.transport;
        let mut count = 0usize;
        self.inner.registry.for_each(|request| {
            if let Some(task) = request.task_id {
                transport.resume(task);
                count += 1;
            }
        });
        info!("Resumed {} loading tasks", count);
    }

    /// Tears down the transport session. In-flight requests finish with
    /// the transport's cancellation error.
    pub fn invalidate(&self) {
        self.inner.transport.invalidate();
    }

    pub fn pending_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// State of an in-flight request; `None` once it has left the registry.
    pub fn state_of(&self, id: RequestId) -> Option<LoadState> {
        self.snapshot(id).map(|r| r.state)
    }

    pub fn bytes_delivered(&self, id: RequestId) -> Option<u64> {
        self.snapshot(id).map(|r| r.bytes_delivered)
    }

    fn snapshot(&self, id: RequestId) -> Option<LoadingRequest> {
        let task = self.inner.registry.task_of(id)?;
        self.inner.registry.get(task)
    }
}

impl ResourceLoaderDelegate for ProxyManager {
    fn should_wait_for_loading(&self, request: ResourceRequest) -> bool {
        let _ = self.start(request);
        true
    }

    fn did_cancel(&self, id: RequestId) {
        self.cancel(id);
    }
}

impl ManagerInner {
    fn dispatch(&self, request: ResourceRequest) -> LoadResult<RequestId> {
        let ResourceRequest {
            id,
            url,
            window,
            sink,
        } = request;

        let target_url = self.rewriter.unwrap(&url)?;
        let range = resolve_range(window.as_ref())?;

        let loading = LoadingRequest::new(id, target_url.clone(), window, sink);
        let transport = &self.transport;
        let task = self
            .registry
            .register(loading, || {
                transport.create_task(TransportRequest {
                    url: target_url,
                    range: range.clone(),
                })
            })
            .ok_or(LoadError::DuplicateRequest(id))?;

        debug!("Dispatched request {} as task {} (range={:?})", id, task, range);
        self.transport.resume(task);
        Ok(id)
    }
}

/// Checks a response against the request it answers.
fn accept_response(request: &LoadingRequest, head: &ResponseHead) -> LoadResult<ContentInfo> {
    let info = inspect(head)?;

    let offset = request.window.map(|w| w.offset).unwrap_or(0);
    let aligned = match info.content_range {
        Some(range) => range.start == offset,
        None => offset == 0,
    };
    if !aligned {
        return Err(LoadError::RangeNotHonoured {
            status: head.status,
        });
    }

    Ok(info)
}

/// Bytes this response will carry for the window, if known.
fn served_length(info: &ContentInfo, head: &ResponseHead) -> Option<u64> {
    match info.content_range {
        Some(range) => Some(range.len()),
        None => head.content_length,
    }
}

impl TaskDelegate for ManagerInner {
    fn on_response(&self, task: TaskId, head: &ResponseHead) -> Disposition {
        let outcome = self.registry.update(task, |request| {
            let accepted = accept_response(request, head);
            match &accepted {
                Ok(info) => {
                    // A window running past EOF is clipped to what is served.
                    request.total_length = match (request.total_length, served_length(info, head)) {
                        (Some(wanted), Some(served)) => Some(wanted.min(served)),
                        (wanted, served) => wanted.or(served),
                    };
                }
                Err(e) => request.failure = Some(e.clone()),
            }
            ((accepted, request.sink().clone(), request.id), Retention::Keep)
        });

        let Some(((accepted, sink, id), _)) = outcome else {
            trace!("Response for unknown task {} ignored", task);
            return Disposition::Cancel;
        };

        match accepted {
            Ok(info) => {
                debug!(
                    "Content info for request {}: type={}, length={:?}, byte_range={}",
                    id,
                    info.content_type.identifier(),
                    info.content_length,
                    info.byte_range_access
                );
                sink.set_content_info(&info);
                Disposition::Allow
            }
            Err(e) => {
                warn!("Aborting task {} for request {}: {}", task, id, e);
                Disposition::Cancel
            }
        }
    }

    fn on_data(&self, task: TaskId, chunk: Bytes) -> Disposition {
        if chunk.is_empty() {
            return Disposition::Allow;
        }

        let len = chunk.len() as u64;
        let step = self.registry.update(task, |request| {
            request.state = LoadState::Receiving;
            let take = request.remaining().map_or(len, |left| left.min(len));
            request.bytes_delivered += take;

            let retention = if request.is_satisfied() {
                Retention::Retire(LoadState::Completed)
            } else {
                Retention::Keep
            };
            ((request.sink().clone(), take), retention)
        });

        let Some(((sink, take), completed)) = step else {
            trace!("Data for unknown task {} dropped ({} bytes)", task, len);
            return Disposition::Cancel;
        };

        if take > 0 {
            sink.respond(chunk.slice(..take as usize));
        }

        if let Some(done) = completed {
            debug!(
                "Request {} complete: {} bytes (task {})",
                done.id, done.bytes_delivered, task
            );
            sink.finish_loading(Ok(()));
        }

        if take < len {
            trace!("Task {} sent {} bytes past its window", task, len - take);
            Disposition::Cancel
        } else {
            Disposition::Allow
        }
    }

    fn on_complete(&self, task: TaskId, error: Option<TransportError>) {
        let outcome = self.registry.update(task, |request| {
            let result = match (request.failure.take(), error) {
                (Some(failure), _) => Err(failure),
                (None, Some(e)) => Err(LoadError::Transport(e)),
                (None, None) => match request.total_length {
                    Some(expected) if request.bytes_delivered < expected => {
                        Err(LoadError::PrematureCompletion {
                            delivered: request.bytes_delivered,
                            expected,
                        })
                    }
                    _ => Ok(()),
                },
            };
            let terminal = if result.is_ok() {
                LoadState::Completed
            } else {
                LoadState::Failed
            };
            ((result, request.sink().clone()), Retention::Retire(terminal))
        });

        let Some(((result, sink), retired)) = outcome else {
            trace!("Completion for unknown task {} ignored", task);
            return;
        };

        if let Some(request) = retired {
            match &result {
                Ok(()) => debug!(
                    "Request {} complete at end of body: {} bytes (task {})",
                    request.id, request.bytes_delivered, task
                ),
                Err(e) => warn!(
                    "Request {} failed after {} bytes (task {}): {}",
                    request.id, request.bytes_delivered, task, e
                ),
            }
        }
        sink.finish_loading(result);
    }

    fn on_session_invalidated(&self, error: Option<TransportError>) {
        match error {
            Some(e) => warn!("Transport session invalidated: {}", e),
            None => warn!("Transport session invalidated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::common::types::TaskIdAllocator;
    use crate::loader::request::ByteWindow;
    use crate::loader::sink::{ChannelSink, SinkEvent};

    #[derive(Default)]
    struct MockTransport {
        ids: TaskIdAllocator,
        delegate: Mutex<Option<Weak<dyn TaskDelegate>>>,
        created: Mutex<Vec<(TaskId, TransportRequest)>>,
        resumed: Mutex<Vec<TaskId>>,
        suspended: Mutex<Vec<TaskId>>,
        cancelled: Mutex<Vec<TaskId>>,
        invalidated: AtomicBool,
    }

    impl MockTransport {
        fn delegate(&self) -> Arc<dyn TaskDelegate> {
            self.delegate
                .lock()
                .as_ref()
                .and_then(|d| d.upgrade())
                .expect("manager bound a delegate")
        }

        fn request(&self, task: TaskId) -> TransportRequest {
            self.created
                .lock()
                .iter()
                .find(|(id, _)| *id == task)
                .map(|(_, r)| r.clone())
                .expect("task was created")
        }
    }

    impl Transport for MockTransport {
        fn bind(&self, delegate: Weak<dyn TaskDelegate>) {
            *self.delegate.lock() = Some(delegate);
        }

        fn create_task(&self, request: TransportRequest) -> TaskId {
            let id = self.ids.next();
            self.created.lock().push((id, request));
            id
        }

        fn resume(&self, task: TaskId) {
            self.resumed.lock().push(task);
        }

        fn suspend(&self, task: TaskId) {
            self.suspended.lock().push(task);
        }

        fn cancel(&self, task: TaskId) {
            self.cancelled.lock().push(task);
        }

        fn invalidate(&self) {
            self.invalidated.store(true, Ordering::SeqCst);
            self.delegate().on_session_invalidated(None);
        }
    }

    fn setup() -> (ProxyManager, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::default());
        let manager = ProxyManager::new(transport.clone(), &LoaderConfig::default());
        (manager, transport)
    }

    fn head(status: u16, headers: &[(&str, &str)], content_length: Option<u64>) -> ResponseHead {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        ResponseHead {
            status,
            headers: map,
            content_length,
        }
    }

    fn start(
        manager: &ProxyManager,
        window: Option<ByteWindow>,
    ) -> (RequestId, TaskId, UnboundedReceiver<SinkEvent>) {
        let (sink, rx) = ChannelSink::new();
        let url = manager.proxied_url("https://origin.test/media/song.mp3");
        let id = manager
            .start(ResourceRequest::new(url, window, Arc::new(sink)))
            .expect("dispatch");
        let task = manager.inner.registry.task_of(id).expect("registered");
        (id, task, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<SinkEvent>) -> Vec<SinkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn data_len(events: &[SinkEvent]) -> usize {
        events
            .iter()
            .map(|e| match e {
                SinkEvent::Data(d) => d.len(),
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_start_strips_prefix_and_sets_range() {
        let (manager, transport) = setup();
        let (id, task, _rx) = start(&manager, Some(ByteWindow::bounded(1000, 500)));

        let request = transport.request(task);
        assert_eq!(request.url.as_str(), "https://origin.test/media/song.mp3");
        assert_eq!(request.range.as_deref(), Some("bytes=1000-1499"));
        assert_eq!(transport.resumed.lock().as_slice(), &[task]);
        assert_eq!(manager.state_of(id), Some(LoadState::Dispatched));
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn test_two_chunks_fill_window() {
        let (manager, transport) = setup();
        let (id, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 1000)));
        let delegate = transport.delegate();

        let disposition = delegate.on_response(
            task,
            &head(
                206,
                &[
                    ("Content-Range", "bytes 0-999/5000"),
                    ("Content-Type", "audio/mpeg"),
                ],
                Some(1000),
            ),
        );
        assert_eq!(disposition, Disposition::Allow);
        assert_eq!(delegate.on_data(task, Bytes::from(vec![1u8; 600])), Disposition::Allow);
        assert_eq!(manager.state_of(id), Some(LoadState::Receiving));
        assert_eq!(manager.bytes_delivered(id), Some(600));
        assert_eq!(delegate.on_data(task, Bytes::from(vec![2u8; 400])), Disposition::Allow);
        delegate.on_complete(task, None);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        match &events[0] {
            SinkEvent::ContentInfo(info) => {
                assert_eq!(info.content_length, Some(5000));
                assert!(info.byte_range_access);
                assert_eq!(info.content_type.identifier(), "public.mp3");
            }
            other => panic!("expected content info, got {:?}", other),
        }
        assert_eq!(events[1], SinkEvent::Data(Bytes::from(vec![1u8; 600])));
        assert_eq!(events[2], SinkEvent::Data(Bytes::from(vec![2u8; 400])));
        assert_eq!(events[3], SinkEvent::Finished(Ok(())));
        assert_eq!(manager.state_of(id), None);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_cancel_before_data() {
        let (manager, transport) = setup();
        let (id, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 1000)));
        let delegate = transport.delegate();

        assert!(manager.cancel(id));
        assert!(!manager.cancel(id));
        assert_eq!(transport.cancelled.lock().as_slice(), &[task]);
        assert_eq!(manager.pending_count(), 0);

        let late = head(206, &[("Content-Range", "bytes 0-999/5000"), ("Content-Type", "audio/mpeg")], None);
        assert_eq!(delegate.on_response(task, &late), Disposition::Cancel);
        assert_eq!(delegate.on_data(task, Bytes::from_static(b"late")), Disposition::Cancel);
        delegate.on_complete(task, Some(TransportError::Cancelled));

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_clean_completion_short_of_window_is_premature() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 1000)));
        let delegate = transport.delegate();

        delegate.on_response(
            task,
            &head(206, &[("Content-Range", "bytes 0-999/5000"), ("Content-Type", "audio/mpeg")], None),
        );
        delegate.on_complete(task, None);

        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&SinkEvent::Finished(Err(LoadError::PrematureCompletion {
                delivered: 0,
                expected: 1000
            })))
        );
        assert_eq!(data_len(&events), 0);
    }

    #[test]
    fn test_unresolvable_mime_aborts_without_metadata() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 10)));
        let delegate = transport.delegate();

        let disposition = delegate.on_response(task, &head(206, &[("Content-Range", "bytes 0-9/10")], None));
        assert_eq!(disposition, Disposition::Cancel);
        delegate.on_complete(task, Some(TransportError::Cancelled));

        assert_eq!(
            drain(&mut rx),
            vec![SinkEvent::Finished(Err(LoadError::UnresolvableContentType {
                mime: None
            }))]
        );
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_error_status_aborts() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, None);
        let delegate = transport.delegate();

        assert_eq!(
            delegate.on_response(task, &head(404, &[("Content-Type", "text/html")], Some(9))),
            Disposition::Cancel
        );
        delegate.on_complete(task, Some(TransportError::Cancelled));
        assert_eq!(
            drain(&mut rx),
            vec![SinkEvent::Finished(Err(LoadError::HttpStatus { status: 404 }))]
        );
    }

    #[test]
    fn test_ignored_range_is_rejected() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(500, 100)));
        let delegate = transport.delegate();

        assert_eq!(
            delegate.on_response(task, &head(200, &[("Content-Type", "audio/mpeg")], Some(5000))),
            Disposition::Cancel
        );
        delegate.on_complete(task, Some(TransportError::Cancelled));
        assert_eq!(
            drain(&mut rx),
            vec![SinkEvent::Finished(Err(LoadError::RangeNotHonoured { status: 200 }))]
        );
    }

    #[test]
    fn test_transport_error_is_forwarded_once() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 100)));
        let delegate = transport.delegate();

        delegate.on_response(
            task,
            &head(206, &[("Content-Range", "bytes 0-99/100"), ("Content-Type", "audio/mp4")], None),
        );
        delegate.on_data(task, Bytes::from(vec![0u8; 40]));
        delegate.on_complete(task, Some(TransportError::http("connection reset")));
        delegate.on_complete(task, Some(TransportError::http("connection reset")));

        let events = drain(&mut rx);
        let finishes: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Finished(_)))
            .collect();
        assert_eq!(
            finishes,
            vec![&SinkEvent::Finished(Err(LoadError::Transport(
                TransportError::http("connection reset")
            )))]
        );
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_surplus_bytes_are_trimmed() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 100)));
        let delegate = transport.delegate();

        // Origin ignored the Range header and is sending the whole resource.
        delegate.on_response(task, &head(200, &[("Content-Type", "audio/mpeg")], Some(1000)));
        assert_eq!(delegate.on_data(task, Bytes::from(vec![7u8; 150])), Disposition::Cancel);
        delegate.on_complete(task, Some(TransportError::Cancelled));

        let events = drain(&mut rx);
        assert_eq!(data_len(&events), 100);
        assert_eq!(events.last(), Some(&SinkEvent::Finished(Ok(()))));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_delivery_is_contiguous_and_bounded() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 1000)));
        let delegate = transport.delegate();

        delegate.on_response(
            task,
            &head(206, &[("Content-Range", "bytes 0-999/5000"), ("Content-Type", "audio/mpeg")], None),
        );
        let source: Vec<u8> = (0..1400u32).map(|i| (i % 251) as u8).collect();
        for chunk in source.chunks(7) {
            delegate.on_data(task, Bytes::copy_from_slice(chunk));
        }

        let events = drain(&mut rx);
        let mut received = Vec::new();
        for event in &events {
            if let SinkEvent::Data(d) = event {
                received.extend_from_slice(d);
            }
        }
        assert_eq!(received.len(), 1000);
        assert_eq!(received.as_slice(), &source[..1000]);
        assert_eq!(events.last(), Some(&SinkEvent::Finished(Ok(()))));
    }

    #[test]
    fn test_open_ended_window_learns_length_from_response() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::to_end(100)));
        assert_eq!(transport.request(task).range.as_deref(), Some("bytes=100-"));
        let delegate = transport.delegate();

        delegate.on_response(
            task,
            &head(206, &[("Content-Range", "bytes 100-199/200"), ("Content-Type", "audio/flac")], Some(100)),
        );
        delegate.on_data(task, Bytes::from(vec![0u8; 100]));

        let events = drain(&mut rx);
        assert_eq!(data_len(&events), 100);
        assert_eq!(events.last(), Some(&SinkEvent::Finished(Ok(()))));
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_empty_resource_is_success() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, None);
        assert_eq!(transport.request(task).range, None);
        let delegate = transport.delegate();

        delegate.on_response(task, &head(200, &[("Content-Type", "audio/mpeg")], Some(0)));
        delegate.on_data(task, Bytes::new());
        delegate.on_complete(task, None);

        let events = drain(&mut rx);
        assert!(matches!(events[0], SinkEvent::ContentInfo(_)));
        assert_eq!(events[1..], [SinkEvent::Finished(Ok(()))]);
    }

    #[test]
    fn test_unknown_length_finishes_at_end_of_body() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, None);
        let delegate = transport.delegate();

        delegate.on_response(task, &head(200, &[("Content-Type", "audio/ogg")], None));
        delegate.on_data(task, Bytes::from_static(b"0123456789"));
        delegate.on_complete(task, None);

        let events = drain(&mut rx);
        assert_eq!(data_len(&events), 10);
        assert_eq!(events.last(), Some(&SinkEvent::Finished(Ok(()))));
    }

    #[test]
    fn test_suspend_and_resume_keep_requests() {
        let (manager, transport) = setup();
        let (a, task_a, _rx_a) = start(&manager, Some(ByteWindow::bounded(0, 1000)));
        let (b, task_b, _rx_b) = start(&manager, Some(ByteWindow::bounded(1000, 1000)));
        let delegate = transport.delegate();

        delegate.on_response(
            task_a,
            &head(206, &[("Content-Range", "bytes 0-999/5000"), ("Content-Type", "audio/mpeg")], None),
        );
        delegate.on_data(task_a, Bytes::from(vec![0u8; 300]));

        manager.suspend_all();
        let mut suspended = transport.suspended.lock().clone();
        suspended.sort();
        assert_eq!(suspended, vec![task_a, task_b]);

        manager.resume_all();
        let resumed = transport.resumed.lock().clone();
        assert_eq!(resumed.iter().filter(|t| **t == task_a).count(), 2);
        assert_eq!(resumed.iter().filter(|t| **t == task_b).count(), 2);

        assert_eq!(manager.pending_count(), 2);
        assert_eq!(manager.bytes_delivered(a), Some(300));
        assert_eq!(manager.bytes_delivered(b), Some(0));
        assert_eq!(manager.state_of(a), Some(LoadState::Receiving));
        assert_eq!(manager.state_of(b), Some(LoadState::Dispatched));
    }

    #[test]
    fn test_invalid_url_is_refused() {
        let (manager, transport) = setup();
        let (sink, mut rx) = ChannelSink::new();
        let result = manager.start(ResourceRequest::new("AudioNet::nope", None, Arc::new(sink)));

        assert!(matches!(result, Err(LoadError::InvalidUrl(_))));
        assert!(transport.created.lock().is_empty());
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [SinkEvent::Finished(Err(LoadError::InvalidUrl(_)))]
        ));
    }

    #[test]
    fn test_duplicate_request_id_is_refused() {
        let (manager, transport) = setup();
        let (sink, _rx) = ChannelSink::new();
        let request = ResourceRequest::new(
            manager.proxied_url("https://origin.test/a.mp3"),
            None,
            Arc::new(sink),
        );
        let id = request.id;
        assert!(manager.start(request.clone()).is_ok());
        assert_eq!(manager.start(request), Err(LoadError::DuplicateRequest(id)));
        assert_eq!(manager.pending_count(), 1);
        assert_eq!(transport.created.lock().len(), 1);
    }

    #[test]
    fn test_delegate_protocol() {
        let (manager, transport) = setup();
        let (sink, mut rx) = ChannelSink::new();
        let request = ResourceRequest::new(
            manager.proxied_url("https://origin.test/a.mp3"),
            Some(ByteWindow::bounded(0, 2)),
            Arc::new(sink),
        );
        let id = request.id;

        assert!(manager.should_wait_for_loading(request));
        assert_eq!(manager.pending_count(), 1);
        manager.did_cancel(id);
        manager.did_cancel(id);
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(transport.cancelled.lock().len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_invalidate_fails_in_flight_requests() {
        let (manager, transport) = setup();
        let (_, task, mut rx) = start(&manager, Some(ByteWindow::bounded(0, 10)));

        manager.invalidate();
        assert!(transport.invalidated.load(Ordering::SeqCst));
        transport
            .delegate()
            .on_complete(task, Some(TransportError::Cancelled));

        assert_eq!(
            drain(&mut rx),
            vec![SinkEvent::Finished(Err(LoadError::Transport(
                TransportError::Cancelled
            )))]
        );
    }
}
