use bytes::Bytes;
use tokio::sync::mpsc;

use crate::common::errors::LoadError;
use crate::common::types::RequestId;

use super::inspect::ContentInfo;
use super::request::ResourceRequest;

/// Consumer side of one loading request.
///
/// For a given request the loader calls `set_content_info` at most once and
/// before any data, `respond` with contiguous chunks in offset order, and
/// `finish_loading` exactly once unless the consumer itself cancelled.
pub trait DataSink: Send + Sync {
    fn set_content_info(&self, info: &ContentInfo);

    fn respond(&self, data: Bytes);

    fn finish_loading(&self, result: Result<(), LoadError>);
}

/// Resource-loading protocol the playback engine drives.
pub trait ResourceLoaderDelegate: Send + Sync {
    /// Accepts the request and starts loading it asynchronously. Always
    /// returns `true`; outcomes arrive on the request's sink.
    fn should_wait_for_loading(&self, request: ResourceRequest) -> bool;

    fn did_cancel(&self, id: RequestId);
}

/// Everything a sink can observe, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    ContentInfo(ContentInfo),
    Data(Bytes),
    Finished(Result<(), LoadError>),
}

/// Sink that forwards every call into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DataSink for ChannelSink {
    fn set_content_info(&self, info: &ContentInfo) {
        let _ = self.tx.send(SinkEvent::ContentInfo(info.clone()));
    }

    fn respond(&self, data: Bytes) {
        let _ = self.tx.send(SinkEvent::Data(data));
    }

    fn finish_loading(&self, result: Result<(), LoadError>) {
        let _ = self.tx.send(SinkEvent::Finished(result));
    }
}
