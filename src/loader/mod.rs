//! Loading-request proxy: the core that maps playback-engine byte-window
//! requests onto HTTP range tasks.
//!
//! # Module layout
//!
//! ```text
//! src/loader/
//! ├── range.rs      ← byte window → `Range` header value
//! ├── inspect.rs    ← response head → content type / length / range support
//! ├── request.rs    ← LoadingRequest state and the incoming ResourceRequest
//! ├── registry.rs   ← task id → in-flight LoadingRequest
//! ├── rewrite.rs    ← proxy URL prefix handling
//! ├── sink.rs       ← consumer-facing traits
//! └── manager.rs    ← ProxyManager, the transport's session delegate
//! ```

pub mod inspect;
pub mod manager;
pub mod range;
pub mod registry;
pub mod request;
pub mod rewrite;
pub mod sink;

pub use inspect::{ContentInfo, ContentRange, ContentType, inspect};
pub use manager::ProxyManager;
pub use range::resolve_range;
pub use registry::{RequestRegistry, Retention};
pub use request::{ByteWindow, LoadState, LoadingRequest, ResourceRequest};
pub use rewrite::UrlRewriter;
pub use sink::{ChannelSink, DataSink, ResourceLoaderDelegate, SinkEvent};
