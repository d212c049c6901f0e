pub mod common;
pub mod configs;
pub mod loader;
pub mod transport;

pub use common::errors::{LoadError, TransportError};
pub use common::types::{RequestId, TaskId};
pub use loader::{ByteWindow, ProxyManager, ResourceLoaderDelegate, ResourceRequest};
