pub mod base;
pub mod loader;
pub mod logging;
pub mod transport;

pub use base::*;
pub use loader::*;
pub use logging::*;
pub use transport::*;
