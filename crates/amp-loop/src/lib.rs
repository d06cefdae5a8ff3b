pub mod driver;
pub mod multiplexer;
pub mod registry;
pub mod state;

pub use driver::EventLoop;
pub use multiplexer::Interest;
pub use registry::Callback;

pub use amp_types::{AmpError, GetInfo, WatcherId, WatcherKind, WatcherState};
