pub mod error;
pub mod id;
pub mod info;
pub mod watcher;

pub use error::AmpError;
pub use id::{fresh_loop_nonce, WatcherId};
pub use info::{GetInfo, KindCounts, ReferenceCounts};
pub use watcher::{WatcherKind, WatcherState};
