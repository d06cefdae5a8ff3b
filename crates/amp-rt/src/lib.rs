pub mod accessor;
pub mod constants;
pub mod deferred;
pub mod executor;
pub mod iter;
pub mod promise;

pub use accessor::{get as current_driver, set as set_driver};
pub use constants::{failure, success};
pub use deferred::Deferred;
pub use iter::{stream, Consumer, Emitter};
pub use promise::{Promise, PromiseLike};

pub use amp_types::{AmpError, GetInfo, WatcherId, WatcherKind};
