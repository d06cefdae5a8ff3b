mod consumer;
mod producer;
mod state;

pub use consumer::Consumer;
pub use producer::{stream, Emitter};
