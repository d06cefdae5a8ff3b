use std::collections::VecDeque;
use std::rc::Rc;
use std::task::Waker;

use amp_types::AmpError;

use crate::deferred::Deferred;
use crate::promise::Promise;

/// Shared state jointly held by a producer's `Emitter` and its single
/// `Consumer` (see the data-model notes on cyclic producer/consumer
/// structures). The consumer's position cursor deliberately lives outside
/// this struct, on the `Consumer` itself, since it has exactly one owner.
pub(crate) struct ProducerState<T> {
    pub(crate) values: VecDeque<(u64, Rc<T>)>,
    pub(crate) backpressure: VecDeque<(u64, Deferred<()>)>,
    pub(crate) complete: Option<Promise<bool>>,
    pub(crate) waiting: Option<Deferred<bool>>,
    pub(crate) disposed: bool,
    pub(crate) next_index: u64,
    /// Wakers of in-flight `emit_promise` adoptions racing an independent
    /// completion; woken whenever `complete` transitions from `None`.
    pub(crate) interrupt_wakers: Vec<Waker>,
    /// Rendered backtrace captured at the first `complete()`/`fail()`
    /// call, surfaced in the message if a second one is attempted.
    pub(crate) debug_detail: Option<String>,
}

impl<T> ProducerState<T> {
    pub(crate) fn new() -> Self {
        Self {
            values: VecDeque::new(),
            backpressure: VecDeque::new(),
            complete: None,
            waiting: None,
            disposed: false,
            next_index: 0,
            interrupt_wakers: Vec::new(),
            debug_detail: None,
        }
    }

    /// Wakes and drains every interrupt waker — called whenever
    /// `complete` transitions from `None` to `Some`.
    pub(crate) fn notify_interrupt_wakers(&mut self) {
        for waker in self.interrupt_wakers.drain(..) {
            waker.wake();
        }
    }

    /// Captures a debug detail string once, the first time `complete`
    /// or `fail` is called, if `AMP_DEBUG` is enabled.
    pub(crate) fn capture_debug_detail_if_first(&mut self) {
        if self.debug_detail.is_some() {
            return;
        }
        if debug_enabled() {
            self.debug_detail = Some(format!("{}", std::backtrace::Backtrace::capture()));
        }
    }
}

/// `AMP_DEBUG` is read once per call site; unset or falsy (`0`/`false`)
/// disables backtrace capture entirely, so the common case pays nothing.
pub(crate) fn debug_enabled() -> bool {
    match std::env::var("AMP_DEBUG") {
        Ok(value) => !(value == "0" || value.eq_ignore_ascii_case("false") || value.is_empty()),
        Err(_) => false,
    }
}

pub(crate) fn already_complete_error<T>(state: &ProducerState<T>) -> AmpError {
    AmpError::already_complete(state.debug_detail.clone())
}
