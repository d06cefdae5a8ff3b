use std::cell::RefCell;
use std::rc::Rc;

use amp_types::AmpError;

use crate::deferred::Deferred;
use crate::promise::Promise;

use super::state::ProducerState;

/// The single consumer handle over a stream (component G). Obtained once
/// from `producer::stream`; a second acquisition is not offered by this
/// API at all (there is no way to clone or re-derive a `Consumer`), which
/// is how the single-consumer invariant is enforced at the type level.
pub struct Consumer<T> {
    state: Rc<RefCell<ProducerState<T>>>,
    /// `-1` before the first successful `advance()`, then the index of
    /// the value currently visible to `current()`.
    position: i64,
    pending_advance: Option<Promise<bool>>,
}

impl<T: 'static> Consumer<T> {
    pub(crate) fn new(state: Rc<RefCell<ProducerState<T>>>) -> Self {
        Self { state, position: -1, pending_advance: None }
    }

    /// Advances to the next value, releasing backpressure on the value
    /// the cursor is leaving. Errors with `OverlappedAdvance` if a
    /// previous `advance()` call's promise has not yet settled.
    pub fn advance(&mut self) -> Result<Promise<bool>, AmpError> {
        if let Some(promise) = &self.pending_advance {
            if promise.is_pending() {
                return Err(AmpError::OverlappedAdvance);
            }
        }

        let mut state = self.state.borrow_mut();

        if self.position >= 0 {
            let idx = self.position as u64;
            if matches!(state.backpressure.front(), Some((i, _)) if *i == idx) {
                if let Some((_, deferred)) = state.backpressure.pop_front() {
                    let _ = deferred.resolve(());
                }
            }
            if matches!(state.values.front(), Some((i, _)) if *i == idx) {
                state.values.pop_front();
            }
        }

        self.position += 1;
        let next_idx = self.position as u64;

        if matches!(state.values.front(), Some((i, _)) if *i == next_idx) {
            drop(state);
            let promise = Promise::fulfilled(true);
            self.pending_advance = Some(promise.clone());
            return Ok(promise);
        }

        if let Some(complete) = state.complete.clone() {
            drop(state);
            self.pending_advance = Some(complete.clone());
            return Ok(complete);
        }

        let (deferred, promise) = Deferred::<bool>::new();
        state.waiting = Some(deferred);
        drop(state);
        self.pending_advance = Some(promise.clone());
        Ok(promise)
    }

    /// The value at the current position. `NotReady` before any
    /// `advance()` has settled onto a value; `Completed` once the buffer
    /// is drained and the stream has ended.
    pub fn current(&self) -> Result<Rc<T>, AmpError> {
        if self.position < 0 {
            return Err(AmpError::NotReady);
        }
        let idx = self.position as u64;
        let state = self.state.borrow();
        match state.values.front() {
            Some((i, v)) if *i == idx => Ok(v.clone()),
            _ if state.complete.is_some() => Err(AmpError::Completed),
            _ => Err(AmpError::NotReady),
        }
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return;
        }
        state.disposed = true;
        // Wake every outstanding backpressure deferred so the producing
        // coroutine's in-flight `emit` returns; its *next* `emit` call
        // will observe `disposed` and fail, ending the coroutine.
        for (_, deferred) in state.backpressure.drain(..) {
            let _ = deferred.resolve(());
        }
        state.values.clear();
    }
}
