use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use amp_types::AmpError;

use crate::deferred::Deferred;
use crate::executor;
use crate::promise::{Promise, PromiseLike};

use super::consumer::Consumer;
use super::state::{already_complete_error, ProducerState};

/// The `emit`/`emit_promise` capability handed to a producer's coroutine
/// body (component G). Cloning an `Emitter` shares the same underlying
/// stream — there is exactly one logical producer per stream regardless
/// of how many `Emitter` handles exist.
pub struct Emitter<T> {
    state: Rc<RefCell<ProducerState<T>>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T: 'static> Emitter<T> {
    /// Appends `value`, waking a blocked consumer if one is waiting, and
    /// returns a future that resolves once the consumer has advanced past
    /// this specific value — enforcing one-by-one backpressure.
    pub async fn emit(&self, value: T) -> Result<(), AmpError> {
        let backpressure = self.emit_rc(Rc::new(value))?;
        backpressure.await.map(|_| ())
    }

    /// Adopts a foreign promise-like value: awaits it, then re-emits the
    /// resolved value transparently. If the iterator is independently
    /// completed/failed while this wait is in flight, fails with
    /// `InterruptedByCompletion` rather than hanging forever.
    pub async fn emit_promise(&self, value: impl PromiseLike<T> + 'static) -> Result<(), AmpError> {
        let (deferred, joined) = Deferred::<T>::new();
        deferred.adopt_foreign(value);
        let resolved = AdoptionRace { joined, state: self.state.clone() }.await?;
        let backpressure = self.emit_rc(resolved)?;
        backpressure.await.map(|_| ())
    }

    fn emit_rc(&self, value: Rc<T>) -> Result<Promise<()>, AmpError> {
        let mut state = self.state.borrow_mut();
        if state.disposed {
            return Err(AmpError::Disposed);
        }
        if state.complete.is_some() {
            return Err(already_complete_error(&state));
        }
        let index = state.next_index;
        state.next_index += 1;
        let (deferred, promise) = Deferred::<()>::new();
        state.values.push_back((index, value));
        state.backpressure.push_back((index, deferred));
        if let Some(waiting) = state.waiting.take() {
            let _ = waiting.resolve(true);
        }
        Ok(promise)
    }

    /// Ends the stream normally. A second call (from `complete` or
    /// `fail`) errors with `AlreadyComplete`.
    pub fn complete(&self) -> Result<(), AmpError> {
        let mut state = self.state.borrow_mut();
        if state.complete.is_some() {
            return Err(already_complete_error(&state));
        }
        state.capture_debug_detail_if_first();
        let promise = Promise::fulfilled(false);
        state.complete = Some(promise.clone());
        if let Some(waiting) = state.waiting.take() {
            let _ = waiting.resolve(false);
        }
        state.notify_interrupt_wakers();
        Ok(())
    }

    /// Ends the stream with a terminal error.
    pub fn fail(&self, error: AmpError) -> Result<(), AmpError> {
        let mut state = self.state.borrow_mut();
        if state.complete.is_some() {
            return Err(already_complete_error(&state));
        }
        state.capture_debug_detail_if_first();
        state.complete = Some(Promise::failed(error.clone()));
        if let Some(waiting) = state.waiting.take() {
            let _ = waiting.fail(error);
        }
        state.notify_interrupt_wakers();
        Ok(())
    }
}

/// Races an adoption wait against the iterator being independently
/// completed or failed out from under it.
struct AdoptionRace<T> {
    joined: Promise<T>,
    state: Rc<RefCell<ProducerState<T>>>,
}

impl<T: 'static> Future for AdoptionRace<T> {
    type Output = Result<Rc<T>, AmpError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.state.borrow().complete.is_some() {
            return Poll::Ready(Err(AmpError::InterruptedByCompletion));
        }
        this.state.borrow_mut().interrupt_wakers.push(cx.waker().clone());
        Pin::new(&mut this.joined).poll(cx)
    }
}

/// Builds a backpressured stream from a coroutine factory and returns the
/// single `Consumer` handle over it. `factory` is called once, eagerly,
/// to build the driving future; the future itself is only ever polled
/// from inside a `defer` watcher (see `executor::spawn`).
pub fn stream<T, F>(factory: impl FnOnce(Emitter<T>) -> F) -> Consumer<T>
where
    T: 'static,
    F: Future<Output = Result<(), AmpError>> + 'static,
{
    let state = Rc::new(RefCell::new(ProducerState::new()));
    let emitter = Emitter { state: state.clone() };
    let future = factory(emitter.clone());

    let completion_state = state.clone();
    executor::spawn(future, move |result| {
        // The coroutine returned; if it hadn't already completed or
        // failed the stream itself (e.g. via `emitter.fail` on an
        // upstream error), do so now with its result.
        let already_finished = completion_state.borrow().complete.is_some();
        if already_finished {
            return;
        }
        match result {
            Ok(()) => {
                let _ = emitter.complete();
            }
            Err(e) => {
                let _ = emitter.fail(e);
            }
        }
    });

    Consumer::new(state)
}
