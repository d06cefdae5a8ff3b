use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use amp_types::AmpError;

use crate::accessor;

type Continuation<T> = Box<dyn FnOnce(Result<Rc<T>, AmpError>) -> Result<(), AmpError>>;

enum Settlement<T> {
    Pending,
    Fulfilled(Rc<T>),
    Failed(AmpError),
}

impl<T> Settlement<T> {
    fn is_pending(&self) -> bool {
        matches!(self, Settlement::Pending)
    }

    fn to_result(&self) -> Option<Result<Rc<T>, AmpError>> {
        match self {
            Settlement::Pending => None,
            Settlement::Fulfilled(v) => Some(Ok(v.clone())),
            Settlement::Failed(e) => Some(Err(e.clone())),
        }
    }
}

struct Inner<T> {
    settlement: Settlement<T>,
    continuations: VecDeque<Continuation<T>>,
}

/// A single-assignment value whose continuations are always dispatched on
/// the next tick, even if the promise was already settled at registration
/// time (component D). Also implements `Future`, so it composes directly
/// with `async`/`.await` — that composition is this system's stand-in for
/// a hand-rolled coroutine trampoline.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T: 'static> Promise<T> {
    pub fn pending() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                settlement: Settlement::Pending,
                continuations: VecDeque::new(),
            })),
        }
    }

    /// Already-fulfilled promise (backs the `Success` constant).
    pub fn fulfilled(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                settlement: Settlement::Fulfilled(Rc::new(value)),
                continuations: VecDeque::new(),
            })),
        }
    }

    /// Already-failed promise (backs the `Failure` constant).
    pub fn failed(error: AmpError) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                settlement: Settlement::Failed(error),
                continuations: VecDeque::new(),
            })),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().settlement.is_pending()
    }

    /// Settle this promise exactly once. A second call fails with
    /// `AlreadySettled` — this is a programming error, returned
    /// synchronously rather than funnelled through the loop.
    pub fn settle(&self, result: Result<Rc<T>, AmpError>) -> Result<(), AmpError> {
        let mut inner = self.inner.borrow_mut();
        if !inner.settlement.is_pending() {
            return Err(AmpError::AlreadySettled);
        }
        inner.settlement = match &result {
            Ok(v) => Settlement::Fulfilled(v.clone()),
            Err(e) => Settlement::Failed(e.clone()),
        };
        let pending: Vec<Continuation<T>> = inner.continuations.drain(..).collect();
        drop(inner);
        for cont in pending {
            let result = result.clone();
            schedule_continuation(move || cont(result));
        }
        Ok(())
    }

    /// Register a continuation. Fires no earlier than the tick after the
    /// one in which the promise settles (or, if already settled, the tick
    /// after registration) — never synchronously, and always in
    /// registration order relative to sibling continuations.
    pub fn when(
        &self,
        handler: impl FnOnce(Result<Rc<T>, AmpError>) -> Result<(), AmpError> + 'static,
    ) {
        let mut inner = self.inner.borrow_mut();
        if let Some(result) = inner.settlement.to_result() {
            drop(inner);
            schedule_continuation(move || handler(result));
        } else {
            inner.continuations.push_back(Box::new(handler));
        }
    }
}

/// Schedules `f` to run via a one-shot `defer` watcher on the current
/// driver. `f`'s `Err` reaches the error funnel the same way any other
/// callback's does, which is how continuation errors get routed to the
/// loop instead of the registering call site.
fn schedule_continuation(f: impl FnOnce() -> Result<(), AmpError> + 'static) {
    let mut slot = Some(f);
    // accessor::defer lazily installs a default driver if none exists yet;
    // a missing driver here would mean nothing could ever have settled
    // this promise in the first place, so the error is swallowed into the
    // watcher registration itself rather than surfaced to `settle`/`when`.
    let _ = accessor::defer(Box::new(move |_id| {
        let f = slot.take().expect("one-shot defer fires exactly once");
        f()
    }));
}

/// Adapter boundary for foreign promise-like values: anything exposing an
/// equivalent of a two-argument `then(onFulfilled, onRejected)` can be
/// adopted by a `Deferred<T>` without depending on this crate's own
/// `Promise<T>` type.
pub trait PromiseLike<T> {
    fn on_settle(&self, cb: Box<dyn FnOnce(Result<T, AmpError>)>);
}

impl<T: 'static> Future for Promise<T> {
    type Output = Result<Rc<T>, AmpError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if let Some(result) = inner.settlement.to_result() {
            return Poll::Ready(result);
        }
        let waker = cx.waker().clone();
        inner.continuations.push_back(Box::new(move |_result| {
            waker.wake();
            Ok(())
        }));
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    fn install_fresh_driver() {
        let driver = amp_loop::EventLoop::new().expect("multiplexer init");
        accessor::set(Some(Rc::new(RefCell::new(driver))));
    }

    #[test]
    fn when_on_pending_promise_fires_after_settle_via_run() {
        install_fresh_driver();
        let promise: Promise<u32> = Promise::pending();
        let seen = Rc::new(StdRefCell::new(None));
        let sink = seen.clone();
        promise.when(move |result| {
            *sink.borrow_mut() = Some(result);
            Ok(())
        });

        promise.settle(Ok(Rc::new(42))).expect("first settle succeeds");
        accessor::run().expect("run drains the deferred continuation");

        assert_eq!(*seen.borrow().as_ref().unwrap().as_ref().unwrap().as_ref(), 42);
    }

    #[test]
    fn second_settle_fails_synchronously() {
        let promise: Promise<u32> = Promise::pending();
        promise.settle(Ok(Rc::new(1))).unwrap();
        assert!(matches!(promise.settle(Ok(Rc::new(2))), Err(AmpError::AlreadySettled)));
    }
}
