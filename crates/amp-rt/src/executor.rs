use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use amp_types::AmpError;

use crate::accessor;

type BoxedFuture = Pin<Box<dyn Future<Output = Result<(), AmpError>>>>;

/// A single task driven by the local executor — the concrete stand-in for
/// the coroutine trampoline a producer's body runs on (component G's
/// engine). Not `Send`: everything here lives on the one loop thread.
struct Task {
    future: RefCell<Option<BoxedFuture>>,
    on_complete: RefCell<Option<Box<dyn FnOnce(Result<(), AmpError>)>>>,
}

impl Task {
    fn poll_once(self: Rc<Self>) {
        let mut slot = self.future.borrow_mut();
        let Some(future) = slot.as_mut() else {
            return; // already completed; a stray wake arrived late
        };
        let waker = waker_for(self.clone());
        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Pending => {}
            Poll::Ready(result) => {
                *slot = None;
                drop(slot);
                if let Some(cb) = self.on_complete.borrow_mut().take() {
                    cb(result);
                }
            }
        }
    }

    fn schedule_poll(self: Rc<Self>) {
        let _ = accessor::defer(Box::new(move |_id| {
            self.clone().poll_once();
            Ok(())
        }));
    }
}

/// Spawns `future` onto the current driver, calling `on_complete` exactly
/// once with its final result. The first poll, like every subsequent one,
/// happens from inside a `defer` watcher rather than synchronously, so
/// spawning never runs producer code before the loop is actually ticking.
pub fn spawn(
    future: impl Future<Output = Result<(), AmpError>> + 'static,
    on_complete: impl FnOnce(Result<(), AmpError>) + 'static,
) {
    let task = Rc::new(Task {
        future: RefCell::new(Some(Box::pin(future))),
        on_complete: RefCell::new(Some(Box::new(on_complete))),
    });
    task.schedule_poll();
}

fn waker_for(task: Rc<Task>) -> Waker {
    // `std::task::Wake` only bridges `Arc<W: Send + Sync>` into a `Waker`;
    // a single-threaded executor driving `Rc`-based tasks has to build the
    // `RawWaker` itself. The four functions below just turn `wake`/`clone`/
    // `drop` into reference-count manipulation on the same `Rc`.
    unsafe fn clone_fn(ptr: *const ()) -> RawWaker {
        let rc = unsafe { Rc::from_raw(ptr as *const Task) };
        let cloned = rc.clone();
        std::mem::forget(rc);
        RawWaker::new(Rc::into_raw(cloned) as *const (), &VTABLE)
    }

    unsafe fn wake_fn(ptr: *const ()) {
        let rc = unsafe { Rc::from_raw(ptr as *const Task) };
        rc.schedule_poll();
    }

    unsafe fn wake_by_ref_fn(ptr: *const ()) {
        let rc = unsafe { Rc::from_raw(ptr as *const Task) };
        rc.clone().schedule_poll();
        std::mem::forget(rc);
    }

    unsafe fn drop_fn(ptr: *const ()) {
        drop(unsafe { Rc::from_raw(ptr as *const Task) });
    }

    static VTABLE: RawWakerVTable = RawWakerVTable::new(clone_fn, wake_fn, wake_by_ref_fn, drop_fn);

    let raw = RawWaker::new(Rc::into_raw(task) as *const (), &VTABLE);
    unsafe { Waker::from_raw(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    fn install_fresh_driver() {
        let driver = amp_loop::EventLoop::new().expect("multiplexer init");
        accessor::set(Some(StdRc::new(StdRefCell::new(driver))));
    }

    #[test]
    fn spawned_future_runs_to_completion_across_ticks() {
        install_fresh_driver();
        let result = StdRc::new(StdRefCell::new(None));
        let sink = result.clone();

        spawn(
            async { Ok(()) },
            move |r| {
                *sink.borrow_mut() = Some(r);
            },
        );

        accessor::run().expect("run drains the spawned task");
        assert!(matches!(*result.borrow(), Some(Ok(()))));
    }
}
