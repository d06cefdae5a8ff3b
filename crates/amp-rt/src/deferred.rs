use std::rc::Rc;

use amp_types::AmpError;

use crate::promise::{Promise, PromiseLike};

/// The write-capability over a promise (component F). Created paired with
/// a fresh pending `Promise<T>`; `resolve`/`fail` settle it exactly once.
pub struct Deferred<T> {
    promise: Promise<T>,
}

impl<T: 'static> Deferred<T> {
    pub fn new() -> (Self, Promise<T>) {
        let promise = Promise::pending();
        (Self { promise: promise.clone() }, promise)
    }

    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    pub fn resolve(&self, value: T) -> Result<(), AmpError> {
        self.promise.settle(Ok(Rc::new(value)))
    }

    pub(crate) fn resolve_rc(&self, value: Rc<T>) -> Result<(), AmpError> {
        self.promise.settle(Ok(value))
    }

    pub fn fail(&self, error: AmpError) -> Result<(), AmpError> {
        self.promise.settle(Err(error))
    }

    /// Adopts settlement from another promise of the *same* abstraction:
    /// this deferred's promise settles with `source`'s state, at the time
    /// `source` settles — including the next-tick dispatch rule, since it
    /// is wired through `Promise::when`.
    pub fn adopt(&self, source: &Promise<T>) {
        let this = self.promise.clone();
        source.when(move |result| {
            // Adoption firing after this deferred was already settled some
            // other way is a legitimate race, not a programming error;
            // swallow rather than propagate `AlreadySettled`.
            let _ = this.settle(result);
            Ok(())
        });
    }

    /// Adopts settlement from a foreign promise-like value (see
    /// `PromiseLike`). The foreign value hands back an owned `T`, which is
    /// wrapped in `Rc` the same way a direct `resolve` would.
    pub fn adopt_foreign(&self, source: impl PromiseLike<T> + 'static) {
        let this = self.promise.clone();
        source.on_settle(Box::new(move |result: Result<T, AmpError>| {
            let _ = this.settle(result.map(Rc::new));
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc as StdRc;

    fn install_fresh_driver() {
        let driver = amp_loop::EventLoop::new().expect("multiplexer init");
        crate::accessor::set(Some(StdRc::new(RefCell::new(driver))));
    }

    #[test]
    fn second_resolve_after_fail_errors() {
        let (deferred, _promise) = Deferred::<u32>::new();
        deferred.fail(AmpError::Disposed).unwrap();
        assert!(matches!(deferred.resolve(1), Err(AmpError::AlreadySettled)));
    }

    #[test]
    fn adoption_propagates_the_source_promises_settlement() {
        install_fresh_driver();
        let (outer, outer_promise) = Deferred::<u32>::new();
        let (inner, inner_promise) = Deferred::<u32>::new();

        outer.adopt(&inner_promise);
        inner.resolve(99).unwrap();

        let seen = StdRc::new(RefCell::new(None));
        let sink = seen.clone();
        outer_promise.when(move |result| {
            *sink.borrow_mut() = Some(result);
            Ok(())
        });

        crate::accessor::run().expect("run drains all pending deferrals");
        assert_eq!(**seen.borrow().as_ref().unwrap().as_ref().unwrap(), 99);
    }
}
