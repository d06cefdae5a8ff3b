use amp_types::AmpError;

use crate::promise::Promise;

/// Autoref-specialization hook: `T::reject_if_promise` resolves to the
/// inherent impl below when `T` is itself some `Promise<U>`, and to this
/// blanket trait impl for every other `T` — inherent methods always win
/// method resolution over a trait method in scope, so this distinguishes
/// the two cases without needing real specialization.
trait RejectIfPromise {
    fn reject_if_promise(&self) -> Result<(), AmpError> {
        Ok(())
    }
}

impl<T> RejectIfPromise for T {}

impl<T> Promise<T> {
    fn reject_if_promise(&self) -> Result<(), AmpError> {
        Err(AmpError::InvalidArgument(
            "success() cannot be constructed from a Promise; use Deferred::adopt to adopt one instead".into(),
        ))
    }
}

/// Builds an immediately-fulfilled promise. Rejects being constructed
/// from another promise of the same abstraction — that would be adoption,
/// not a plain value, and must go through `Deferred::adopt` instead.
pub fn success<T: 'static>(value: T) -> Result<Promise<T>, AmpError> {
    value.reject_if_promise()?;
    Ok(Promise::fulfilled(value))
}

/// Builds an immediately-failed promise.
pub fn failure<T: 'static>(error: AmpError) -> Promise<T> {
    Promise::failed(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn install_fresh_driver() {
        let driver = amp_loop::EventLoop::new().expect("multiplexer init");
        crate::accessor::set(Some(Rc::new(RefCell::new(driver))));
    }

    #[test]
    fn success_handler_still_runs_on_the_next_tick_not_synchronously() {
        install_fresh_driver();
        let p = success(7u32).expect("plain value is not a promise");
        let ran = Rc::new(RefCell::new(false));
        let sink = ran.clone();
        p.when(move |_result| {
            *sink.borrow_mut() = true;
            Ok(())
        });
        // Not yet invoked: `when` on an already-settled promise must be
        // deferred, never synchronous.
        assert!(!*ran.borrow());
        crate::accessor::run().unwrap();
        assert!(*ran.borrow());
    }
}
