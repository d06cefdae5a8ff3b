use std::cell::RefCell;
use std::rc::Rc;

use amp_rt::{set_driver, success, AmpError, Promise};

fn install_fresh_driver() -> Rc<RefCell<amp_loop::EventLoop>> {
    let driver = Rc::new(RefCell::new(amp_loop::EventLoop::new().expect("multiplexer init")));
    set_driver(Some(driver.clone()));
    driver
}

fn drive_ticks(driver: &Rc<RefCell<amp_loop::EventLoop>>, max_ticks: u32) {
    for _ in 0..max_ticks {
        amp_loop::EventLoop::tick(driver).expect("tick");
    }
}

#[test_log::test]
fn continuations_fire_in_registration_order() {
    let driver = install_fresh_driver();
    let order = Rc::new(RefCell::new(Vec::new()));
    let promise: Promise<u32> = Promise::pending();

    for label in ["first", "second", "third"] {
        let log = order.clone();
        promise.when(move |_result| {
            log.borrow_mut().push(label);
            Ok(())
        });
    }

    promise.settle(Ok(Rc::new(1))).expect("settle");
    drive_ticks(&driver, 3);

    assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
}

#[test_log::test]
fn already_settled_promise_still_defers_its_handler() {
    let driver = install_fresh_driver();
    let fired = Rc::new(RefCell::new(false));
    let promise = success(5u32).expect("plain value is not a promise");

    let sink = fired.clone();
    promise.when(move |_result| {
        *sink.borrow_mut() = true;
        Ok(())
    });

    assert!(!*fired.borrow(), "when() must never invoke synchronously");
    drive_ticks(&driver, 2);
    assert!(*fired.borrow());
}

#[test_log::test]
fn a_handler_error_reaches_the_loops_error_handler() {
    let driver = install_fresh_driver();
    let handled = Rc::new(RefCell::new(Vec::new()));

    let sink = handled.clone();
    driver.borrow_mut().set_error_handler(Box::new(move |err| {
        sink.borrow_mut().push(err);
        Ok(())
    }));

    let promise: Promise<u32> = Promise::pending();
    promise.when(|_result| Err(AmpError::InvalidArgument("handler blew up".into())));
    promise.settle(Ok(Rc::new(0))).expect("settle");

    drive_ticks(&driver, 3);
    assert_eq!(handled.borrow().len(), 1);
}

#[test_log::test]
fn a_promise_can_be_awaited_with_native_async_await() {
    let driver = install_fresh_driver();
    let result = Rc::new(RefCell::new(None));

    let promise: Promise<u32> = Promise::pending();
    let awaited = promise.clone();
    let sink = result.clone();
    amp_rt::executor::spawn(
        async move {
            let value = awaited.await?;
            *sink.borrow_mut() = Some(*value);
            Ok(())
        },
        |_| {},
    );

    drive_ticks(&driver, 2);
    assert!(result.borrow().is_none(), "still pending: the promise has not settled yet");

    promise.settle(Ok(Rc::new(11))).expect("settle");
    drive_ticks(&driver, 5);

    assert_eq!(*result.borrow(), Some(11));
}
