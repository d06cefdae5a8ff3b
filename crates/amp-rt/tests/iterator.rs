use std::cell::RefCell;
use std::rc::Rc;

use amp_rt::{set_driver, stream, AmpError};

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
fn backpressure_blocks_the_second_emit_until_the_consumer_advances() {
    let driver = install_fresh_driver();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let producer_log = log.clone();
    let mut consumer = stream(move |emitter| {
        let producer_log = producer_log.clone();
        async move {
            emitter.emit(1u32).await?;
            producer_log.borrow_mut().push("after-emit-1");
            emitter.emit(2u32).await?;
            producer_log.borrow_mut().push("after-emit-2");
            Ok(())
        }
    });

    // Let the coroutine run far enough to emit the first value and then
    // block on its backpressure promise.
    drive_ticks(&driver, 3);
    assert!(log.borrow().is_empty(), "must not reach past emit(1) yet");

    let first = consumer.advance().expect("advance 1");
    assert!(!first.is_pending(), "value 1 was already buffered");
    assert_eq!(*consumer.current().expect("current after advance 1"), 1);

    // Advancing past value 1 releases its backpressure deferred, which
    // must unblock the producer's awaited emit(1) — but not before this
    // point.
    let second = consumer.advance().expect("advance 2");
    drive_ticks(&driver, 10);

    assert_eq!(*log.borrow(), vec!["after-emit-1"]);
    assert!(!second.is_pending(), "advance 2 settles once value 2 arrives");
    assert_eq!(*consumer.current().expect("current after advance 2"), 2);
}

#[test_log::test]
fn overlapped_advance_is_rejected() {
    let driver = install_fresh_driver();

    let mut consumer = stream(|emitter| async move {
        emitter.emit(1u32).await?;
        Ok(())
    });

    drive_ticks(&driver, 3);
    let _first = consumer.advance().expect("advance 1");
    let _second = consumer.advance().expect("advance 2, now waiting on value 2 / completion");

    assert!(matches!(consumer.advance(), Err(AmpError::OverlappedAdvance)));
}

#[test_log::test]
fn current_before_any_advance_is_not_ready() {
    install_fresh_driver();
    let consumer = stream(|_emitter| async move { Ok(()) });
    assert!(matches!(consumer.current(), Err(AmpError::NotReady)));
}

#[test_log::test]
fn dropping_the_consumer_fails_the_next_emit_with_disposed() {
    let driver = install_fresh_driver();
    let observed = Rc::new(RefCell::new(None));

    let sink = observed.clone();
    let consumer = stream(move |emitter| {
        let sink = sink.clone();
        async move {
            emitter.emit(1u32).await?;
            emitter.emit(2u32).await?;
            let result = emitter.emit(3u32).await;
            *sink.borrow_mut() = Some(result.clone());
            result
        }
    });

    drive_ticks(&driver, 3);
    drop(consumer);
    drive_ticks(&driver, 10);

    assert!(matches!(*observed.borrow(), Some(Err(AmpError::Disposed))));
}

#[test_log::test]
fn values_arrive_in_order_with_no_duplicates_and_terminate_on_complete() {
    let driver = install_fresh_driver();

    let mut consumer = stream(|emitter| async move {
        emitter.emit(1u32).await?;
        emitter.emit(2u32).await?;
        emitter.emit(3u32).await?;
        Ok(())
    });

    let mut seen = Vec::new();
    loop {
        drive_ticks(&driver, 5);
        let advanced = consumer.advance().expect("advance");
        drive_ticks(&driver, 5);
        if advanced.is_pending() {
            continue;
        }
        match consumer.current() {
            Ok(v) => seen.push(*v),
            Err(AmpError::Completed) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
        if seen.len() > 10 {
            panic!("stream did not terminate");
        }
    }

    assert_eq!(seen, vec![1, 2, 3]);
}
