use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use amp_loop::EventLoop;

fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, Rc<RefCell<Vec<&'static str>>>) {
    let log = Rc::new(RefCell::new(Vec::new()));
    (log.clone(), log)
}

fn fresh_driver() -> Rc<RefCell<EventLoop>> {
    Rc::new(RefCell::new(EventLoop::new().expect("multiplexer init")))
}

#[test_log::test]
fn defer_fires_before_a_same_tick_timer() {
    let (log, shared) = recorder();
    let driver = fresh_driver();

    let log_timer = shared.clone();
    driver.borrow_mut().delay(0, Box::new(move |_id| {
        log_timer.borrow_mut().push("timer");
        Ok(())
    }));

    let log_defer = shared.clone();
    driver.borrow_mut().defer(Box::new(move |_id| {
        log_defer.borrow_mut().push("defer");
        Ok(())
    }));

    EventLoop::tick(&driver).expect("tick");

    assert_eq!(*log.borrow(), vec!["defer", "timer"]);
}

#[test_log::test]
fn defer_registered_inside_a_defer_waits_a_full_tick() {
    let (log, shared) = recorder();
    let driver = fresh_driver();

    let inner_log = shared.clone();
    driver.borrow_mut().defer(Box::new(move |_id| {
        inner_log.borrow_mut().push("first");
        Ok(())
    }));

    // The outer defer enables a second defer from inside its callback.
    // We can't capture `driver` inside the closure (it's already borrowed
    // mutably by the call), so this is modelled across two ticks instead:
    // tick 1 fires "first", then we register the nested defer "from
    // outside" to stand in for what "first" would have scheduled, and
    // assert it is inert until tick 2.
    EventLoop::tick(&driver).expect("tick 1");
    assert_eq!(*log.borrow(), vec!["first"]);

    let nested_log = shared.clone();
    driver.borrow_mut().defer(Box::new(move |_id| {
        nested_log.borrow_mut().push("nested");
        Ok(())
    }));

    // Not yet active: a defer enabled during/after tick 1 must not fire
    // until tick 2.
    driver.borrow().get_info();
    assert_eq!(*log.borrow(), vec!["first"]);

    EventLoop::tick(&driver).expect("tick 2");
    assert_eq!(*log.borrow(), vec!["first", "nested"]);
}

#[test_log::test]
fn repeat_coalesces_missed_ticks_into_one_firing() {
    let fire_count = Rc::new(RefCell::new(0u32));
    let driver = fresh_driver();

    let counter = fire_count.clone();
    driver.borrow_mut().repeat(10, Box::new(move |_id| {
        *counter.borrow_mut() += 1;
        // Simulate the loop having been blocked well past several
        // would-be firings.
        std::thread::sleep(Duration::from_millis(55));
        Ok(())
    }));

    EventLoop::tick(&driver).expect("tick 1");
    assert_eq!(*fire_count.borrow(), 1);

    // Even though 55ms (>5 intervals) elapsed inside the callback, the
    // repeat fires once per tick, not once per missed interval.
    EventLoop::tick(&driver).expect("tick 2");
    assert_eq!(*fire_count.borrow(), 2);
}

#[test_log::test]
fn timers_with_later_deadlines_fire_after_earlier_ones() {
    let (log, shared) = recorder();
    let driver = fresh_driver();

    let late_log = shared.clone();
    driver.borrow_mut().delay(20, Box::new(move |_id| {
        late_log.borrow_mut().push("late");
        Ok(())
    }));
    let early_log = shared.clone();
    driver.borrow_mut().delay(0, Box::new(move |_id| {
        early_log.borrow_mut().push("early");
        Ok(())
    }));

    std::thread::sleep(Duration::from_millis(25));
    EventLoop::tick(&driver).expect("tick");

    assert_eq!(*log.borrow(), vec!["early", "late"]);
}
