use std::any::Any;
use std::cell::{Cell, RefCell};
use std::os::unix::io::RawFd;
use std::rc::Rc;

use amp_loop::registry::Callback;
use amp_loop::{EventLoop, GetInfo};
use amp_types::{AmpError, WatcherId};

thread_local! {
    static CURRENT: RefCell<Option<Rc<RefCell<EventLoop>>>> = RefCell::new(None);
    static EVER_INSTALLED: Cell<bool> = Cell::new(false);
}

/// Install `driver` as this thread's current driver. `None` clears it —
/// subsequent passthroughs fail with `NoDriver` instead of lazily
/// reinstalling a default.
pub fn set(driver: Option<Rc<RefCell<EventLoop>>>) {
    EVER_INSTALLED.with(|flag| flag.set(true));
    CURRENT.with(|cell| *cell.borrow_mut() = driver);
}

/// Fetch the current driver, lazily constructing and installing a default
/// one the first time any thread touches the accessor.
pub fn get() -> Result<Rc<RefCell<EventLoop>>, AmpError> {
    if let Some(driver) = CURRENT.with(|cell| cell.borrow().clone()) {
        return Ok(driver);
    }
    if EVER_INSTALLED.with(|flag| flag.get()) {
        return Err(AmpError::NoDriver);
    }
    let driver = Rc::new(RefCell::new(
        EventLoop::new().map_err(|e| AmpError::UnsupportedFeature(format!("default driver init failed: {e}")))?,
    ));
    EVER_INSTALLED.with(|flag| flag.set(true));
    CURRENT.with(|cell| *cell.borrow_mut() = Some(driver.clone()));
    Ok(driver)
}

/// Run `f` against the current driver, installing the default one first
/// if none has been installed yet.
pub fn with_current<R>(f: impl FnOnce(&mut EventLoop) -> R) -> Result<R, AmpError> {
    let driver = get()?;
    let mut guard = driver.borrow_mut();
    Ok(f(&mut guard))
}

/// Drives the current driver's tick loop. Deliberately bypasses
/// `with_current`: `EventLoop::run` takes the `Rc<RefCell<EventLoop>>`
/// handle itself and borrows it only around each individual registry read
/// or callback dispatch, so a callback that reenters the accessor (another
/// `defer`, a woken `Future`, `Consumer::advance`) sees a free `RefCell`
/// instead of panicking on a `BorrowMutError`.
pub fn run() -> Result<(), AmpError> {
    let driver = get()?;
    EventLoop::run(&driver)
}

pub fn stop() -> Result<(), AmpError> {
    with_current(|driver| driver.stop())
}

pub fn defer(callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.defer(callback))
}

pub fn delay(ms: u64, callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.delay(ms, callback))
}

pub fn repeat(interval_ms: u64, callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.repeat(interval_ms, callback))
}

pub fn on_readable(fd: RawFd, callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.on_readable(fd, callback))?
}

pub fn on_writable(fd: RawFd, callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.on_writable(fd, callback))?
}

pub fn on_signal(signo: i32, callback: Callback) -> Result<WatcherId, AmpError> {
    with_current(|driver| driver.on_signal(signo, callback))?
}

pub fn enable(id: WatcherId) -> Result<(), AmpError> {
    with_current(|driver| driver.enable(id))?
}

pub fn disable(id: WatcherId) -> Result<(), AmpError> {
    with_current(|driver| driver.disable(id))
}

pub fn cancel(id: WatcherId) -> Result<(), AmpError> {
    with_current(|driver| driver.cancel(id))
}

pub fn reference(id: WatcherId) -> Result<(), AmpError> {
    with_current(|driver| driver.reference(id))?
}

pub fn unreference(id: WatcherId) -> Result<(), AmpError> {
    with_current(|driver| driver.unreference(id))?
}

pub fn set_error_handler(
    handler: Box<dyn FnMut(AmpError) -> Result<(), AmpError>>,
) -> Result<Option<Box<dyn FnMut(AmpError) -> Result<(), AmpError>>>, AmpError> {
    with_current(|driver| driver.set_error_handler(handler))
}

pub fn set_state(key: impl Into<String>, value: Rc<dyn Any>) -> Result<(), AmpError> {
    let key = key.into();
    with_current(|driver| driver.set_state(key, value))
}

pub fn get_state(key: &str) -> Result<Option<Rc<dyn Any>>, AmpError> {
    with_current(|driver| driver.get_state(key))
}

pub fn get_info() -> Result<GetInfo, AmpError> {
    with_current(|driver| driver.get_info())
}
