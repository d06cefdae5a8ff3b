use std::cell::RefCell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use amp_types::{fresh_loop_nonce, AmpError, GetInfo, WatcherId, WatcherKind, WatcherState};

use crate::multiplexer::{Interest, Multiplexer, ReadyEvents};
use crate::registry::{Callback, WatcherExtra, WatcherRegistry};
use crate::state::LoopState;

/// The event loop driver (component B): owns the watcher registry, the
/// loop-bound error handler and key/value state, and the OS multiplexer,
/// and runs the fixed defer → timer → I/O → signal tick order from the
/// design notes.
///
/// `run`/`tick` and their dispatch helpers take `&Rc<RefCell<EventLoop>>`
/// rather than `&mut self`: a watcher callback routinely re-enters the
/// accessor (another `defer`, a woken `Future`, `Consumer::advance`) while
/// it is on the stack, and that reentrant call borrows the very same
/// `RefCell` a caller like `amp_rt::accessor::run` wraps this driver in. So
/// every borrow here is taken just long enough to read or mutate registry
/// state, and is dropped again before a callback is actually invoked.
pub struct EventLoop {
    registry: WatcherRegistry,
    state: LoopState,
    multiplexer: Multiplexer,
    loop_nonce: [u8; 16],
    next_counter: u64,
    running: bool,
    tick_count: u64,
    /// Readiness gathered by the poll at the tail of the previous tick,
    /// dispatched as this tick's I/O and signal phases.
    pending_ready: ReadyEvents,
}

impl EventLoop {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            registry: WatcherRegistry::new(),
            state: LoopState::new(),
            multiplexer: Multiplexer::new()?,
            loop_nonce: fresh_loop_nonce(),
            next_counter: 0,
            running: false,
            tick_count: 0,
            pending_ready: ReadyEvents::default(),
        })
    }

    fn mint_id(&mut self) -> WatcherId {
        let id = WatcherId::derive(&self.loop_nonce, self.next_counter);
        self.next_counter += 1;
        id
    }

    // ---- watcher constructors ----

    pub fn defer(&mut self, callback: Callback) -> WatcherId {
        let id = self.mint_id();
        self.registry.insert(id, WatcherKind::Defer, WatcherExtra::None, callback);
        id
    }

    pub fn delay(&mut self, ms: u64, callback: Callback) -> WatcherId {
        let id = self.mint_id();
        let deadline = Instant::now() + Duration::from_millis(ms);
        self.registry
            .insert(id, WatcherKind::Delay, WatcherExtra::Timer { deadline, interval: None }, callback);
        id
    }

    pub fn repeat(&mut self, interval_ms: u64, callback: Callback) -> WatcherId {
        let id = self.mint_id();
        let interval = Duration::from_millis(interval_ms);
        let deadline = Instant::now() + interval;
        self.registry.insert(
            id,
            WatcherKind::Repeat,
            WatcherExtra::Timer { deadline, interval: Some(interval) },
            callback,
        );
        id
    }

    pub fn on_readable(&mut self, fd: RawFd, callback: Callback) -> Result<WatcherId, AmpError> {
        self.register_io(fd, Interest::Readable, WatcherKind::OnReadable, callback)
    }

    pub fn on_writable(&mut self, fd: RawFd, callback: Callback) -> Result<WatcherId, AmpError> {
        self.register_io(fd, Interest::Writable, WatcherKind::OnWritable, callback)
    }

    fn register_io(
        &mut self,
        fd: RawFd,
        interest: Interest,
        kind: WatcherKind,
        callback: Callback,
    ) -> Result<WatcherId, AmpError> {
        self.multiplexer
            .register_fd(fd, interest)
            .map_err(|e| AmpError::UnsupportedFeature(format!("failed to register fd: {e}")))?;
        let id = self.mint_id();
        self.registry.insert(id, kind, WatcherExtra::Io { fd, interest }, callback);
        Ok(id)
    }

    pub fn on_signal(&mut self, signo: i32, callback: Callback) -> Result<WatcherId, AmpError> {
        self.multiplexer
            .watch_signal(signo)
            .map_err(|e| AmpError::UnsupportedFeature(format!("signal {signo} unavailable: {e}")))?;
        let id = self.mint_id();
        self.registry
            .insert(id, WatcherKind::OnSignal, WatcherExtra::Signal { signo }, callback);
        Ok(id)
    }

    // ---- watcher controls ----

    pub fn enable(&mut self, id: WatcherId) -> Result<(), AmpError> {
        self.registry.enable(id)
    }

    pub fn disable(&mut self, id: WatcherId) {
        self.registry.disable(id)
    }

    pub fn cancel(&mut self, id: WatcherId) {
        if let Some((fd, interest)) = self.registry.io_extra(id) {
            let _ = self.multiplexer.deregister_fd(fd, interest);
        }
        self.registry.cancel(id);
    }

    pub fn reference(&mut self, id: WatcherId) -> Result<(), AmpError> {
        self.registry.reference(id)
    }

    pub fn unreference(&mut self, id: WatcherId) -> Result<(), AmpError> {
        self.registry.unreference(id)
    }

    // ---- loop-bound state ----

    pub fn set_error_handler(
        &mut self,
        handler: Box<dyn FnMut(AmpError) -> Result<(), AmpError>>,
    ) -> Option<Box<dyn FnMut(AmpError) -> Result<(), AmpError>>> {
        self.state.set_error_handler(handler)
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: std::rc::Rc<dyn std::any::Any>) {
        self.state.set_state(key, value)
    }

    pub fn get_state(&self, key: &str) -> Option<std::rc::Rc<dyn std::any::Any>> {
        self.state.get_state(key)
    }

    pub fn get_info(&self) -> GetInfo {
        self.registry.get_info(self.running, self.tick_count)
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    // ---- lifecycle: everything below runs through a caller-supplied
    // handle, borrowing it only for the duration of a single registry read
    // or mutation, never across a callback invocation ----

    pub fn run(this: &Rc<RefCell<Self>>) -> Result<(), AmpError> {
        this.borrow_mut().running = true;
        loop {
            let should_continue = {
                let guard = this.borrow();
                guard.running && guard.registry.has_referenced_enabled()
            };
            if !should_continue {
                break;
            }
            Self::tick(this)?;
        }
        this.borrow_mut().running = false;
        Ok(())
    }

    /// Run exactly one tick. Exposed for tests that assert ordering
    /// directly rather than driving a full `run()`.
    pub fn tick(this: &Rc<RefCell<Self>>) -> Result<(), AmpError> {
        let tick_index = {
            let mut guard = this.borrow_mut();
            guard.tick_count += 1;
            guard.registry.activate_pending();
            guard.tick_count
        };
        let span = tracing::trace_span!("tick", index = tick_index);
        let _enter = span.enter();

        let defer_ids = this.borrow_mut().registry.due_defers();
        for id in defer_ids {
            Self::dispatch_one_shot(this, id)?;
        }

        let now = Instant::now();
        let timer_ids = this.borrow().registry.due_timers(now);
        for id in timer_ids {
            Self::dispatch_timer(this, id, now)?;
        }

        let ready = {
            let mut guard = this.borrow_mut();
            std::mem::take(&mut guard.pending_ready)
        };
        for (fd, interest) in ready.io {
            let watcher = this.borrow().registry.io_watcher_for(fd, interest);
            if let Some(id) = watcher {
                Self::dispatch_persistent(this, id)?;
            }
        }
        for signo in ready.signals {
            let watchers = this.borrow().registry.signal_watchers_for(signo);
            for id in watchers {
                Self::dispatch_persistent(this, id)?;
            }
        }

        Self::block_for_next_deadline(this)?;
        Ok(())
    }

    fn block_for_next_deadline(this: &Rc<RefCell<Self>>) -> Result<(), AmpError> {
        let (has_referenced_enabled, timeout) = {
            let guard = this.borrow();
            let timeout = guard
                .registry
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(Instant::now()));
            (guard.registry.has_referenced_enabled(), timeout)
        };
        if !has_referenced_enabled {
            this.borrow_mut().pending_ready = ReadyEvents::default();
            return Ok(());
        }
        let polled = this.borrow_mut().multiplexer.poll(timeout);
        match polled {
            Ok(ready) => {
                this.borrow_mut().pending_ready = ready;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "multiplexer poll failed");
                Self::dispatch_error(this, AmpError::UnsupportedFeature(format!("multiplexer poll failed: {e}")))
            }
        }
    }

    /// A watcher's due-ness is snapshotted once per tick (`due_defers`,
    /// `due_timers`); its state can still change between that snapshot and
    /// actual dispatch if an earlier callback in the same tick disabled or
    /// cancelled it. Every dispatch helper re-checks `Enabled` immediately
    /// before invoking the callback for exactly this reason — disabling a
    /// later watcher takes effect within the tick that disables it, not
    /// just the next one.
    fn dispatch_one_shot(this: &Rc<RefCell<Self>>, id: WatcherId) -> Result<(), AmpError> {
        let cb = {
            let mut guard = this.borrow_mut();
            let kind = match guard.registry.get(id) {
                Some(rec) if rec.state == WatcherState::Enabled => rec.kind,
                _ => return Ok(()),
            };
            guard.registry.invalidate(id);
            guard.registry.take_callback(id).map(|cb| (kind, cb))
        };
        if let Some((kind, mut cb)) = cb {
            let span = tracing::trace_span!("watcher.fire", %id, kind = kind.name());
            let _enter = span.enter();
            if let Err(e) = cb(id) {
                Self::dispatch_error(this, e)?;
            }
        }
        Ok(())
    }

    fn dispatch_timer(this: &Rc<RefCell<Self>>, id: WatcherId, now: Instant) -> Result<(), AmpError> {
        let cb = {
            let mut guard = this.borrow_mut();
            let is_repeat = match guard.registry.get(id) {
                Some(rec) if rec.state == WatcherState::Enabled => rec.kind == WatcherKind::Repeat,
                _ => return Ok(()),
            };
            if !is_repeat {
                guard.registry.invalidate(id);
            }
            guard.registry.take_callback(id).map(|cb| (is_repeat, cb))
        };
        if let Some((is_repeat, mut cb)) = cb {
            let span = tracing::trace_span!("watcher.fire", %id, kind = if is_repeat { "repeat" } else { "delay" });
            let _enter = span.enter();
            let result = cb(id);
            if is_repeat {
                let mut guard = this.borrow_mut();
                guard.registry.restore_callback(id, cb);
                guard.registry.reschedule_repeat(id, now);
            }
            if let Err(e) = result {
                Self::dispatch_error(this, e)?;
            }
        }
        Ok(())
    }

    fn dispatch_persistent(this: &Rc<RefCell<Self>>, id: WatcherId) -> Result<(), AmpError> {
        let cb = {
            let mut guard = this.borrow_mut();
            match guard.registry.get(id) {
                Some(rec) if rec.state == WatcherState::Enabled => {}
                _ => return Ok(()),
            }
            guard.registry.take_callback(id)
        };
        if let Some(mut cb) = cb {
            let result = cb(id);
            this.borrow_mut().registry.restore_callback(id, cb);
            if let Err(e) = result {
                Self::dispatch_error(this, e)?;
            }
        }
        Ok(())
    }

    /// Routes a callback error to the loop's error handler, if any, taking
    /// it out of `state` for the duration of the call so a handler that
    /// itself touches the accessor does not re-borrow this same `RefCell`.
    fn dispatch_error(this: &Rc<RefCell<Self>>, err: AmpError) -> Result<(), AmpError> {
        let handler = this.borrow_mut().state.take_error_handler();
        match handler {
            Some(mut handler) => {
                let result = handler(err);
                this.borrow_mut().state.restore_error_handler(handler);
                result
            }
            None => Err(err),
        }
    }
}
