use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use amp_types::AmpError;

/// Loop-scoped error funnel and key/value registry (component C).
///
/// Every callback error flows through `handle_error`. The key/value store
/// lets embedding code stash arbitrary loop-scoped data (e.g. a metrics
/// sink) without a second global.
#[derive(Default)]
pub struct LoopState {
    error_handler: Option<Box<dyn FnMut(AmpError) -> Result<(), AmpError>>>,
    kv: HashMap<String, Rc<dyn Any>>,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new error handler, returning whichever one was previously
    /// installed (if any), so callers can restore it later.
    pub fn set_error_handler(
        &mut self,
        handler: Box<dyn FnMut(AmpError) -> Result<(), AmpError>>,
    ) -> Option<Box<dyn FnMut(AmpError) -> Result<(), AmpError>>> {
        self.error_handler.replace(handler)
    }

    /// Take the error handler out for invocation, leaving a hole the
    /// caller is responsible for refilling via `restore_error_handler`.
    /// Mirrors `WatcherRegistry::take_callback`/`restore_callback`: the
    /// handler may itself touch the loop (e.g. schedule a retry), so it
    /// must run without this state borrowed.
    pub fn take_error_handler(&mut self) -> Option<Box<dyn FnMut(AmpError) -> Result<(), AmpError>>> {
        self.error_handler.take()
    }

    pub fn restore_error_handler(&mut self, handler: Box<dyn FnMut(AmpError) -> Result<(), AmpError>>) {
        self.error_handler = Some(handler);
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Rc<dyn Any>) {
        self.kv.insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.kv.get(key).cloned()
    }
}
