use std::collections::{HashMap, VecDeque};
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use amp_types::{AmpError, GetInfo, WatcherId, WatcherKind, WatcherState};

use crate::multiplexer::Interest;

pub type Callback = Box<dyn FnMut(WatcherId) -> Result<(), AmpError>>;

/// Kind-specific payload a watcher carries alongside its callback.
#[derive(Clone, Copy)]
pub enum WatcherExtra {
    None,
    Timer { deadline: Instant, interval: Option<Duration> },
    Io { fd: RawFd, interest: Interest },
    Signal { signo: i32 },
}

pub struct WatcherRecord {
    pub kind: WatcherKind,
    pub state: WatcherState,
    pub referenced: bool,
    /// False until the start of the tick following the one it was
    /// (re-)enabled in; see the activation rule in `driver`.
    pub active: bool,
    pub extra: WatcherExtra,
    pub callback: Option<Callback>,
}

/// Tracks every watcher's identity, kind, state, and reference count
/// (component A). Mirrors the teacher's `InvariantState` shape: a single
/// accumulator struct plus small per-category helper methods, with all
/// mutation funnelled through a few central entry points.
#[derive(Default)]
pub struct WatcherRegistry {
    watchers: HashMap<WatcherId, WatcherRecord>,
    /// Registration order for defer watchers; lazily pruned of ids that
    /// are no longer present (cancelled) or no longer deferred-kind.
    defer_order: VecDeque<WatcherId>,
}

impl WatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: WatcherId, kind: WatcherKind, extra: WatcherExtra, callback: Callback) {
        self.watchers.insert(
            id,
            WatcherRecord {
                kind,
                state: WatcherState::Enabled,
                referenced: true,
                active: false,
                extra,
                callback: Some(callback),
            },
        );
        if kind == WatcherKind::Defer {
            self.defer_order.push_back(id);
        }
    }

    pub fn get(&self, id: WatcherId) -> Option<&WatcherRecord> {
        self.watchers.get(&id)
    }

    pub fn get_mut(&mut self, id: WatcherId) -> Option<&mut WatcherRecord> {
        self.watchers.get_mut(&id)
    }

    pub fn enable(&mut self, id: WatcherId) -> Result<(), AmpError> {
        let rec = self.watchers.get_mut(&id).ok_or(AmpError::InvalidWatcher)?;
        if rec.state == WatcherState::Invalid {
            return Err(AmpError::InvalidWatcher);
        }
        rec.state = WatcherState::Enabled;
        rec.active = false;
        Ok(())
    }

    /// No-op on an unknown id, per the idempotent-shutdown invariant.
    pub fn disable(&mut self, id: WatcherId) {
        if let Some(rec) = self.watchers.get_mut(&id) {
            if rec.state != WatcherState::Invalid {
                rec.state = WatcherState::Disabled;
            }
        }
    }

    /// No-op on an unknown id.
    pub fn cancel(&mut self, id: WatcherId) {
        if let Some(rec) = self.watchers.get_mut(&id) {
            rec.state = WatcherState::Invalid;
            rec.callback = None;
        }
    }

    pub fn reference(&mut self, id: WatcherId) -> Result<(), AmpError> {
        let rec = self.watchers.get_mut(&id).ok_or(AmpError::InvalidWatcher)?;
        if rec.state == WatcherState::Invalid {
            return Err(AmpError::InvalidWatcher);
        }
        rec.referenced = true;
        Ok(())
    }

    pub fn unreference(&mut self, id: WatcherId) -> Result<(), AmpError> {
        let rec = self.watchers.get_mut(&id).ok_or(AmpError::InvalidWatcher)?;
        if rec.state == WatcherState::Invalid {
            return Err(AmpError::InvalidWatcher);
        }
        rec.referenced = false;
        Ok(())
    }

    /// Promote every enabled-but-inactive watcher to active. Called once
    /// at the head of each tick, before any dispatch phase.
    pub fn activate_pending(&mut self) {
        for rec in self.watchers.values_mut() {
            if rec.state == WatcherState::Enabled && !rec.active {
                rec.active = true;
            }
        }
    }

    /// Ids of active, enabled defer watchers, in registration order. Prunes
    /// `defer_order` of ids that were cancelled or that never fire again.
    pub fn due_defers(&mut self) -> Vec<WatcherId> {
        self.defer_order.retain(|id| {
            matches!(self.watchers.get(id), Some(rec) if rec.kind == WatcherKind::Defer && rec.state != WatcherState::Invalid)
        });
        self.defer_order
            .iter()
            .copied()
            .filter(|id| matches!(self.watchers.get(id), Some(rec) if rec.state == WatcherState::Enabled && rec.active))
            .collect()
    }

    /// Ids of active, enabled timer watchers whose deadline has passed,
    /// sorted by deadline ascending.
    pub fn due_timers(&self, now: Instant) -> Vec<WatcherId> {
        let mut due: Vec<(Instant, WatcherId)> = self
            .watchers
            .iter()
            .filter_map(|(id, rec)| {
                if rec.state != WatcherState::Enabled || !rec.active {
                    return None;
                }
                match rec.extra {
                    WatcherExtra::Timer { deadline, .. } if deadline <= now => Some((deadline, *id)),
                    _ => None,
                }
            })
            .collect();
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, id)| id).collect()
    }

    /// Earliest upcoming deadline among referenced, enabled timers.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.watchers
            .values()
            .filter(|rec| rec.state == WatcherState::Enabled && rec.referenced)
            .filter_map(|rec| match rec.extra {
                WatcherExtra::Timer { deadline, .. } => Some(deadline),
                _ => None,
            })
            .min()
    }

    pub fn has_referenced_enabled(&self) -> bool {
        self.watchers
            .values()
            .any(|rec| rec.state == WatcherState::Enabled && rec.referenced)
    }

    pub fn io_watcher_for(&self, fd: RawFd, interest: Interest) -> Option<WatcherId> {
        self.watchers.iter().find_map(|(id, rec)| {
            if rec.state != WatcherState::Enabled || !rec.active {
                return None;
            }
            match rec.extra {
                WatcherExtra::Io { fd: rfd, interest: rint } if rfd == fd && rint == interest => Some(*id),
                _ => None,
            }
        })
    }

    /// The `(fd, interest)` an IO watcher was registered with, if any —
    /// used to deregister it from the multiplexer on cancel.
    pub fn io_extra(&self, id: WatcherId) -> Option<(RawFd, Interest)> {
        match self.watchers.get(&id)?.extra {
            WatcherExtra::Io { fd, interest } => Some((fd, interest)),
            _ => None,
        }
    }

    pub fn signal_watchers_for(&self, signo: i32) -> Vec<WatcherId> {
        self.watchers
            .iter()
            .filter_map(|(id, rec)| match rec.extra {
                WatcherExtra::Signal { signo: rsig } if rsig == signo && rec.state == WatcherState::Enabled && rec.active => {
                    Some(*id)
                }
                _ => None,
            })
            .collect()
    }

    /// Take the callback out for invocation, leaving a hole the caller is
    /// responsible for refilling (repeat watchers) or leaving empty
    /// (cancelled one-shot watchers). Centralises the borrow-splitting that
    /// "invoke the callback while also mutating the registry" requires.
    pub fn take_callback(&mut self, id: WatcherId) -> Option<Callback> {
        self.watchers.get_mut(&id).and_then(|rec| rec.callback.take())
    }

    pub fn restore_callback(&mut self, id: WatcherId, callback: Callback) {
        if let Some(rec) = self.watchers.get_mut(&id) {
            rec.callback = Some(callback);
        }
    }

    pub fn invalidate(&mut self, id: WatcherId) {
        if let Some(rec) = self.watchers.get_mut(&id) {
            rec.state = WatcherState::Invalid;
        }
    }

    pub fn reschedule_repeat(&mut self, id: WatcherId, now: Instant) {
        if let Some(rec) = self.watchers.get_mut(&id) {
            if let WatcherExtra::Timer { interval: Some(interval), .. } = rec.extra {
                rec.extra = WatcherExtra::Timer { deadline: now + interval, interval: Some(interval) };
            }
        }
    }

    pub fn get_info(&self, running: bool, tick_count: u64) -> GetInfo {
        let mut info = GetInfo { running, tick_count, ..Default::default() };
        for rec in self.watchers.values() {
            let counts = info.counts_for_mut(rec.kind);
            match rec.state {
                WatcherState::Enabled => counts.enabled += 1,
                WatcherState::Disabled => counts.disabled += 1,
                WatcherState::Invalid => {}
            }
            if rec.state == WatcherState::Enabled {
                if rec.referenced {
                    info.enabled_watchers.referenced += 1;
                } else {
                    info.enabled_watchers.unreferenced += 1;
                }
            }
        }
        info
    }
}
