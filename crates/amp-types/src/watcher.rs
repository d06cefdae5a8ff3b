/// The six watcher kinds the driver schedules, grouped by tick-ordering
/// class (see `amp_loop::driver` for the class each kind belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatcherKind {
    // ── Class 1: defer ──
    /// Runs once, at the head of the next tick in which it is activated.
    Defer,

    // ── Class 2: timers ──
    /// Runs once, no earlier than `now + delay`.
    Delay,
    /// Runs every `interval`, coalescing missed ticks to a single firing.
    Repeat,

    // ── Class 3: I/O ──
    /// Runs when the underlying stream reports readability.
    OnReadable,
    /// Runs when the underlying stream reports writability.
    OnWritable,

    // ── Class 4: signals ──
    /// Runs when the process receives the watched signal.
    OnSignal,
}

impl WatcherKind {
    pub fn name(&self) -> &'static str {
        match self {
            WatcherKind::Defer => "defer",
            WatcherKind::Delay => "delay",
            WatcherKind::Repeat => "repeat",
            WatcherKind::OnReadable => "on_readable",
            WatcherKind::OnWritable => "on_writable",
            WatcherKind::OnSignal => "on_signal",
        }
    }

    /// True for watchers that fire at most once before becoming invalid.
    pub fn is_one_shot(&self) -> bool {
        matches!(self, WatcherKind::Defer | WatcherKind::Delay)
    }

    pub fn all() -> [WatcherKind; 6] {
        [
            WatcherKind::Defer,
            WatcherKind::Delay,
            WatcherKind::Repeat,
            WatcherKind::OnReadable,
            WatcherKind::OnWritable,
            WatcherKind::OnSignal,
        ]
    }
}

/// Lifecycle state of a single watcher. `Invalid` is terminal: no further
/// transition is possible once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Enabled,
    Disabled,
    Invalid,
}

impl WatcherState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WatcherState::Invalid)
    }
}
