use crate::watcher::WatcherKind;

/// Enabled/disabled counts for one watcher kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub enabled: u32,
    pub disabled: u32,
}

/// Referenced/unreferenced counts over the currently-enabled watcher set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceCounts {
    pub referenced: u32,
    pub unreferenced: u32,
}

/// Diagnostic snapshot returned by `EventLoop::get_info`, matching the
/// stable shape every driver in this system must expose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetInfo {
    pub defer: KindCounts,
    pub delay: KindCounts,
    pub repeat: KindCounts,
    pub on_readable: KindCounts,
    pub on_writable: KindCounts,
    pub on_signal: KindCounts,
    pub enabled_watchers: ReferenceCounts,
    pub running: bool,
    /// Extra, non-mandatory field: monotonic count of ticks run so far.
    pub tick_count: u64,
}

impl GetInfo {
    pub fn counts_for(&self, kind: WatcherKind) -> KindCounts {
        match kind {
            WatcherKind::Defer => self.defer,
            WatcherKind::Delay => self.delay,
            WatcherKind::Repeat => self.repeat,
            WatcherKind::OnReadable => self.on_readable,
            WatcherKind::OnWritable => self.on_writable,
            WatcherKind::OnSignal => self.on_signal,
        }
    }

    pub fn counts_for_mut(&mut self, kind: WatcherKind) -> &mut KindCounts {
        match kind {
            WatcherKind::Defer => &mut self.defer,
            WatcherKind::Delay => &mut self.delay,
            WatcherKind::Repeat => &mut self.repeat,
            WatcherKind::OnReadable => &mut self.on_readable,
            WatcherKind::OnWritable => &mut self.on_writable,
            WatcherKind::OnSignal => &mut self.on_signal,
        }
    }
}
