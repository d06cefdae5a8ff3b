use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest as MioInterest, Poll, Token};
use signal_hook::consts::signal::SIGWINCH;
use signal_hook_mio::v1_0::Signals;

/// Readiness a caller registered interest in for a given file descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interest {
    Readable,
    Writable,
}

impl Interest {
    fn to_mio(self) -> MioInterest {
        match self {
            Interest::Readable => MioInterest::READABLE,
            Interest::Writable => MioInterest::WRITABLE,
        }
    }
}

const SIGNAL_TOKEN: Token = Token(usize::MAX);

/// Readiness gathered by one `poll` call, to be dispatched as the I/O and
/// signal phases of the *next* tick (per the driver's "block at the tail,
/// dispatch at the head" pipelining — see `driver::EventLoop::tick`).
#[derive(Default)]
pub struct ReadyEvents {
    pub io: Vec<(RawFd, Interest)>,
    pub signals: Vec<i32>,
}

/// Owns the `mio::Poll` instance plus the signal pipe (component B's OS
/// collaborator). Grounded on `r3bl_tui`'s reactor, which multiplexes
/// stdin-like readiness together with `SIGWINCH` on one `mio::Poll`.
pub struct Multiplexer {
    poll: Poll,
    next_token: usize,
    fd_tokens: std::collections::HashMap<(RawFd, Interest), Token>,
    signals: Signals,
}

impl Multiplexer {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut signals = Signals::new([SIGWINCH])?;
        poll.registry().register(&mut signals, SIGNAL_TOKEN, MioInterest::READABLE)?;
        Ok(Self { poll, next_token: 0, fd_tokens: std::collections::HashMap::new(), signals })
    }

    /// Register interest in `signo` beyond the default SIGWINCH pipe.
    pub fn watch_signal(&mut self, signo: i32) -> io::Result<()> {
        self.signals.add_signal(signo)
    }

    pub fn register_fd(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll
            .registry()
            .register(&mut SourceFd(&fd), token, interest.to_mio())?;
        self.fd_tokens.insert((fd, interest), token);
        Ok(())
    }

    pub fn deregister_fd(&mut self, fd: RawFd, interest: Interest) -> io::Result<()> {
        if let Some(_token) = self.fd_tokens.remove(&(fd, interest)) {
            self.poll.registry().deregister(&mut SourceFd(&fd))?;
        }
        Ok(())
    }

    /// Block until an event arrives or `timeout` elapses (`None` blocks
    /// indefinitely), returning everything that became ready.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<ReadyEvents> {
        let mut events = Events::with_capacity(64);
        match self.poll.poll(&mut events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(ReadyEvents::default()),
            Err(e) => return Err(e),
        }

        let mut ready = ReadyEvents::default();
        for event in events.iter() {
            if event.token() == SIGNAL_TOKEN {
                ready.signals.extend(self.signals.pending());
                continue;
            }
            for (&(fd, interest), &token) in self.fd_tokens.iter() {
                if token == event.token() {
                    let matches = match interest {
                        Interest::Readable => event.is_readable(),
                        Interest::Writable => event.is_writable(),
                    };
                    if matches {
                        ready.io.push((fd, interest));
                    }
                }
            }
        }
        Ok(ready)
    }
}
