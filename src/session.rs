//! Session controller: asynchronous termination events and the finalize-once exit path.
//!
//! Three events end a session early. A user interrupt (SIGINT, or Ctrl-C while the line
//! editor owns the terminal) and the idle timeout (SIGALRM) are delivered to a watcher
//! thread that runs the ordinary shutdown path. A fatal fault (SIGSEGV, SIGBUS, or the
//! SIGABRT raised by `explode`) is synchronous for the faulting thread, so it is handled
//! in signal context with async-signal-safe calls only.
//!
//! Every path, normal exit included, first wins a single atomic gate. Whoever loses the
//! race never touches the transcript; the process is already on its way out.

use crate::transcript::Transcript;
use nix::libc;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use nix::sys::termios::{self, SetArg, Termios};
use signal_hook::consts::{SIGALRM, SIGINT};
use signal_hook::iterator::Signals;
use std::io::{self, IsTerminal, Write};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Process exit statuses.
pub mod status {
    /// `exit`, or end of input.
    pub const NORMAL: i32 = 0;
    /// The transcript could not be opened for append.
    pub const LOG_OPEN_FAILURE: i32 = 1;
    /// Signal handlers, the idle alarm, the terminal or the line editor could not be set up.
    pub const SESSION_SETUP_FAILURE: i32 = 2;
    /// Reading the next input line failed.
    pub const INPUT_FAILURE: i32 = 3;
    /// The operating system refused to create another process.
    pub const RESOURCE_FAILURE: i32 = 4;
    /// Invalid command-line usage.
    pub const USAGE: i32 = 64;
    pub const IDLE_TIMEOUT: i32 = 253;
    pub const USER_INTERRUPT: i32 = 254;
    pub const FATAL_FAULT: i32 = 255;
}

const FAULT_MESSAGE: &str = "A segmentation fault has been detected.\nExiting...\n";

/// Signals treated as a fatal fault.
const FAULT_SIGNALS: [Signal; 3] = [Signal::SIGSEGV, Signal::SIGBUS, Signal::SIGABRT];

/// An asynchronous event that ends the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationEvent {
    FatalFault,
    UserInterrupt,
    IdleTimeout,
}

impl TerminationEvent {
    pub fn exit_code(self) -> i32 {
        match self {
            TerminationEvent::FatalFault => status::FATAL_FAULT,
            TerminationEvent::UserInterrupt => status::USER_INTERRUPT,
            TerminationEvent::IdleTimeout => status::IDLE_TIMEOUT,
        }
    }

    /// Human-readable cause, printed right before exiting.
    pub fn message(self) -> &'static str {
        match self {
            TerminationEvent::FatalFault => FAULT_MESSAGE,
            TerminationEvent::UserInterrupt => "\nThe interrupt signal has been caught\nExiting...\n",
            TerminationEvent::IdleTimeout => "The session has expired.\nExiting...\n",
        }
    }

    pub fn from_signal(signal: i32) -> Option<Self> {
        match signal {
            SIGINT => Some(TerminationEvent::UserInterrupt),
            SIGALRM => Some(TerminationEvent::IdleTimeout),
            s if FAULT_SIGNALS.iter().any(|f| *f as i32 == s) => {
                Some(TerminationEvent::FatalFault)
            }
            _ => None,
        }
    }

    fn to_stderr(self) -> bool {
        self == TerminationEvent::FatalFault
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already installed in this process")]
    AlreadyInstalled,
    #[error("cannot install handler for {signal}: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: nix::Error,
    },
    #[error("cannot register signal watcher: {0}")]
    Watcher(#[source] io::Error),
    #[error("cannot read terminal settings: {0}")]
    Terminal(#[source] nix::Error),
}

/// What the fault handler needs; signal handlers get no context argument.
struct FaultTarget {
    terminating: Arc<AtomicBool>,
    log_fd: RawFd,
}

static FAULT_TARGET: OnceLock<FaultTarget> = OnceLock::new();

struct Shared {
    transcript: Arc<Transcript>,
    terminating: Arc<AtomicBool>,
    saved_terminal: Mutex<Option<Termios>>,
}

impl Shared {
    fn finish(&self, event: Option<TerminationEvent>, code: i32) -> ! {
        // The fault handler checks the same gate, so only one path ever touches the log fd.
        if self.terminating.swap(true, Ordering::SeqCst) {
            debug!(?event, "termination already in progress");
            loop {
                thread::park();
            }
        }
        info!(?event, code, "session terminating");

        self.restore_terminal();
        // Nothing below may panic: a closed stdout must not keep the process alive.
        if let Some(event) = event {
            if event.to_stderr() {
                let _ = io::stderr().write_all(event.message().as_bytes());
            } else {
                let mut stdout = io::stdout().lock();
                let _ = stdout.write_all(event.message().as_bytes());
                let _ = stdout.flush();
            }
        }
        if let Err(e) = self.transcript.finalize() {
            let _ = writeln!(
                io::stderr(),
                "Error on closing of {}: {e}",
                self.transcript.path().display()
            );
        }
        std::process::exit(code)
    }

    fn restore_terminal(&self) {
        let saved = self
            .saved_terminal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(termios) = saved.as_ref() {
            if let Err(e) = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, termios) {
                warn!("failed to restore terminal settings: {e}");
            }
        }
    }
}

/// Owner of the session's termination policy.
///
/// Built once in `main` after the transcript is open. From then on the transcript is
/// finalized only through this controller.
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Install the fault handlers and the signal watcher, then arm the idle alarm.
    ///
    /// The alarm is armed once for the whole session and never re-armed.
    pub fn install(
        transcript: Arc<Transcript>,
        idle_timeout: Option<Duration>,
    ) -> Result<Self, SessionError> {
        let terminating = Arc::new(AtomicBool::new(false));
        let saved_terminal = capture_terminal()?;

        install_fault_handlers(terminating.clone(), transcript.raw_fd())?;

        let shared = Arc::new(Shared {
            transcript,
            terminating,
            saved_terminal: Mutex::new(saved_terminal),
        });

        let mut signals = Signals::new([SIGINT, SIGALRM]).map_err(SessionError::Watcher)?;
        let watcher = shared.clone();
        thread::Builder::new()
            .name("session-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    if let Some(event) = TerminationEvent::from_signal(signal) {
                        watcher.finish(Some(event), event.exit_code());
                    }
                }
            })
            .map_err(SessionError::Watcher)?;

        if let Some(timeout) = idle_timeout {
            arm_idle_alarm(timeout);
        }
        debug!(?idle_timeout, "session installed");
        Ok(Self { shared })
    }

    /// End the session because of `event`: message, finalize, event-specific status.
    pub fn terminate(&self, event: TerminationEvent) -> ! {
        self.shared.finish(Some(event), event.exit_code())
    }

    /// End the session without a termination event, e.g. after `exit` or a fatal error
    /// whose message the caller has already printed.
    pub fn shutdown(&self, code: i32) -> ! {
        self.shared.finish(None, code)
    }
}

fn capture_terminal() -> Result<Option<Termios>, SessionError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }
    termios::tcgetattr(&stdin)
        .map(Some)
        .map_err(SessionError::Terminal)
}

fn install_fault_handlers(terminating: Arc<AtomicBool>, log_fd: RawFd) -> Result<(), SessionError> {
    FAULT_TARGET
        .set(FaultTarget {
            terminating,
            log_fd,
        })
        .map_err(|_| SessionError::AlreadyInstalled)?;

    let action = SigAction::new(
        SigHandler::Handler(on_fatal_fault),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in FAULT_SIGNALS {
        // SAFETY: on_fatal_fault only calls async-signal-safe functions.
        unsafe { sigaction(signal, &action) }.map_err(|source| SessionError::Signal {
            signal: signal.as_str(),
            source,
        })?;
    }
    Ok(())
}

extern "C" fn on_fatal_fault(_signal: libc::c_int) {
    if let Some(target) = FAULT_TARGET.get() {
        if !target.terminating.swap(true, Ordering::SeqCst) {
            // SAFETY: write, fsync and _exit are async-signal-safe. Winning the gate means
            // no finalize has run, so the descriptor is still the transcript's.
            unsafe {
                libc::write(
                    libc::STDERR_FILENO,
                    FAULT_MESSAGE.as_ptr().cast(),
                    FAULT_MESSAGE.len(),
                );
                libc::fsync(target.log_fd);
            }
        }
    }
    // SAFETY: _exit never returns and skips every non-reentrant cleanup.
    unsafe { libc::_exit(status::FATAL_FAULT) }
}

fn arm_idle_alarm(timeout: Duration) {
    let secs = timeout.as_secs().clamp(1, u64::from(u32::MAX));
    if let Some(previous) = nix::unistd::alarm::set(secs as libc::c_uint) {
        debug!(previous, "replaced a pending alarm");
    }
    debug!(secs, "idle alarm armed");
}
