//! Event loop (C8): multiplexes the compositor connection, POSIX signals,
//! and the RPC socket on `calloop`, matching the teacher's own event-loop
//! construction in `compositor/src/main.rs`/`state.rs`. Spec.md §4.7.

use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::raw::c_int;
use std::sync::atomic::{AtomicI32, Ordering};

use calloop::generic::Generic;
use calloop::{EventLoop, Interest, Mode, PostAction};
use calloop_wayland_source::WaylandSource;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;
use tracing::{info, warn};
use wayland_client::{Connection, EventQueue};

use crate::daemon::Daemon;
use crate::rpc::RpcServer;

const TERMINATING_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTERM];

/// The read end of the self-pipe signal handlers write into. One byte per
/// delivered signal, holding the signal number (spec.md §5: "handlers do
/// nothing but write the signal number to a self-pipe").
struct SignalPipe(OwnedFd);

impl AsFd for SignalPipe {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

static SIGNAL_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn write_signal_to_pipe(signum: c_int) {
    let fd: RawFd = SIGNAL_WRITE_FD.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }
    let byte = [signum as u8];
    // SAFETY: async-signal-safe; `write` never allocates. A failed write
    // (pipe full, signal storm) is acceptable to drop per spec.md §5.
    let _ = unistd::write(fd, &byte);
}

fn install_signal_handlers() -> nix::Result<SignalPipe> {
    let (read_fd, write_fd) = unistd::pipe2(nix::fcntl::OFlag::O_NONBLOCK | nix::fcntl::OFlag::O_CLOEXEC)?;
    SIGNAL_WRITE_FD.store(write_fd, Ordering::Relaxed);
    // The write end stays open for the process lifetime: the handler always
    // needs somewhere to write, and it's one fd for the life of the daemon.

    let action = SigAction::new(
        SigHandler::Handler(write_signal_to_pipe),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    for sig in TERMINATING_SIGNALS.into_iter().chain([Signal::SIGHUP]) {
        unsafe { signal::sigaction(sig, &action)? };
    }

    // SAFETY: `read_fd` was just created by `pipe2` and is owned by nobody else.
    Ok(SignalPipe(unsafe { OwnedFd::from_raw_fd(read_fd) }))
}

/// Runs the daemon until a terminating signal or one-shot completion.
/// Returns the process exit code per spec.md §6.
pub fn run(
    connection: Connection,
    event_queue: EventQueue<Daemon>,
    mut daemon: Daemon,
    rpc: RpcServer,
) -> i32 {
    let mut event_loop: EventLoop<Daemon> = match EventLoop::try_new() {
        Ok(l) => l,
        Err(err) => {
            warn!(error = %err, "failed to create event loop");
            return 1;
        }
    };
    let handle = event_loop.handle();

    if let Err(err) = WaylandSource::new(connection, event_queue).insert(handle.clone()) {
        warn!(error = %err, "failed to register wayland source");
        return 1;
    }

    let signal_pipe = match install_signal_handlers() {
        Ok(pipe) => pipe,
        Err(err) => {
            warn!(error = %err, "failed to install signal handlers");
            return 1;
        }
    };
    let signal_source = Generic::new(signal_pipe, Interest::READ, Mode::Level);
    let insert_result = handle.insert_source(signal_source, |_, pipe, daemon: &mut Daemon| {
        let mut buf = [0u8; 16];
        loop {
            match unistd::read(pipe.as_fd().as_raw_fd(), &mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for &signum in &buf[..n] {
                        handle_signal(daemon, signum as i32);
                    }
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(err) => {
                    warn!(error = %err, "signal pipe read error");
                    return Err(std::io::Error::from(err));
                }
            }
        }
        Ok(PostAction::Continue)
    });
    if let Err(err) = insert_result {
        warn!(error = %err, "failed to register signal source");
        return 1;
    }

    let rpc_source = Generic::new(rpc, Interest::READ, Mode::Level);
    let insert_result = handle.insert_source(rpc_source, |_, rpc, daemon: &mut Daemon| {
        rpc.drain(daemon);
        Ok(PostAction::Continue)
    });
    if let Err(err) = insert_result {
        warn!(error = %err, "failed to register rpc source");
        return 1;
    }

    info!("event loop starting");
    loop {
        if let Err(err) = event_loop.dispatch(None, &mut daemon) {
            warn!(error = %err, "event loop dispatch error");
            return 1;
        }
        if let Some(code) = daemon.exit_code {
            return code;
        }
    }
}

fn handle_signal(daemon: &mut Daemon, signum: i32) {
    if signum == Signal::SIGHUP as i32 {
        info!("SIGHUP received, reloading");
        daemon.reload();
        return;
    }
    for sig in TERMINATING_SIGNALS {
        if signum == sig as i32 {
            info!(signal = signum, "terminating signal received");
            daemon.exit_code = Some(128 + signum);
            return;
        }
    }
}
