//! Hook runner (C6): double-fork/setsid/exec of profile `exec` commands
//! after a successful transaction. Spec.md §4.5.

use std::env;
use std::ffi::CString;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{fork, setsid, ForkResult};
use tracing::{info, warn};

use crate::error::HookError;

/// Runs every hook command, logging but never propagating individual
/// failures — spec.md §7: "hook spawn failures are logged but never fatal."
pub fn run_all(commands: &[String]) {
    for command in commands {
        if let Err(err) = run_one(command) {
            warn!(command, error = %err, "failed to run hook");
        }
    }
}

/// Forks twice so the hook fully detaches from the daemon (spec.md §4.5):
/// the middle child resets its signal mask/dispositions, double-forks, waits
/// for the inner grandchild, and reports its exit status. The daemon (outer
/// parent) returns immediately and never waits on the middle child.
fn run_one(command: &str) -> Result<(), HookError> {
    // SAFETY: fork() is async-signal-safe-only on the child side; the child
    // branch below does nothing except nix/libc calls until exec or exit.
    match unsafe { fork() }.map_err(HookError::Fork)? {
        ForkResult::Parent { .. } => Ok(()),
        ForkResult::Child => {
            run_middle_child(command);
            std::process::exit(0);
        }
    }
}

fn run_middle_child(command: &str) {
    let _ = setsid();
    reset_signals();

    let grandchild = unsafe { fork() };
    match grandchild {
        Ok(ForkResult::Parent { child, .. }) => {
            match waitpid(child, None) {
                Ok(status) => info!(?status, command, "hook exited"),
                Err(err) => warn!(error = %err, command, "failed to wait for hook"),
            }
        }
        Ok(ForkResult::Child) => {
            exec_shell(command);
            std::process::exit(127);
        }
        Err(err) => warn!(error = %err, command, "failed to double-fork for hook"),
    }
}

fn reset_signals() {
    let _ = signal::sigprocmask(
        signal::SigmaskHow::SIG_SETMASK,
        Some(&signal::SigSet::empty()),
        None,
    );
    for sig in [Signal::SIGINT, Signal::SIGQUIT, Signal::SIGTERM, Signal::SIGHUP] {
        unsafe {
            let _ = signal::signal(sig, SigHandler::SigDfl);
        }
    }
}

fn exec_shell(command: &str) {
    let shell = env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let Ok(shell_c) = CString::new(shell.clone()) else {
        return;
    };
    let Ok(flag) = CString::new("-c") else {
        return;
    };
    let Ok(command_c) = CString::new(command) else {
        return;
    };
    let args = [shell_c.clone(), flag, command_c];
    // execv only returns on failure.
    let err = nix::unistd::execv(&shell_c, &args).unwrap_err();
    warn!(error = %err, shell, "failed to exec hook shell");
}
