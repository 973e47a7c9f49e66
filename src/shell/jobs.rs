use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::{self, Pid};
use once_cell::sync::Lazy;

/// Set from the SIGINT handler, polled by the scheduler before each
/// pipeline dispatch, cleared once per input line.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// The shell's own process group, captured once at startup.
static SHELL_PGID: Lazy<Pid> = Lazy::new(unistd::getpgrp);

extern "C" fn handle_sigint(_signal: libc::c_int) {
    // Async-signal context: set the flag and do nothing else.
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install signal handlers and put the shell in control of its terminal.
///
/// SIGTTOU must be ignored first: taking the terminal back from a
/// foreground child would otherwise suspend the shell itself.
pub fn install() -> nix::Result<()> {
    Lazy::force(&SHELL_PGID);
    unsafe {
        signal::signal(Signal::SIGTTOU, SigHandler::SigIgn)?;
        let action = SigAction::new(
            SigHandler::Handler(handle_sigint),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        signal::sigaction(Signal::SIGINT, &action)?;
    }
    set_foreground(shell_pgid());
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

pub fn clear_interrupt() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

pub fn shell_pgid() -> Pid {
    *SHELL_PGID
}

/// Hand the controlling terminal to `pgid`. Failure is not fatal: without
/// a controlling terminal (scripts, tests) there is nothing to hand over.
pub fn set_foreground(pgid: Pid) {
    if let Err(e) = unistd::tcsetpgrp(io::stdin(), pgid) {
        debug!("tcsetpgrp({}): {}", pgid, e);
    }
}

/// Non-blocking reap of finished background children. Runs at the idle
/// point before each input line so detached jobs never pile up as zombies.
pub fn reap_background() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WF::WNOHANG)) {
            Ok(WS::StillAlive) => break,
            Ok(WS::Exited(pid, status)) => {
                debug!("reaped background job {} (status {})", pid, status);
            }
            Ok(ws) => debug!("reaped background child: {:?}", ws),
            Err(Errno::ECHILD) => break,
            Err(e) => {
                error!("minish: waitpid: {}", e);
                break;
            }
        }
    }
}

/// Serializes tests that fork children, wait, or touch the interrupt flag;
/// all of that is process-wide state.
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
