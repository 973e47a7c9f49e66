use std::env;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use log::{debug, error};
use nix::errno::Errno;
use nix::unistd::{self, ForkResult, Pid};

use crate::shell::parser::ast::{Command, Redirection};
use crate::shell::parser::lexer::RedirectOp;
use crate::utils::path::find_file_in_path;

// Child-side failure statuses, following the usual shell conventions.
const STATUS_REDIRECT_FAILED: i32 = 1;
const STATUS_EXEC_FAILED: i32 = 126;
const STATUS_NOT_FOUND: i32 = 127;

/// Launch one pipeline: `commands` is a maximal run of pipe-linked nodes.
///
/// Creates N processes wired through N-1 pipes, records each child's pid on
/// its node, and returns the process group shared by all members (None when
/// nothing was forked, e.g. a lone `cd`). The caller waits on the members;
/// the pipeline's status is by definition the last member's status.
pub fn launch(commands: &mut [Command]) -> nix::Result<Option<Pid>> {
    let count = commands.len();
    let mut pipes: Vec<(OwnedFd, OwnedFd)> = Vec::with_capacity(count.saturating_sub(1));
    for _ in 1..count {
        pipes.push(unistd::pipe()?);
    }

    let mut pgid: Option<Pid> = None;
    for index in 0..count {
        let command = &mut commands[index];
        // `cd` mutates the shell's own working directory, so it must run in
        // this process rather than in a forked child.
        if command.arguments.first().map(String::as_str) == Some("cd") {
            command.status = Some(builtin_cd(&command.arguments));
            continue;
        }

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => run_child(command, index, count, &pipes, pgid),
            Ok(ForkResult::Parent { child }) => {
                command.pid = Some(child);
                let group = *pgid.get_or_insert(child);
                // Other half of the setpgid race: the child makes the same
                // call for itself, whichever lands first wins.
                let _ = unistd::setpgid(child, group);
                debug!("forked {} into group {}", child, group);
            }
            Err(e) => {
                // A failed fork is confined to this member; siblings and
                // later chain nodes proceed normally.
                error!("minish: fork: {}", e);
                eprintln!("minish: fork: {}", e);
                command.status = Some(STATUS_EXEC_FAILED);
            }
        }
    }

    // Closes every pipe end still open in the shell. A leaked write end
    // would keep the downstream reader from ever seeing EOF.
    drop(pipes);
    Ok(pgid)
}

/// Wire up and exec one pipeline member. Never returns.
fn run_child(
    command: &Command,
    index: usize,
    count: usize,
    pipes: &[(OwnedFd, OwnedFd)],
    pgid: Option<Pid>,
) -> ! {
    let _ = unistd::setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));

    if index > 0 {
        wire(pipes[index - 1].0.as_raw_fd(), libc::STDIN_FILENO);
    }
    if index + 1 < count {
        wire(pipes[index].1.as_raw_fd(), libc::STDOUT_FILENO);
    }
    for (read, write) in pipes {
        unsafe {
            libc::close(read.as_raw_fd());
            libc::close(write.as_raw_fd());
        }
    }

    // Redirections come after pipe wiring and override it; applying them in
    // token order makes the last one per stream win.
    for redirection in &command.redirections {
        match open_target(redirection) {
            Ok(file) => {
                let stream = match redirection.operator {
                    RedirectOp::Input => libc::STDIN_FILENO,
                    RedirectOp::Output => libc::STDOUT_FILENO,
                    RedirectOp::ErrorOutput => libc::STDERR_FILENO,
                };
                wire(file.as_raw_fd(), stream);
            }
            Err(e) => {
                eprintln!("minish: {}: {}", redirection.target, e);
                unsafe { libc::_exit(STATUS_REDIRECT_FAILED) }
            }
        }
    }

    exec(&command.arguments)
}

fn wire(fd: RawFd, stream: RawFd) {
    if let Err(e) = unistd::dup2(fd, stream) {
        eprintln!("minish: dup2: {}", e);
        unsafe { libc::_exit(STATUS_EXEC_FAILED) }
    }
}

fn open_target(redirection: &Redirection) -> std::io::Result<File> {
    match redirection.operator {
        RedirectOp::Input => OpenOptions::new().read(true).open(&redirection.target),
        RedirectOp::Output | RedirectOp::ErrorOutput => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&redirection.target),
    }
}

/// Resolve the program through `$PATH` and replace this process with it.
fn exec(arguments: &[String]) -> ! {
    let Some(program) = arguments.first() else {
        unsafe { libc::_exit(0) }
    };
    let resolved = if program.contains('/') {
        program.clone()
    } else {
        find_file_in_path(program, true)
    };
    if resolved.is_empty() {
        eprintln!("minish: {}: command not found", program);
        unsafe { libc::_exit(STATUS_NOT_FOUND) }
    }

    let argv: Result<Vec<CString>, _> = arguments
        .iter()
        .map(|argument| CString::new(argument.as_str()))
        .collect();
    let argv = match argv {
        Ok(argv) => argv,
        Err(e) => {
            eprintln!("minish: {}: {}", program, e);
            unsafe { libc::_exit(STATUS_EXEC_FAILED) }
        }
    };
    let path = match CString::new(resolved) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("minish: {}: {}", program, e);
            unsafe { libc::_exit(STATUS_EXEC_FAILED) }
        }
    };

    match unistd::execv(&path, &argv) {
        Ok(never) => match never {},
        Err(Errno::ENOENT) => {
            eprintln!("minish: {}: command not found", program);
            unsafe { libc::_exit(STATUS_NOT_FOUND) }
        }
        Err(e) => {
            eprintln!("minish: {}: {}", program, e);
            unsafe { libc::_exit(STATUS_EXEC_FAILED) }
        }
    }
}

fn builtin_cd(arguments: &[String]) -> i32 {
    let target = arguments.get(1).map(String::as_str).unwrap_or("~");
    let target = shellexpand::tilde(target);
    match env::set_current_dir(target.as_ref()) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("minish: cd: {}: {}", target, e);
            1
        }
    }
}
