use log::{debug, error};
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitStatus as WS;
use nix::unistd::{self, ForkResult};

use super::launcher;
use crate::shell::jobs;
use crate::shell::parser::ast::{pipeline_end, Chain, Command, Connector};

/// Walks a command chain, dispatching one pipeline at a time and applying
/// the sequence/and/or/background semantics between them.
pub struct Scheduler {
    /// Whether to hand the terminal to foreground pipelines. Off when the
    /// shell has no terminal of its own, and inside background workers.
    interactive: bool,
}

impl Scheduler {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    pub fn run(&self, chain: &mut Chain) {
        let commands = &mut chain.commands;
        let mut cursor = 0;
        while cursor < commands.len() {
            // Cancellation is cooperative and checked only here, between
            // dispatches; an in-flight foreground pipeline is left to
            // finish on its own.
            if jobs::interrupted() {
                debug!("interrupted, abandoning rest of the chain");
                break;
            }
            cursor = if commands[cursor].background {
                self.detach_background_run(commands, cursor)
            } else {
                self.run_pipeline(commands, cursor)
            };
        }
    }

    /// Launch the pipeline starting at `cursor`, wait for it, and pick the
    /// next node from the connector on its last member.
    fn run_pipeline(&self, commands: &mut [Command], cursor: usize) -> usize {
        let end = pipeline_end(commands, cursor);
        match launcher::launch(&mut commands[cursor..=end]) {
            Ok(Some(pgid)) => {
                if self.interactive {
                    jobs::set_foreground(pgid);
                }
                self.wait_pipeline(&mut commands[cursor..=end]);
                if self.interactive {
                    // The terminal always comes back to the shell, even
                    // when the wait itself went wrong.
                    jobs::set_foreground(jobs::shell_pgid());
                }
            }
            // Nothing was forked: a builtin already ran in this process and
            // left its status on the node.
            Ok(None) => {}
            Err(e) => {
                error!("minish: launch failed: {}", e);
                eprintln!("minish: {}", e);
                commands[end].status = Some(1);
            }
        }
        evaluate_connector(commands, end)
    }

    /// Collect every member's exit status. The pipeline's overall status is
    /// the last member's, whatever happened upstream.
    fn wait_pipeline(&self, commands: &mut [Command]) {
        for command in commands.iter_mut() {
            // Builtins and failed forks have no process to wait on.
            let Some(pid) = command.pid else { continue };
            match waitpid(pid, None) {
                Ok(WS::Exited(_, status)) => command.status = Some(status),
                Ok(WS::Signaled(_, signal, _)) => command.status = Some(128 + signal as i32),
                Ok(ws) => {
                    debug!("unexpected wait status for {}: {:?}", pid, ws);
                    command.status = Some(0);
                }
                Err(e) => {
                    // Report and keep walking; never spin on a failed wait.
                    error!("minish: waitpid({}): {}", pid, e);
                    command.status = Some(1);
                }
            }
        }
    }

    /// Hand the whole background run off to one detached worker process
    /// that schedules it privately, and advance past the `&` boundary
    /// without waiting. The worker inherits descriptors and working
    /// directory but shares no further state with the shell.
    fn detach_background_run(&self, commands: &mut [Command], cursor: usize) -> usize {
        let end = background_end(commands, cursor);
        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let worker = Scheduler::new(false);
                let mut inner = cursor;
                while inner <= end && !jobs::interrupted() {
                    inner = worker.run_pipeline(commands, inner);
                }
                unsafe { libc::_exit(0) }
            }
            Ok(ForkResult::Parent { child }) => {
                debug!("detached background job {} (nodes {}..={})", child, cursor, end);
            }
            Err(e) => {
                error!("minish: fork: {}", e);
                eprintln!("minish: fork: {}", e);
            }
        }
        end + 1
    }
}

/// Last node of the background run starting at `start`: everything up to
/// and including the node that carries the `&` connector.
fn background_end(commands: &[Command], start: usize) -> usize {
    let mut i = start;
    while i + 1 < commands.len() && commands[i].connector != Connector::Background {
        i += 1;
    }
    i
}

/// Read the connector on the just-finished pipeline's last node and decide
/// where the cursor goes next. Short-circuited `&&`/`||` operands get the
/// controlling status copied onto their last node, and evaluation resumes
/// from the node after them.
fn evaluate_connector(commands: &mut [Command], mut cursor: usize) -> usize {
    loop {
        let status = commands[cursor].status.unwrap_or(0);
        let skip = match commands[cursor].connector {
            Connector::End => return commands.len(),
            Connector::Sequence | Connector::Background | Connector::Pipe => return cursor + 1,
            Connector::And => status != 0,
            Connector::Or => status == 0,
        };
        if cursor + 1 >= commands.len() {
            return commands.len();
        }
        if !skip {
            return cursor + 1;
        }
        // The skipped operand is a whole pipeline, not just one node.
        let skipped_end = pipeline_end(commands, cursor + 1);
        commands[skipped_end].status = Some(status);
        cursor = skipped_end;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::Parser;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Forked children, waits and the interrupt flag are process-global;
    // run these tests one at a time.
    use crate::shell::jobs::TEST_LOCK as RUN_LOCK;
    static TEMP_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn run_line(line: &str) -> Chain {
        let mut chain = Parser::new(line).parse_chain().unwrap();
        Scheduler::new(false).run(&mut chain);
        chain
    }

    fn last_status(chain: &Chain) -> i32 {
        chain.commands.last().unwrap().status.unwrap()
    }

    fn temp_path(tag: &str) -> PathBuf {
        let seq = TEMP_SEQ.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("minish_{}_{}_{}", tag, std::process::id(), seq))
    }

    #[test]
    fn test_single_command_status() {
        let _guard = RUN_LOCK.lock().unwrap();
        assert_eq!(last_status(&run_line("true")), 0);
        assert_eq!(last_status(&run_line("false")), 1);
    }

    #[test]
    fn test_command_not_found_status() {
        let _guard = RUN_LOCK.lock().unwrap();
        assert_eq!(last_status(&run_line("minish-no-such-command")), 127);
    }

    #[test]
    fn test_pipeline_status_is_last_members() {
        let _guard = RUN_LOCK.lock().unwrap();
        let chain = run_line("false | true");
        assert_eq!(last_status(&chain), 0);
        // one process per member
        assert!(chain.commands.iter().all(|c| c.pid.is_some()));

        assert_eq!(last_status(&run_line("true | false")), 1);
    }

    #[test]
    fn test_pipeline_moves_data_between_stages() {
        let _guard = RUN_LOCK.lock().unwrap();
        let out = temp_path("pipe");
        run_line(&format!("echo hello | cat | cat > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        let _ = fs::remove_file(&out);
    }

    #[test]
    fn test_no_descriptor_leak_after_pipeline() {
        let _guard = RUN_LOCK.lock().unwrap();
        let open_fds = || fs::read_dir("/proc/self/fd").unwrap().count();
        let before = open_fds();
        run_line("true | true | true");
        assert_eq!(open_fds(), before);
    }

    #[test]
    fn test_and_runs_second_only_on_success() {
        let _guard = RUN_LOCK.lock().unwrap();
        let out = temp_path("and");
        run_line(&format!("true && echo yes > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "yes\n");
        let _ = fs::remove_file(&out);

        let chain = run_line(&format!("false && echo yes > {}", out.display()));
        assert!(!out.exists());
        // the skipped node carries the controlling status
        assert_eq!(last_status(&chain), 1);
    }

    #[test]
    fn test_or_runs_second_only_on_failure() {
        let _guard = RUN_LOCK.lock().unwrap();
        let out = temp_path("or");
        run_line(&format!("false || echo yes > {}", out.display()));
        assert_eq!(fs::read_to_string(&out).unwrap(), "yes\n");
        let _ = fs::remove_file(&out);

        let chain = run_line(&format!("true || echo yes > {}", out.display()));
        assert!(!out.exists());
        assert_eq!(last_status(&chain), 0);
    }

    #[test]
    fn test_skip_covers_whole_pipeline() {
        let _guard = RUN_LOCK.lock().unwrap();
        let skipped = temp_path("skipped");
        let after = temp_path("after");
        run_line(&format!(
            "false && echo no | cat > {} ; echo yes > {}",
            skipped.display(),
            after.display()
        ));
        assert!(!skipped.exists());
        assert_eq!(fs::read_to_string(&after).unwrap(), "yes\n");
        let _ = fs::remove_file(&after);
    }

    #[test]
    fn test_sequence_runs_both() {
        let _guard = RUN_LOCK.lock().unwrap();
        let first = temp_path("seq1");
        let second = temp_path("seq2");
        run_line(&format!(
            "echo a > {} ; echo b > {}",
            first.display(),
            second.display()
        ));
        assert_eq!(fs::read_to_string(&first).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(&second).unwrap(), "b\n");
        let _ = fs::remove_file(&first);
        let _ = fs::remove_file(&second);
    }

    #[test]
    fn test_redirection_round_trip() {
        let _guard = RUN_LOCK.lock().unwrap();
        let data = temp_path("data");
        let copy = temp_path("copy");
        run_line(&format!("echo payload > {}", data.display()));
        run_line(&format!("cat < {} > {}", data.display(), copy.display()));
        assert_eq!(fs::read_to_string(&copy).unwrap(), "payload\n");
        let _ = fs::remove_file(&data);
        let _ = fs::remove_file(&copy);
    }

    #[test]
    fn test_last_output_redirection_wins() {
        let _guard = RUN_LOCK.lock().unwrap();
        let first = temp_path("red1");
        let second = temp_path("red2");
        run_line(&format!(
            "echo hi > {} > {}",
            first.display(),
            second.display()
        ));
        assert_eq!(fs::read_to_string(&second).unwrap(), "hi\n");
        // applied then overridden, so it exists but stays empty
        assert_eq!(fs::read_to_string(&first).unwrap(), "");
        let _ = fs::remove_file(&first);
        let _ = fs::remove_file(&second);
    }

    #[test]
    fn test_error_output_redirection() {
        let _guard = RUN_LOCK.lock().unwrap();
        let err = temp_path("stderr");
        run_line(&format!(r#"sh -c "echo oops >&2" 2> {}"#, err.display()));
        assert_eq!(fs::read_to_string(&err).unwrap(), "oops\n");
        let _ = fs::remove_file(&err);
    }

    #[test]
    fn test_unopenable_redirection_fails_command_only() {
        let _guard = RUN_LOCK.lock().unwrap();
        let chain = run_line("echo hi > /no-such-dir-minish/file ; true");
        assert_eq!(chain.commands[0].status, Some(1));
        assert_eq!(last_status(&chain), 0);
    }

    #[test]
    fn test_cd_changes_shell_directory_without_forking() {
        let _guard = RUN_LOCK.lock().unwrap();
        let home = std::env::current_dir().unwrap();
        let chain = run_line("cd /");
        assert_eq!(chain.commands[0].status, Some(0));
        assert!(chain.commands[0].pid.is_none());
        assert_eq!(std::env::current_dir().unwrap(), PathBuf::from("/"));

        let chain = run_line("cd /no-such-dir-minish");
        assert_eq!(chain.commands[0].status, Some(1));
        assert_eq!(std::env::current_dir().unwrap(), PathBuf::from("/"));

        std::env::set_current_dir(&home).unwrap();
    }

    #[test]
    fn test_background_job_does_not_block_scheduling() {
        let _guard = RUN_LOCK.lock().unwrap();
        let out = temp_path("bg");
        let next = temp_path("bg_next");
        run_line(&format!(
            "echo done > {} & echo next > {}",
            out.display(),
            next.display()
        ));
        // the node after the `&` boundary runs in the parent right away
        assert_eq!(fs::read_to_string(&next).unwrap(), "next\n");

        // the detached worker finishes on its own schedule
        let mut contents = String::new();
        for _ in 0..100 {
            if let Ok(read) = fs::read_to_string(&out) {
                if !read.is_empty() {
                    contents = read;
                    break;
                }
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(contents, "done\n");
        jobs::reap_background();
        let _ = fs::remove_file(&out);
        let _ = fs::remove_file(&next);
    }

    #[test]
    fn test_interruption_stops_before_next_dispatch() {
        let _guard = RUN_LOCK.lock().unwrap();
        jobs::install().unwrap();
        jobs::clear_interrupt();

        let first = temp_path("int1");
        let second = temp_path("int2");
        // the first command interrupts the shell, then lingers long enough
        // for the flag to be set before its wait completes
        run_line(&format!(
            r#"sh -c "echo first > {}; kill -INT {}; sleep 1" ; echo second > {}"#,
            first.display(),
            std::process::id(),
            second.display()
        ));
        assert!(jobs::interrupted());
        assert_eq!(fs::read_to_string(&first).unwrap(), "first\n");
        assert!(!second.exists());

        jobs::clear_interrupt();
        let _ = fs::remove_file(&first);
    }
}
