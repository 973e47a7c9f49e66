use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Write};

use colored::Colorize;
use log::{debug, error, warn};

use crate::shell::executor::Scheduler;
use crate::shell::jobs;
use crate::shell::parser::Parser;
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::utils::config::Config;
use crate::utils::path;

pub struct Shell<'a> {
    config: &'a Config,
    scheduler: Scheduler,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Self {
        // Terminal handoff only makes sense when the shell actually owns a
        // terminal and is prompting on it.
        let interactive =
            config.script.is_none() && !config.quiet && io::stdin().is_terminal();
        Self {
            config,
            scheduler: Scheduler::new(interactive),
        }
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        if let Some(script) = self.config.script.clone() {
            debug!("reading commands from {}", script.display());
            let file = File::open(&script)?;
            self.run_reader(BufReader::new(file))
        } else if self.config.quiet || !io::stdin().is_terminal() {
            let stdin = io::stdin();
            self.run_reader(stdin.lock())
        } else {
            self.run_interactive()
        }
    }

    fn run_reader<R: BufRead>(&mut self, reader: R) -> Result<(), Box<dyn Error>> {
        for line in reader.lines() {
            let line = line?;
            if self.handle_input(&line) {
                break;
            }
        }
        Ok(())
    }

    fn run_interactive(&mut self) -> Result<(), Box<dyn Error>> {
        let mut readline = ReadlineManager::new(self.config)?;
        readline.load_history();
        debug!("minish ready");

        loop {
            io::stdout().flush()?;
            match readline.readline(&self.prompt()) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Err(err) = readline.add_history(line.clone()) {
                        warn!("could not record history entry: {}", err);
                    }
                    if self.handle_input(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Eof) => {
                    debug!("EOF, leaving minish");
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C at the prompt just starts a fresh line.
                    continue;
                }
                Err(err) => {
                    error!("readline error: {}", err);
                    eprintln!("minish: {}", err);
                    break;
                }
            }
        }

        readline.save_history();
        Ok(())
    }

    fn prompt(&self) -> String {
        let cwd = path::current_dir();
        format!(
            "{} {}$ ",
            format!("{}[{}]", self.config.name, std::process::id())
                .green()
                .bold(),
            path::basename(&cwd).cyan()
        )
    }

    /// Run one input line. Returns true when the line asked the shell to
    /// exit.
    fn handle_input(&mut self, line: &str) -> bool {
        if line.trim() == "exit" {
            debug!("exit requested");
            return true;
        }

        // One interruption window per line, and a good idle point to
        // collect whatever background jobs have finished since.
        jobs::clear_interrupt();
        jobs::reap_background();

        match Parser::new(line).parse_chain() {
            Ok(chain) if chain.is_empty() => {}
            Ok(mut chain) => {
                debug!("running: {}", line.trim());
                self.scheduler.run(&mut chain);
            }
            Err(err) => eprintln!("minish: {}", err),
        }
        false
    }
}
