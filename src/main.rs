use log::debug;

mod shell;
mod utils;

use crate::shell::{jobs, Shell};
use crate::utils::config::Config;
use crate::utils::log::init_logger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    init_logger(&config);
    debug!("configuration loaded from {}", config.config_dir.display());

    // Signal handlers and terminal ownership must be in place before the
    // first pipeline runs.
    jobs::install()?;

    let mut shell = Shell::new(&config);
    shell.run()
}
