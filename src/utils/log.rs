use crate::utils::config::Config;
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File};
use std::io::Write;
use std::process;

pub fn init_logger(config: &Config) {
    let level = match &config.logger_level {
        level if level.eq_ignore_ascii_case("error") => LevelFilter::Error,
        level if level.eq_ignore_ascii_case("warn") => LevelFilter::Warn,
        level if level.eq_ignore_ascii_case("info") => LevelFilter::Info,
        level if level.eq_ignore_ascii_case("debug") => LevelFilter::Debug,
        level if level.eq_ignore_ascii_case("trace") => LevelFilter::Trace,
        _ => LevelFilter::Warn,
    };

    let mut builder = Builder::new();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[PID:{}][{}] {} - {}",
            process::id(),
            record.level(),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.args()
        )
    });

    // Command output must stay clean, so logs go to a per-day file when the
    // log directory is usable; otherwise they fall back to stderr.
    if fs::create_dir_all(&config.logger_dir).is_ok() {
        let date = Local::now().format("%Y-%m-%d");
        let log_file = config.logger_dir.join(format!("{}_{}.log", config.name, date));
        if let Ok(file) = File::create(log_file) {
            builder.target(Target::Pipe(Box::new(file)));
        }
    }

    builder
        .filter(Some(&config.name), level)
        .filter(None, LevelFilter::Warn)
        .init();

    log::debug!("log level set to {}", level);
}
