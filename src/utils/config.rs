use dotenv::dotenv;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::path::PathBuf;

pub struct Config {
    pub name: String,
    pub config_dir: PathBuf,
    pub history_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    /// `-q`: print no prompt, read lines straight from stdin.
    pub quiet: bool,
    /// Optional script file to read commands from instead of stdin.
    pub script: Option<PathBuf>,
}

impl Config {
    fn get_config_dir() -> PathBuf {
        if let Ok(home) = env::var("HOME") {
            PathBuf::from(home).join(".config/minish")
        } else {
            PathBuf::from("/tmp/minish")
        }
    }

    fn default() -> Self {
        let config_dir = Self::get_config_dir();
        Config {
            name: String::from("minish"),
            history_file: config_dir.join("history"),
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            logger_dir: config_dir.join("logs"),
            config_dir,
            quiet: false,
            script: None,
        }
    }

    pub fn new() -> Self {
        if cfg!(debug_assertions) {
            dotenv::from_filename(".env.development").ok();
        } else {
            dotenv().ok();
        }

        let mut config = Config::default();

        if let Ok(level) = env::var("MINISH_LOG") {
            config.logger_level = level;
        }
        if let Ok(dir) = env::var("MINISH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }
        if let Ok(editor) = env::var("MINISH_EDITOR") {
            config.editor_mode = editor;
        }
        if let Ok(history) = env::var("MINISH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }

        // Command line surface: [-q] [script-file]
        for arg in env::args().skip(1) {
            if arg == "-q" {
                config.quiet = true;
            } else if config.script.is_none() {
                config.script = Some(PathBuf::from(arg));
            }
        }

        if let Some(parent) = config.history_file.parent() {
            let _ = fs::create_dir_all(parent);
        }

        config
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
