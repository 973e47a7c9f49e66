mod executor;
pub mod jobs;
mod parser;
mod readline;
mod shell;

pub use shell::Shell;
