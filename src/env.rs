use crate::ExitCode;
use std::env as stdenv;
use std::path::PathBuf;

/// Mutable, user-level view of the shell session.
///
/// - `current_dir`: the working directory, kept in sync with the process by `cd`.
/// - `should_exit`: set by `exit`; the read loop checks it after every line.
/// - `last_status`: status of the most recent line, used as the shell's own exit code.
#[derive(Debug, Clone)]
pub struct Environment {
    pub current_dir: PathBuf,
    pub should_exit: bool,
    pub last_status: ExitCode,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            current_dir,
            should_exit: false,
            last_status: 0,
        }
    }

    /// Ask the read loop to stop after the current line.
    pub fn request_exit(&mut self, status: ExitCode) {
        self.should_exit = true;
        self.last_status = status;
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
