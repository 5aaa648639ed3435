use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Process environment handed to every command the shell launches.
///
/// The environment contains:
/// - `vars`: the variables visible to external commands (PATH is consulted for lookup).
/// - `current_dir`: the working directory children are started in.
///
/// It is captured once at startup; nothing in the shell mutates it afterwards, but tests
/// construct it directly to control PATH.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// Working directory for command execution and relative path resolution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Get the value of a variable captured in this environment.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override a variable for commands launched from now on.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
