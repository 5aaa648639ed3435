use crate::env::Environment;
use anyhow::Result;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// What a command asks of the shell once it has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The command ran to completion with the given status; keep prompting.
    Completed(ExitCode),
    /// Leave the shell normally.
    Exit,
    /// Raise a fatal fault on purpose, to exercise the fault handling.
    Explode,
}

/// Object-safe trait for any command that can be executed by the shell.
///
/// Implemented by built-ins through a blanket impl and by external commands.
pub trait ExecutableCommand {
    fn execute(self: Box<Self>, env: &mut Environment) -> Result<Action>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
