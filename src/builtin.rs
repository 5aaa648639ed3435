use crate::command::{Action, CommandFactory, ExecutableCommand};
use crate::env::Environment;
use crate::interpreter::Factory;
use anyhow::Result;
use tracing::debug;

/// Built-in commands known to the shell at compile time.
///
/// Builtins are matched case-sensitively on the first token and executed in-process
/// without spawning a child. Their arguments are accepted and ignored.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "exit".
    fn name() -> &'static str;

    fn from_args(args: &[&str]) -> Self;

    fn execute(self, env: &mut Environment) -> Result<Action>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(self: Box<Self>, env: &mut Environment) -> Result<Action> {
        <T as BuiltinCommand>::execute(*self, env)
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(Box::new(T::from_args(args)))
        } else {
            None
        }
    }
}

/// Leave the shell with status 0.
pub struct Exit;

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn from_args(args: &[&str]) -> Self {
        if !args.is_empty() {
            debug!(?args, "exit ignores its arguments");
        }
        Exit
    }

    fn execute(self, _env: &mut Environment) -> Result<Action> {
        Ok(Action::Exit)
    }
}

/// Crash the shell with a fatal fault.
pub struct Explode;

impl BuiltinCommand for Explode {
    fn name() -> &'static str {
        "explode"
    }

    fn from_args(_args: &[&str]) -> Self {
        Explode
    }

    fn execute(self, _env: &mut Environment) -> Result<Action> {
        Ok(Action::Explode)
    }
}
