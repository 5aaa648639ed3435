use crate::command::{Action, CommandFactory};
use crate::env::Environment;
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only support commands defined in this crate: builtins and ExternalCommand.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Capability to bring the process down with a fatal fault.
///
/// The production implementation aborts, which the session controller observes exactly
/// like a memory fault. Ordinary error handling never sees it.
pub trait FaultInjector {
    fn explode(&self) -> !;
}

/// Raises SIGABRT through [`std::process::abort`].
pub struct AbortFault;

impl FaultInjector for AbortFault {
    fn explode(&self) -> ! {
        std::process::abort()
    }
}

/// What the shell loop does after a line has been dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Prompt for the next line.
    Continue,
    /// Finalize the transcript and leave with status 0.
    Exit,
}

/// Command dispatcher: routes a token vector to a builtin or an external program.
///
/// The interpreter maintains an [`Environment`] and a list of [`CommandFactory`] objects
/// that are queried in order to create commands by name. See [`Default`] for the
/// factories included out of the box.
///
/// Example
/// ```
/// use promptsh::{Flow, Interpreter};
/// let mut sh = Interpreter::default();
/// assert_eq!(sh.dispatch(&[]).unwrap(), Flow::Continue);
/// assert_eq!(sh.dispatch(&["exit".to_string()]).unwrap(), Flow::Exit);
/// ```
pub struct Interpreter {
    env: Environment,
    commands: Vec<Box<dyn CommandFactory>>,
    fault: Box<dyn FaultInjector>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of command factories.
    pub fn new(commands: Vec<Box<dyn CommandFactory>>, fault: Box<dyn FaultInjector>) -> Self {
        Self {
            env: Environment::new(),
            commands,
            fault,
        }
    }

    /// Replace the fault injector used by `explode`.
    pub fn with_fault_injector(mut self, fault: Box<dyn FaultInjector>) -> Self {
        self.fault = fault;
        self
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Dispatch one tokenized line.
    ///
    /// An empty vector is a no-op. Errors are the command's own failures (for external
    /// commands an [`ExecError`](crate::ExecError)); the caller decides which are fatal.
    pub fn dispatch(&mut self, tokens: &[String]) -> anyhow::Result<Flow> {
        let Some((name, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        match self.run(name, &args)? {
            Action::Completed(code) => {
                debug!(command = %name, code, "command completed");
                Ok(Flow::Continue)
            }
            Action::Exit => Ok(Flow::Exit),
            Action::Explode => {
                debug!("fault injection requested");
                self.fault.explode()
            }
        }
    }

    /// Run a single command invocation by name with arguments.
    ///
    /// Returns the action the command asks for, or an error if it cannot be created
    /// or fails to execute.
    pub fn run(&mut self, name: &str, args: &[&str]) -> anyhow::Result<Action> {
        for factory in &self.commands {
            if let Some(cmd) = factory.try_create(&self.env, name, args) {
                return cmd.execute(&mut self.env);
            }
        }
        Err(anyhow::anyhow!("command not found: {}", name))
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default set of commands:
    /// - built-ins: `exit`, `explode`
    /// - external command launcher
    fn default() -> Self {
        use crate::builtin::*;
        use crate::external::ExternalCommand;
        Self::new(
            vec![
                Box::new(Factory::<Exit>::default()),
                Box::new(Factory::<Explode>::default()),
                Box::new(Factory::<ExternalCommand>::default()),
            ],
            Box::new(AbortFault),
        )
    }
}
