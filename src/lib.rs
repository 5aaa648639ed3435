//! A tiny interactive shell core with a persistent input transcript.
//!
//! Each prompt cycle reads one line, appends it to the transcript, splits it on
//! whitespace and either runs a builtin (`exit`, `explode`) or launches an external
//! program and waits for it. The [`Session`] controller turns a user interrupt, the
//! idle timeout or a fatal fault into an orderly exit that closes the transcript
//! exactly once.
//!
//! The main pieces are [`Shell`] (the loop), [`Interpreter`] (the dispatcher with its
//! pluggable factories), [`Transcript`] and [`Session`]. The public modules [`command`]
//! and [`env`] expose the traits and types for implementing further commands.

mod builtin;
pub mod command;
pub mod config;
pub mod env;
mod external;
mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod session;
mod shell;
pub mod transcript;

pub use config::ShellConfig;
pub use external::{ExecError, ExitOutcome, ExternalCommand, find_command_path};
pub use interpreter::{AbortFault, FaultInjector, Flow, Interpreter};
pub use session::{Session, SessionError, TerminationEvent};
pub use shell::{LoopExit, Shell};
pub use transcript::{Transcript, TranscriptError};
