use crate::config::ShellConfig;
use crate::external::ExecError;
use crate::interpreter::{Flow, Interpreter};
use crate::io_adapters::{LineSource, ReadOutcome};
use crate::lexer;
use crate::transcript::Transcript;
use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, trace};

/// Why the prompt loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The `exit` builtin ran.
    Exit,
    /// The input stream ended.
    EndOfInput,
    /// Ctrl-C at the line editor.
    Interrupted,
}

/// The prompt → read → record → tokenize → dispatch loop.
///
/// The loop never exits the process itself: it reports why it stopped and the caller
/// hands that to the session controller, which owns finalization.
pub struct Shell {
    config: ShellConfig,
    transcript: Arc<Transcript>,
    interpreter: Interpreter,
    diagnostics: Box<dyn Write>,
}

impl Shell {
    pub fn new(config: ShellConfig, transcript: Arc<Transcript>, interpreter: Interpreter) -> Self {
        Self {
            config,
            transcript,
            interpreter,
            diagnostics: Box::new(io::stderr()),
        }
    }

    /// Send per-cycle error messages somewhere other than stderr.
    pub fn with_diagnostics(mut self, diagnostics: Box<dyn Write>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Prompt and dispatch until `exit`, end of input, or an interrupt.
    ///
    /// Errors are fatal to the shell: an unreadable input stream, or an
    /// [`ExecError::Resources`] from process creation.
    pub fn run(&mut self, input: &mut dyn LineSource) -> Result<LoopExit> {
        loop {
            let outcome = input
                .read_line(&self.config.prompt)
                .context("Error on taking user input")?;
            match outcome {
                ReadOutcome::Line(line) => {
                    if self.cycle(&line)? == Flow::Exit {
                        return Ok(LoopExit::Exit);
                    }
                }
                ReadOutcome::Eof => {
                    debug!("end of input");
                    return Ok(LoopExit::EndOfInput);
                }
                ReadOutcome::Interrupted => return Ok(LoopExit::Interrupted),
            }
        }
    }

    /// One prompt cycle for an already read line.
    ///
    /// The raw line is recorded before anything else looks at it. Recoverable failures
    /// are reported on the diagnostics stream and yield [`Flow::Continue`].
    pub fn cycle(&mut self, line: &str) -> Result<Flow> {
        if let Err(e) = self.transcript.record(line) {
            self.report(format_args!("Error on writing to history file: {e}"));
        }

        let line = line.trim_end_matches(['\n', '\r']);
        let length = line.chars().count();
        let limit = self.config.max_line_len;
        if length > limit {
            self.report(format_args!(
                "input too long: {length} characters, at most {limit} allowed"
            ));
            return Ok(Flow::Continue);
        }

        let tokens = match lexer::split_into_tokens(line, self.config.max_args) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.report(format_args!("{e}"));
                return Ok(Flow::Continue);
            }
        };
        trace!(?tokens, "tokenized");

        match self.interpreter.dispatch(&tokens) {
            Ok(flow) => Ok(flow),
            Err(e) if e.downcast_ref::<ExecError>().is_some_and(ExecError::is_fatal) => Err(e),
            Err(e) => {
                self.report(format_args!("Error with command: {e}"));
                Ok(Flow::Continue)
            }
        }
    }

    fn report(&mut self, message: std::fmt::Arguments<'_>) {
        debug!("{message}");
        // Nowhere left to report a failing diagnostics stream.
        let _ = writeln!(self.diagnostics, "{message}");
    }
}
