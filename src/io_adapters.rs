//! Line sources the shell loop reads from, and an in-memory writer for diagnostics.

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Result as IoResult, Write};
use std::rc::Rc;
use tracing::debug;

/// Result of asking for one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A line, possibly still carrying its terminator.
    Line(String),
    /// The input stream is exhausted.
    Eof,
    /// The user pressed Ctrl-C while the line editor owned the terminal.
    Interrupted,
}

/// Anything that can print a prompt and hand back one line.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> IoResult<ReadOutcome>;
}

/// Interactive source backed by `rustyline`, used when stdin is a terminal.
///
/// Non-blank lines are added to the editor's in-memory recall history.
pub struct EditorInput {
    editor: DefaultEditor,
}

impl EditorInput {
    pub fn new() -> rustyline::Result<Self> {
        Ok(Self {
            editor: DefaultEditor::new()?,
        })
    }
}

impl LineSource for EditorInput {
    fn read_line(&mut self, prompt: &str) -> IoResult<ReadOutcome> {
        match self.editor.readline(prompt) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        debug!("recall history rejected entry: {e}");
                    }
                }
                Ok(ReadOutcome::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(ReadOutcome::Interrupted),
            Err(ReadlineError::Eof) => Ok(ReadOutcome::Eof),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e)),
        }
    }
}

/// Source reading from any buffered stream, printing the prompt to `writer` first.
///
/// Invalid UTF-8 is replaced rather than rejected.
pub struct StreamInput<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> StreamInput<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl StreamInput<io::StdinLock<'static>, io::Stdout> {
    /// Non-interactive stdin (pipe or file), prompt on stdout.
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> LineSource for StreamInput<R, W> {
    fn read_line(&mut self, prompt: &str) -> IoResult<ReadOutcome> {
        self.writer.write_all(prompt.as_bytes())?;
        self.writer.flush()?;

        let mut buf = Vec::new();
        if self.reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(ReadOutcome::Eof);
        }
        Ok(ReadOutcome::Line(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Scripted source for tests: yields the queued outcomes, then end of input.
pub struct ScriptedInput {
    outcomes: VecDeque<ReadOutcome>,
    prompts: usize,
}

impl ScriptedInput {
    pub fn new(outcomes: impl IntoIterator<Item = ReadOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
            prompts: 0,
        }
    }

    /// Queue each string as one line.
    pub fn lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|l| ReadOutcome::Line(l.to_owned())))
    }

    /// How many times a prompt was shown.
    pub fn prompts(&self) -> usize {
        self.prompts
    }
}

impl LineSource for ScriptedInput {
    fn read_line(&mut self, _prompt: &str) -> IoResult<ReadOutcome> {
        self.prompts += 1;
        Ok(self.outcomes.pop_front().unwrap_or(ReadOutcome::Eof))
    }
}

/// Memory-backed writer for capturing diagnostics.
#[derive(Clone, Default)]
pub struct MemWriter {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_stream_input_prints_prompt_and_reads_lines() {
        let out = MemWriter::new();
        let mut input = StreamInput::new(Cursor::new(b"ls -la\npwd".to_vec()), out.clone());

        assert_eq!(
            input.read_line("prompt>").unwrap(),
            ReadOutcome::Line("ls -la\n".into())
        );
        assert_eq!(
            input.read_line("prompt>").unwrap(),
            ReadOutcome::Line("pwd".into())
        );
        assert_eq!(input.read_line("prompt>").unwrap(), ReadOutcome::Eof);
        assert_eq!(out.contents(), "prompt>prompt>prompt>");
    }

    #[test]
    fn test_stream_input_replaces_invalid_utf8() {
        let mut input = StreamInput::new(Cursor::new(b"echo \xff\n".to_vec()), io::sink());
        assert_eq!(
            input.read_line("").unwrap(),
            ReadOutcome::Line("echo \u{fffd}\n".into())
        );
    }

    #[test]
    fn test_scripted_input_ends_with_eof() {
        let mut input = ScriptedInput::new([ReadOutcome::Interrupted]);
        assert_eq!(input.read_line("").unwrap(), ReadOutcome::Interrupted);
        assert_eq!(input.read_line("").unwrap(), ReadOutcome::Eof);
        assert_eq!(input.prompts(), 2);
    }

    #[test]
    fn test_mem_writer_clones_share_buffer() {
        let writer = MemWriter::new();
        let mut other = writer.clone();
        write!(other, "hello").unwrap();
        assert_eq!(writer.contents(), "hello");
    }
}
