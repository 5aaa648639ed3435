use crate::lexer::DEFAULT_MAX_ARGS;
use crate::transcript::DEFAULT_HISTORY_FILE;
use argh::FromArgs;
use std::path::PathBuf;
use std::time::Duration;

/// Prompt printed before every read.
pub const DEFAULT_PROMPT: &str = "prompt>";

/// Idle budget for the whole session, armed once at startup.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;

/// Longest accepted input line, terminator excluded.
pub const DEFAULT_MAX_LINE: usize = 80;

#[derive(FromArgs, Debug)]
/// Minimal interactive shell that keeps a transcript of everything typed.
pub struct Args {
    #[argh(option, default = "PathBuf::from(DEFAULT_HISTORY_FILE)")]
    /// file every input line is appended to (default: shell-history)
    pub history: PathBuf,

    #[argh(option, default = "DEFAULT_IDLE_TIMEOUT_SECS")]
    /// seconds before the session expires, counted from startup; 0 disables it (default: 30)
    pub timeout: u64,

    #[argh(option, default = "DEFAULT_MAX_ARGS")]
    /// maximum number of words per command line, command name included (default: 10)
    pub max_args: usize,

    #[argh(option, default = "DEFAULT_MAX_LINE")]
    /// maximum length of an input line in characters (default: 80)
    pub max_line: usize,

    #[argh(option)]
    /// tracing filter for diagnostics on stderr, e.g. "debug" (default: $RUST_LOG or "warn")
    pub log_level: Option<String>,
}

/// Settings the shell runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub prompt: String,
    pub history_path: PathBuf,
    /// `None` disables the idle alarm.
    pub idle_timeout: Option<Duration>,
    pub max_args: usize,
    pub max_line_len: usize,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_owned(),
            history_path: PathBuf::from(DEFAULT_HISTORY_FILE),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            max_args: DEFAULT_MAX_ARGS,
            max_line_len: DEFAULT_MAX_LINE,
        }
    }
}

impl TryFrom<Args> for ShellConfig {
    type Error = String;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.max_args == 0 {
            return Err("--max-args must be at least 1".to_owned());
        }
        if args.max_line == 0 {
            return Err("--max-line must be at least 1".to_owned());
        }
        Ok(Self {
            history_path: args.history,
            idle_timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
            max_args: args.max_args,
            max_line_len: args.max_line,
            ..Self::default()
        })
    }
}
