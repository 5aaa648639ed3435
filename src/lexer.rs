//! A module implementing lexical analysis (tokenization) for single shell command lines.
//!
//! A token is exactly a maximal run of non-whitespace characters. There is no quoting,
//! escaping or substitution: `echo "a b"` yields the tokens `echo`, `"a` and `b"`.

use thiserror::Error;

/// Default upper bound on the number of tokens (command name included) in one line.
pub const DEFAULT_MAX_ARGS: usize = 10;

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexingError {
    /// The line holds more tokens than the configured maximum.
    #[error("too many arguments: {count} given, at most {limit} allowed")]
    ArgumentOverflow { count: usize, limit: usize },
}

/// Splits `line` into whitespace-separated tokens.
///
/// Consecutive delimiters collapse, leading and trailing whitespace (including the
/// line terminator) is ignored, and an all-whitespace line yields an empty vector.
///
/// # Arguments
/// * `line` - The raw input line.
/// * `max_args` - Maximum number of tokens, command name included.
///
/// # Returns
/// `Result<Vec<String>, LexingError>`: the tokens in input order, or
/// [`LexingError::ArgumentOverflow`] when there are more than `max_args` of them.
pub fn split_into_tokens(line: &str, max_args: usize) -> Result<Vec<String>, LexingError> {
    let tokens: Vec<String> = line.split_whitespace().map(str::to_owned).collect();
    if tokens.len() > max_args {
        return Err(LexingError::ArgumentOverflow {
            count: tokens.len(),
            limit: max_args,
        });
    }
    Ok(tokens)
}
