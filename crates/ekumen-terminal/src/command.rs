//! Command line assembly.
//!
//! The PTY launches a single string under `<shell> -c`, not an argument
//! vector, so every token is quoted on its own and the quoted tokens are
//! joined with single spaces.  No token is ever trusted as already safe:
//! whitespace, quotes, `$`, backticks, `;` and newlines all stay inside the
//! token they came from.

use std::borrow::Cow;
use std::fmt;

/// An ordered argument vector destined for a shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    tokens: Vec<String>,
}

impl CommandLine {
    /// Start a command line with `program` as its first token.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            tokens: vec![program.into()],
        }
    }

    /// Append one argument.
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.tokens.push(arg.into());
        self
    }

    /// Append several arguments in order.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens.extend(args.into_iter().map(Into::into));
        self
    }

    /// The raw, unquoted tokens.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Quote every token and join them into one shell-safe string.
    ///
    /// Quoting is total: any input produces a string the shell splits back
    /// into exactly the original tokens.
    pub fn to_shell_string(&self) -> String {
        self.tokens
            .iter()
            .map(|t| quote(t))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

/// Quote a single token for a POSIX shell.
pub fn quote(token: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(token))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
