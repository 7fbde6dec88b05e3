//! Command Policy - validates terminal command lines before anything is spawned
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. length cap (characters)
//! 2. shell operators on the raw line (`&&`, `||`, `|`, `;`, `>`, `<`,
//!    backtick, `$(`, newline)
//! 3. POSIX shell-word tokenization, no expansion
//! 4. at least one token
//! 5. first token in the whitelist (exact, case-sensitive)
//! 6. Windows built-ins only: no `cmd.exe` metacharacters (`&`, `^`, `%`,
//!    `(`, `)`, `!`), since the raw line is handed to `cmd /c`
//!
//! ## Example
//! ```rust,ignore
//! let policy = CommandPolicy::new(["echo", "ls"], 2000);
//!
//! let cmd = policy.validate("echo 'hello world'")?;
//! assert_eq!(cmd.argv(), vec!["echo", "hello world"]);
//!
//! policy.validate("echo hi && rm -rf /").unwrap_err(); // UnsupportedOperator
//! ```

use desk_foundation::{DeskConfig, Error, Rejection, Result};
use std::collections::HashSet;
use tracing::warn;

/// Sequences refused anywhere in the raw line
const OPERATORS: &[&str] = &["&&", "||", "|", ";", ">", "<", "`", "$(", "\n", "\r"];

/// Characters `cmd.exe` interprets itself: command separator, escape,
/// variable expansion (`%` and delayed `!`), grouping
const CMD_METACHARACTERS: &[char] = &['&', '^', '%', '(', ')', '!'];

/// `cmd.exe` built-ins: no executable exists, they only run through `cmd /c`
const CMD_BUILTINS: &[&str] = &[
    "assoc", "cd", "chdir", "cls", "copy", "date", "del", "dir", "echo", "erase", "md", "mkdir",
    "mklink", "move", "path", "popd", "pushd", "rd", "ren", "rename", "rmdir", "set", "start",
    "time", "title", "type", "ver", "vol",
];

/// Target platform rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// How an approved command gets executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// exec the tokens directly, no shell involved
    Direct(Vec<String>),

    /// `cmd /c <raw>` for Windows built-ins
    ShellBuiltin(String),
}

/// A command line that passed every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    /// Original line, trimmed
    pub raw: String,

    /// Shell-word tokens
    pub tokens: Vec<String>,

    pub invocation: Invocation,
}

impl ValidatedCommand {
    /// Program name (first token)
    pub fn program(&self) -> &str {
        &self.tokens[0]
    }

    /// Full argument vector to spawn
    pub fn argv(&self) -> Vec<String> {
        match &self.invocation {
            Invocation::Direct(tokens) => tokens.clone(),
            Invocation::ShellBuiltin(raw) => vec!["cmd".to_string(), "/c".to_string(), raw.clone()],
        }
    }
}

/// Whitelist-based command validator
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    /// Permitted first tokens
    whitelist: HashSet<String>,

    /// Maximum line length in characters
    max_length: usize,

    platform: Platform,
}

impl CommandPolicy {
    pub fn new<I, S>(whitelist: I, max_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            whitelist: whitelist.into_iter().map(Into::into).collect(),
            max_length,
            platform: Platform::current(),
        }
    }

    pub fn from_config(config: &DeskConfig) -> Self {
        Self::new(
            config.terminal_whitelist.iter().cloned(),
            config.max_command_length,
        )
    }

    /// Apply another platform's rules (tests, cross-platform checks)
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn is_whitelisted(&self, program: &str) -> bool {
        self.whitelist.contains(program)
    }

    /// Whitelisted programs, sorted
    pub fn whitelist(&self) -> Vec<&str> {
        let mut programs: Vec<&str> = self.whitelist.iter().map(String::as_str).collect();
        programs.sort_unstable();
        programs
    }

    /// Validate a raw command line
    pub fn validate(&self, raw: &str) -> Result<ValidatedCommand> {
        if raw.chars().count() > self.max_length {
            return Err(self.reject(raw, Rejection::TooLong));
        }

        if OPERATORS.iter().any(|op| raw.contains(op)) {
            return Err(self.reject(raw, Rejection::UnsupportedOperator));
        }

        let trimmed = raw.trim();
        let tokens = shlex::split(trimmed).ok_or_else(|| self.reject(raw, Rejection::Unparseable))?;

        let Some(program) = tokens.first() else {
            return Err(Error::rejected(Rejection::Empty));
        };

        if !self.is_whitelisted(program) {
            return Err(self.reject(raw, Rejection::NotPermitted));
        }

        let invocation = if self.platform == Platform::Windows && is_cmd_builtin(program) {
            if trimmed.contains(CMD_METACHARACTERS) {
                return Err(self.reject(raw, Rejection::UnsupportedOperator));
            }
            Invocation::ShellBuiltin(trimmed.to_string())
        } else {
            Invocation::Direct(tokens.clone())
        };

        Ok(ValidatedCommand {
            raw: trimmed.to_string(),
            tokens,
            invocation,
        })
    }

    fn reject(&self, raw: &str, reason: Rejection) -> Error {
        let preview: String = raw.chars().take(80).collect();
        warn!("Command rejected ({}): '{}'", reason, preview.escape_debug());
        Error::rejected(reason)
    }
}

fn is_cmd_builtin(program: &str) -> bool {
    let lower = program.to_ascii_lowercase();
    CMD_BUILTINS.contains(&lower.as_str())
}
