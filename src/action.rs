use std::fmt;
use std::str::FromStr;

/// Exit status reserved for an unrecognized action.
pub const USAGE_EXIT_CODE: i32 = 33;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("unknown action `{0}` (expected one of: all, binutils, deps, kernel, llvm, compress, release)")]
    UnknownAction(String),

    #[error("only one action may be given, got: {0}")]
    TooManyActions(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    All,
    Binutils,
    Deps,
    Kernel,
    Llvm,
    Compress,
    Release,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::All,
        Action::Binutils,
        Action::Deps,
        Action::Kernel,
        Action::Llvm,
        Action::Compress,
        Action::Release,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::All => "all",
            Action::Binutils => "binutils",
            Action::Deps => "deps",
            Action::Kernel => "kernel",
            Action::Llvm => "llvm",
            Action::Compress => "compress",
            Action::Release => "release",
        }
    }

    /// Resolves the positional tokens into one action. No tokens selects
    /// [`Action::All`].
    pub fn parse_args<S: AsRef<str>>(tokens: &[S]) -> Result<Action, UsageError> {
        let Some(first) = tokens.first() else {
            return Ok(Action::default());
        };

        let action = first.as_ref().parse::<Action>()?;

        if tokens.len() > 1 {
            let given = tokens
                .iter()
                .map(|t| t.as_ref())
                .collect::<Vec<&str>>()
                .join(" ");

            return Err(UsageError::TooManyActions(given));
        }

        Ok(action)
    }
}

impl FromStr for Action {
    type Err = UsageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| UsageError::UnknownAction(value.to_string()))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
