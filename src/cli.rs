//! Shared CLI surface for the experiment binaries.
//!
//! Every placement experiment takes one optional positional mode argument.
//! Unrecognized modes print the usage line to stdout and the binary exits
//! with status 1; no argument means `--all`.

/// Thread-placement mode shared by the dual-thread experiments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single-thread baseline.
    Single,
    /// Both threads on SMT siblings of one physical core.
    SameCore,
    /// Threads on two different physical cores.
    DiffCore,
    /// Run every mode in sequence.
    All,
}

impl Mode {
    pub fn parse(arg: &str) -> Option<Mode> {
        match arg {
            "--single" => Some(Mode::Single),
            "--same-core" => Some(Mode::SameCore),
            "--diff-core" => Some(Mode::DiffCore),
            "--all" => Some(Mode::All),
            _ => None,
        }
    }

    /// Parse the first positional argument, defaulting to `--all`.
    /// `Err` carries the unrecognized argument for the usage message.
    pub fn from_args() -> Result<Mode, String> {
        match std::env::args().nth(1) {
            None => Ok(Mode::All),
            Some(arg) => Mode::parse(&arg).ok_or(arg),
        }
    }

    pub const USAGE: &'static str = "[--single | --same-core | --diff-core | --all]";
}
