//! Operating-mode selection.
//!
//! The launcher has exactly four top-level behaviours. The mode is picked
//! once, from the raw argument list, before anything touches the filesystem.
//! Parsing is deliberately lenient: the first recognised flag wins and
//! anything unrecognised is ignored (host applications sometimes append their
//! own arguments to MCP server commands).

/// One of the four mutually exclusive top-level behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Print usage to stdout and exit 0. No side effects.
    Help,
    /// Print the declared package version to stdout and exit 0. No side effects.
    Version,
    /// Provision, then run a short import probe of the worker.
    Test,
    /// Provision, then launch the long-lived worker (default).
    #[default]
    Run,
}

impl OperatingMode {
    /// Pick the mode from arguments (program name already stripped).
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .find_map(|arg| Self::from_flag(arg.as_ref()))
            .unwrap_or_default()
    }

    fn from_flag(flag: &str) -> Option<Self> {
        match flag {
            "--help" | "-h" => Some(OperatingMode::Help),
            "--version" | "-v" => Some(OperatingMode::Version),
            "--test" => Some(OperatingMode::Test),
            _ => None,
        }
    }

    /// `true` for the modes that provision and spawn processes.
    pub fn needs_bootstrap(&self) -> bool {
        matches!(self, OperatingMode::Run | OperatingMode::Test)
    }
}
