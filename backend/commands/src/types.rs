use std::fmt;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Every local operation an instruction can select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Any selector not starting with `/`, run through the shell.
    RawCommand(String),
    /// `/get processes`
    ListProcesses,
    /// `/get bash history`
    ShellHistory,
    /// `/get proxy settings`
    ProxySettings,
    /// `/get localhost`
    LocalHost,
    /// `/get machine details`
    MachineDetails,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::RawCommand(_) => write!(f, "raw command"),
            Operation::ListProcesses => write!(f, "/get processes"),
            Operation::ShellHistory => write!(f, "/get bash history"),
            Operation::ProxySettings => write!(f, "/get proxy settings"),
            Operation::LocalHost => write!(f, "/get localhost"),
            Operation::MachineDetails => write!(f, "/get machine details"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What dispatching one verified instruction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Text to sign and send back.
    Output(String),
    /// No operation matched. `selector` is the raw value, if there was one.
    NoMatchingOperation { selector: Option<String> },
}

impl DispatchOutcome {
    pub fn output(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Output(text) => Some(text),
            DispatchOutcome::NoMatchingOperation { .. } => None,
        }
    }
}
