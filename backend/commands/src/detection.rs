/// Selector detection: turn the `shell` field of an instruction into an
/// [`Operation`].
use crate::types::Operation;

const GET_PROCESSES: &str = "/get processes";
const GET_BASH_HISTORY: &str = "/get bash history";
const GET_PROXY_SETTINGS: &str = "/get proxy settings";
const GET_LOCALHOST: &str = "/get localhost";
const GET_MACHINE_DETAILS: &str = "/get machine details";

impl Operation {
    /// Match `selector` exactly. Built-in operations start with `/`; anything
    /// else is a raw shell command. Empty and unknown `/` selectors match
    /// nothing.
    pub fn detect(selector: &str) -> Option<Operation> {
        if selector.is_empty() {
            return None;
        }
        if !selector.starts_with('/') {
            return Some(Operation::RawCommand(selector.to_string()));
        }
        match selector {
            GET_PROCESSES => Some(Operation::ListProcesses),
            GET_BASH_HISTORY => Some(Operation::ShellHistory),
            GET_PROXY_SETTINGS => Some(Operation::ProxySettings),
            GET_LOCALHOST => Some(Operation::LocalHost),
            GET_MACHINE_DETAILS => Some(Operation::MachineDetails),
            _ => None,
        }
    }
}
