/// Lifecycle of the agent. There is no stopped state; the process is
/// terminated from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentState {
    #[default]
    Unregistered,
    /// Announcing the identity; `attempts` counts tries so far.
    Registering { attempts: u32 },
    /// Registered and polling.
    Active,
}

/// What one poll cycle did with the batch it fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub fetched: usize,
    /// Failed verification; dropped without a reply or ack.
    pub rejected: usize,
    /// Verified but not an instruction.
    pub skipped: usize,
    /// A non-instruction stopped the rest of the batch.
    pub aborted: bool,
    /// Instructions naming no known operation.
    pub unmatched: usize,
    pub replied: usize,
    pub reply_failures: usize,
    pub acknowledged: usize,
    pub ack_failures: usize,
}
