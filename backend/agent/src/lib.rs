//! The tether agent: register once, then poll for signed instructions,
//! run them and post signed replies.

pub mod agent_loop;
pub mod state;

pub use agent_loop::{AgentLoop, LoopSettings};
pub use state::{AgentState, CycleReport};
