pub mod detection;
pub mod dispatch;
pub mod types;

pub use dispatch::{render_processes, CommandDispatcher};
pub use types::{DispatchOutcome, Operation};
