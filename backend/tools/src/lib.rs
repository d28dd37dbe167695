pub mod bash_exec;
pub mod history;
pub mod proxy;
pub mod system;

pub use bash_exec::{exec_command, ExecConfig, ExecResult};
pub use system::LocalSystem;
