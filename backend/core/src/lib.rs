pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::{TetherError, TransportError, VerificationError};
pub use message::{
    Claims, ClientRegistration, ClientStatus, Instruction, Message, MessageStatus,
    OutboundMessage, SUBJECT_INSTRUCTION, SUBJECT_SHELL_OUTPUT,
};
pub use traits::{ProcessInfo, SystemProbe};
pub use types::{BodyEncoding, NonInstructionPolicy, UnmatchedPolicy};
