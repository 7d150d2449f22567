// emc-common - Shared types and protocol definitions for EventMC
//
// This crate defines the messages exchanged between the dispatcher and a
// transport, and the errors both sides report.

pub mod opcode;
pub mod error;
pub mod types;
pub mod protocol;

// Re-export for convenience
pub use opcode::*;
pub use error::*;
pub use types::*;
pub use protocol::*;
