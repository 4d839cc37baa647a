use crate::network::NetworkAddress;
use std::io;
use thiserror::Error;

/// Everything that can go wrong inside a single device step, plus the few
/// construction-time errors of the orchestrator and instruction tables.
#[derive(Debug, Error)]
pub enum ChipsError {
    /// memory index or span beyond the store length
    #[error("index {index:#04x} is out of bounds ({len:#04x})")]
    OutOfBounds { index: usize, len: usize },

    /// instruction pointer beyond the store length
    #[error("instruction pointer {ip:#04x} is out of bounds ({len:#04x})")]
    IpOutOfBounds { ip: usize, len: usize },

    /// no descriptor in the instruction set matches the bytes at `index`
    #[error("invalid instruction opcode at {index:#04x}")]
    InvalidOpcode { index: usize },

    /// fetched bytes don't start with the descriptor's fixed opcode
    #[error("bytes do not match the opcode of {name}")]
    OpcodeMismatch { name: &'static str },

    /// the instruction's effect declined, e.g. too few registers
    #[error("{name} failed to execute")]
    SemanticFailure { name: &'static str },

    /// address doesn't resolve to a live device
    #[error("no device at {0}")]
    UnresolvedPeer(NetworkAddress),

    #[error("a device is already attached at {0}")]
    DuplicateAddress(NetworkAddress),

    /// VM memory must be addressable by the instruction pointer
    #[error("VM memory of {len} bytes exceeds the addressable {max}")]
    MemoryTooLarge { len: usize, max: usize },

    #[error("opcode key {key:#x} is already in the instruction set")]
    DuplicateOpcode { key: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ChipsError {
    /// message shown to the player when a device halts on this error
    pub fn halt_message(&self) -> String {
        match self {
            ChipsError::IpOutOfBounds { ip, len } => {
                format!("IP ({:#04x}) is out of bounds ({:#04x}).", ip, len)
            }
            ChipsError::InvalidOpcode { .. } => "Invalid instruction opcode.".to_string(),
            ChipsError::OutOfBounds { .. }
            | ChipsError::OpcodeMismatch { .. }
            | ChipsError::SemanticFailure { .. } => "Internal instruction error.".to_string(),
            other => other.to_string(),
        }
    }
}
