//! Error types for V775 operations.
//!
//! Every driver operation reports failure through [`C775Error`]. None of them
//! are fatal: the acquisition framework calling the driver decides whether a
//! run is aborted or continues degraded.

use thiserror::Error;

/// Result type alias for V775 operations.
pub type Result<T> = std::result::Result<T, C775Error>;

/// Errors that can occur when working with V775 modules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum C775Error {
    /// The module id does not refer to an initialized slot.
    #[error("TDC id {id} not initialized")]
    NotInitialized { id: usize },

    /// The event buffer framing or the event counters are inconsistent.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// A configuration argument is outside its documented bounds.
    #[error("{parameter} {value} out of range ({min}-{max})")]
    OutOfRange {
        parameter: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// The DMA engine reported a failure that was not a device-terminated block.
    #[error("DMA transfer failed with status {status:#x}")]
    BusTransfer { status: i32 },

    /// Interrupts are already armed for a module.
    #[error("Interrupts already initialized for TDC id {source_id:?}")]
    AlreadyArmed { source_id: Option<usize> },

    /// No interrupt source is armed.
    #[error("Interrupts are not enabled")]
    NotArmed,

    /// `resume` found the trigger register already programmed.
    #[error("Interrupts already enabled (event trigger is non-zero)")]
    AlreadyTriggering,

    /// Module discovery stopped early. `initialized` modules remain usable.
    #[error("Unable to initialize all TDC modules ({initialized} initialized): {reason}")]
    Discovery {
        initialized: usize,
        reason: DiscoveryFailure,
    },

    /// The bus layer could not map the requested address.
    #[error("Unable to translate bus address {address:#x}")]
    AddressTranslation { address: u32 },

    /// The interrupt collaborator refused to (dis)connect the service routine.
    #[error("Interrupt registration failed for vector {vector:#x} level {level} (status {status})")]
    InterruptRegistration { vector: u8, level: u8, status: i32 },
}

/// Framing and bookkeeping violations of the event buffer protocol.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// First word of an event does not carry the header tag.
    #[error("invalid header word {word:#010x}")]
    InvalidHeader { word: u32 },
    /// Word after the data words does not carry the trailer tag.
    #[error("invalid trailer word {word:#010x}")]
    InvalidTrailer { word: u32 },
    /// Data ready was flagged but the counters say nothing is pending.
    #[error("bad event ready count (pending = {pending})")]
    EventCountDesync { pending: i32 },
    /// A device-terminated block ended in neither its last nor second-to-last
    /// word with a trailer. `words` were still transferred into the buffer.
    #[error("invalid trailer data {last_word:#010x} after {words} transferred words")]
    MissingBlockTrailer { words: usize, last_word: u32 },
}

/// Why discovery stopped at a slot.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryFailure {
    /// Nothing answered the presence probe.
    #[error("no addressable board for slot {slot} at {address:#x}")]
    NoBoard { slot: usize, address: u32 },
    /// Something answered, but the ROM identity is not a V775.
    #[error("board id {found:#08x} in slot {slot} does not match")]
    IdentityMismatch { slot: usize, found: u32 },
}

impl C775Error {
    /// Check if the error refers to an unknown module id.
    pub fn is_not_initialized(&self) -> bool {
        matches!(self, Self::NotInitialized { .. })
    }

    /// Check if this is a framing or counter desynchronization error.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// Check if an argument was rejected before touching the hardware.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Self::OutOfRange { .. })
    }

    /// Number of modules still usable after a failed discovery.
    pub fn initialized_modules(&self) -> Option<usize> {
        match self {
            Self::Discovery { initialized, .. } => Some(*initialized),
            _ => None,
        }
    }

    pub(crate) fn out_of_range(parameter: &'static str, value: u32, min: u32, max: u32) -> Self {
        Self::OutOfRange {
            parameter,
            value,
            min,
            max,
        }
    }
}
