//! Collaborator interfaces consumed by the driver.
//!
//! The driver never dereferences bus memory itself. A platform layer (a VME
//! bridge library, a kernel driver, or [`crate::sim::SimulatedCrate`])
//! provides:
//!
//! - [`VmeBus`] - address translation, presence probes and register windows
//! - [`DmaEngine`] - block transfers out of a module's data region
//! - [`InterruptController`] - vector registration and CPU-level masking
//!
//! [`Platform`] bundles the three so a single value can be handed to
//! [`crate::Tdc775::new`].

use std::fmt;
use std::sync::Arc;

/// VME address space selected from the module base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    /// 24-bit addressing (address modifier 0x39)
    A24,
    /// 32-bit addressing (address modifier 0x09)
    A32,
}

impl AddressSpace {
    /// Pick the address space the way the module base address implies.
    pub fn for_address(bus_address: u32) -> Self {
        if bus_address < 0x00ff_ffff {
            Self::A24
        } else {
            Self::A32
        }
    }

    /// VME address modifier code.
    pub fn address_modifier(self) -> u8 {
        match self {
            Self::A24 => 0x39,
            Self::A32 => 0x09,
        }
    }
}

/// Access width of a register window or probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    /// 16-bit register access
    D16,
    /// 32-bit data-region access
    D32,
}

impl DataWidth {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::D16 => 2,
            Self::D32 => 4,
        }
    }
}

/// A locally dereferenceable address returned by [`VmeBus::translate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalAddress(pub usize);

impl LocalAddress {
    /// Address `bytes` further along.
    pub fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }
}

impl fmt::Display for LocalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Register access at byte offsets from a module base.
///
/// Implementations perform exactly one bus cycle per call; the driver is
/// responsible for serializing multi-register sequences.
pub trait RegisterWindow: Send + Sync {
    /// Read a 16-bit register.
    fn read16(&self, offset: usize) -> u16;

    /// Write a 16-bit register.
    fn write16(&self, offset: usize, value: u16);

    /// Read a 32-bit word.
    fn read32(&self, offset: usize) -> u32;
}

/// Bus access layer.
pub trait VmeBus: Send + Sync {
    /// Turn a bus address into a local one, or `None` if no window covers it.
    fn translate(&self, space: AddressSpace, bus_address: u32) -> Option<LocalAddress>;

    /// Check whether anything answers at `local` with a `width` access.
    fn probe(&self, local: LocalAddress, width: DataWidth) -> bool;

    /// Register window rooted at `local`.
    fn window(&self, local: LocalAddress, width: DataWidth) -> Arc<dyn RegisterWindow>;
}

/// Byte order in which the DMA engine deposits 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WordOrder {
    /// Words arrive as they appear on the bus (big-endian).
    #[default]
    Bus,
    /// The engine already swapped words into host order.
    Native,
}

impl WordOrder {
    /// Convert a word received with this ordering to a host-order value.
    pub fn to_native(self, word: u32) -> u32 {
        match self {
            Self::Bus => u32::from_be(word),
            Self::Native => word,
        }
    }
}

/// Completion status of a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaCompletion {
    /// The full byte count was transferred.
    Done,
    /// The transfer stopped on a bus error after `bytes` bytes.
    Stopped { bytes: usize },
    /// The engine failed with a raw status code.
    Failed { status: i32 },
}

/// Block transfer engine.
pub trait DmaEngine: Send + Sync {
    /// Queue a transfer of `byte_count` bytes from `source` (bus address).
    fn start(&self, source: u32, byte_count: usize) -> Result<(), i32>;

    /// Block until the queued transfer completes and deposit the data in `dest`.
    fn wait(&self, dest: &mut [u32]) -> DmaCompletion;

    /// Ordering of the words placed in `dest`.
    fn word_order(&self) -> WordOrder {
        WordOrder::Bus
    }
}

/// Service routine registered with the interrupt collaborator.
pub type InterruptHandler = Arc<dyn Fn() + Send + Sync>;

/// Interrupt vector registration with the host environment.
pub trait InterruptController: Send + Sync {
    /// Install `handler` for `vector` on `level`.
    fn connect(&self, vector: u8, level: u8, handler: InterruptHandler) -> Result<(), i32>;

    /// Remove whatever handler is installed on `level`.
    fn disconnect(&self, level: u8) -> Result<(), i32>;

    /// Unmask `level` at the CPU.
    fn enable_level(&self, level: u8);

    /// Mask `level` at the CPU.
    fn disable_level(&self, level: u8);
}

/// The three collaborators the driver needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct Platform {
    /// Register access
    pub bus: Arc<dyn VmeBus>,
    /// Block transfers
    pub dma: Arc<dyn DmaEngine>,
    /// Interrupt registration
    pub interrupts: Arc<dyn InterruptController>,
}

impl Platform {
    /// Bundle three separate collaborators.
    pub fn new(
        bus: Arc<dyn VmeBus>,
        dma: Arc<dyn DmaEngine>,
        interrupts: Arc<dyn InterruptController>,
    ) -> Self {
        Self {
            bus,
            dma,
            interrupts,
        }
    }

    /// Use one object that implements all three collaborator traits.
    pub fn from_shared<P>(platform: Arc<P>) -> Self
    where
        P: VmeBus + DmaEngine + InterruptController + 'static,
    {
        Self {
            bus: platform.clone(),
            dma: platform.clone(),
            interrupts: platform,
        }
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
