//! Register-level driver for CAEN V775 time-to-digital converters.
//!
//! The V775 is a 32-channel VME TDC. It digitizes one event per trigger and
//! buffers up to 32 events in an output FIFO, framed as a header word, one
//! word per converted channel and a trailer carrying a 24-bit event index.
//! This crate discovers a crate of modules, configures them, and moves their
//! events to the host one at a time, in DMA blocks, or driven by the
//! module's VME interrupt.
//!
//! # Architecture
//!
//! ## Driver Handle
//! - [`Tdc775`] - Module registry, interrupt context and the bus guard
//! - [`CrateLayout`] - Where the modules sit on the bus
//!
//! ## Readout
//! - [`Tdc775::read_event`] / [`Tdc775::flush_event`] / [`Tdc775::print_event`] - Polled, one event at a time
//! - [`Tdc775::read_block`] - DMA readout, see [`BlockTransfer`]
//! - [`Tdc775::connect`] / [`Tdc775::enable_interrupts`] - Interrupt-driven acquisition
//!
//! ## Collaborators
//! - [`VmeBus`], [`DmaEngine`], [`InterruptController`] - What the host
//!   platform provides, bundled as [`Platform`]
//! - [`sim::SimulatedCrate`] - In-memory implementation of all three
//!
//! ## Data Format
//! - [`EventWord`] - Decoded buffer words
//! - [`registers`] - Register map and bit definitions
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use daq_driver_c775::{sim::SimulatedCrate, EventWord, Platform, Tdc775};
//!
//! # fn example() -> anyhow::Result<()> {
//! let sim = Arc::new(SimulatedCrate::new(0x18_0000, 0x1_0000, 1));
//! let tdc = Tdc775::new(Platform::from_shared(sim.clone()));
//! tdc.initialize(0x18_0000, 0x1_0000, 1, 0)?;
//!
//! tdc.gate(0)?;
//! assert_eq!(tdc.data_ready(0)?, 1);
//!
//! let mut words = Vec::new();
//! tdc.read_event(0, &mut words)?;
//! for word in daq_driver_c775::decode_event(&words) {
//!     if let EventWord::Datum { channel, value, .. } = word {
//!         println!("channel {channel}: {value}");
//!     }
//! }
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod block;
pub mod bus;
pub mod control;
pub mod device;
pub mod error;
pub mod event;
pub mod interrupt;
pub mod readout;
pub mod registers;
pub mod registry;
pub mod sim;
pub mod status;

pub use block::BlockTransfer;
pub use bus::{
    AddressSpace, DataWidth, DmaCompletion, DmaEngine, InterruptController, InterruptHandler,
    LocalAddress, Platform, RegisterWindow, VmeBus, WordOrder,
};
pub use device::Tdc775;
pub use error::{C775Error, DiscoveryFailure, ProtocolViolation, Result};
pub use event::{decode_event, format_event, EventWord};
pub use interrupt::{InterruptState, InterruptStatus, IsrRoutine};
pub use readout::FlushVerbosity;
pub use registers::{BitSet1, BitSet2, Control1, Status1, Status2};
pub use registry::{CrateLayout, MAX_MODULES};
pub use status::StatusReport;
