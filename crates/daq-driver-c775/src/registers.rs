//! V775 register map and bit definitions.
//!
//! Offsets are bytes from the module base address. The 16-bit control
//! registers come in set/clear pairs: writing a mask to the set register
//! asserts those bits, writing it to the paired clear register deasserts
//! them. Reading either returns the current state.

use bitflags::bitflags;

use crate::bus::RegisterWindow;

/// Number of TDC channels per module.
pub const MAX_CHANNELS: usize = 32;
/// Largest event: header + one datum per channel + trailer.
pub const MAX_WORDS_PER_EVENT: usize = MAX_CHANNELS + 2;
/// Events the output buffer holds before it reports full.
pub const FIFO_EVENTS: usize = 32;
/// ROM identity of a V775.
pub const BOARD_ID: u32 = 0x0000_0307;

/// Default interrupt vector.
pub const DEFAULT_INT_VECTOR: u8 = 0xaa;
/// Default VME interrupt level.
pub const DEFAULT_INT_LEVEL: u8 = 4;

/// Full-scale range limits in nanoseconds.
pub const MIN_FSR_NS: u32 = 140;
/// See [`MIN_FSR_NS`].
pub const MAX_FSR_NS: u32 = 1200;

/// Register offsets.
pub mod offset {
    /// Output buffer (FIFO) data region, 32-bit reads.
    pub const DATA: usize = 0x0000;
    /// Size of the data region in bytes.
    pub const DATA_LEN: usize = 0x0800;
    /// Firmware revision
    pub const FIRMWARE_REV: usize = 0x1000;
    /// Geographic address
    pub const GEO_ADDR: usize = 0x1002;
    /// Chained block transfer address
    pub const CBLT_ADDR: usize = 0x1004;
    /// Bit set 1
    pub const BIT_SET1: usize = 0x1006;
    /// Bit clear 1
    pub const BIT_CLEAR1: usize = 0x1008;
    /// Interrupt level
    pub const INT_LEVEL: usize = 0x100a;
    /// Interrupt vector
    pub const INT_VECTOR: usize = 0x100c;
    /// Status register 1
    pub const STATUS1: usize = 0x100e;
    /// Control register 1
    pub const CONTROL1: usize = 0x1010;
    /// Address decoder, high byte
    pub const ADER_HIGH: usize = 0x1012;
    /// Address decoder, low byte
    pub const ADER_LOW: usize = 0x1014;
    /// Single shot reset
    pub const SS_RESET: usize = 0x1016;
    /// Chained block transfer control
    pub const CBLT_CONTROL: usize = 0x101a;
    /// Event trigger (events per interrupt)
    pub const EVENT_TRIGGER: usize = 0x1020;
    /// Status register 2
    pub const STATUS2: usize = 0x1022;
    /// Event counter, low 16 bits
    pub const EVENT_COUNT_LOW: usize = 0x1024;
    /// Event counter, high 8 bits
    pub const EVENT_COUNT_HIGH: usize = 0x1026;
    /// Skip to the next event
    pub const INCR_EVENT: usize = 0x1028;
    /// Skip one word
    pub const INCR_OFFSET: usize = 0x102a;
    /// Test event load
    pub const LOAD_TEST: usize = 0x102c;
    /// Fast clear window
    pub const FCLR_WINDOW: usize = 0x1030;
    /// Bit set 2
    pub const BIT_SET2: usize = 0x1032;
    /// Bit clear 2
    pub const BIT_CLEAR2: usize = 0x1034;
    /// Crate number stamped into headers
    pub const CRATE_SELECT: usize = 0x103c;
    /// Event counter reset
    pub const EVENT_COUNT_RESET: usize = 0x1040;
    /// Full-scale range
    pub const FSR: usize = 0x1060;
    /// Software gate
    pub const SW_COMM: usize = 0x1068;
    /// Sliding scale constant
    pub const SLIDE_CONST: usize = 0x106a;
    /// First channel threshold register
    pub const THRESHOLDS: usize = 0x1080;
    /// Board identity bytes, most significant first.
    pub const ROM_ID3: usize = 0x8036;
    /// Board identity, middle byte
    pub const ROM_ID2: usize = 0x803a;
    /// Board identity, low byte
    pub const ROM_ID1: usize = 0x803e;
    /// Board revision
    pub const ROM_REVISION: usize = 0x804e;

    /// Threshold register of `channel`.
    pub const fn threshold(channel: usize) -> usize {
        THRESHOLDS + 2 * channel
    }
}

bitflags! {
    /// Bit set 1 / bit clear 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitSet1: u16 {
        /// Module generated a bus error (block transfer end).
        const BERR_FLAG = 0x0008;
        /// Base address taken from the address decoder registers
        const SELECT_ADDRESS = 0x0010;
        /// Module held in software reset
        const SOFT_RESET = 0x0080;
    }
}

bitflags! {
    /// Status register 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status1: u16 {
        /// At least one event is buffered
        const DATA_READY = 0x0001;
        /// Some module in the chain has data
        const GLOBAL_DATA_READY = 0x0002;
        /// Converting or buffer full
        const BUSY = 0x0004;
        /// Some module in the chain is busy
        const GLOBAL_BUSY = 0x0008;
        /// No geographic address from the crate
        const AMNESIA = 0x0010;
        /// Module purged during chained readout
        const PURGED = 0x0020;
        /// Termination on
        const TERM_ON = 0x0040;
        /// Termination off
        const TERM_OFF = 0x0080;
        /// Event ready for readout
        const EVENT_READY = 0x0100;
    }
}

bitflags! {
    /// Control register 1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Control1: u16 {
        /// Stop block transfers at the end of the first event
        const BLOCK_END = 0x0004;
        /// Front panel reset clears data only
        const PROG_RESET = 0x0010;
        /// End block transfers with a bus error
        const BERR_ENABLE = 0x0020;
        /// Pad block transfers to 64 bits
        const ALIGN64 = 0x0040;
    }
}

bitflags! {
    /// Status register 2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status2: u16 {
        /// Output buffer empty
        const BUFFER_EMPTY = 0x0002;
        /// Output buffer full
        const BUFFER_FULL = 0x0004;
    }
}

bitflags! {
    /// Bit set 2 / bit clear 2.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitSet2: u16 {
        /// Memory test mode
        const MEM_TEST = 0x0001;
        /// Module ignores gates
        const OFFLINE = 0x0002;
        /// Data reset
        const CLEAR_DATA = 0x0004;
        /// Keep over-range data (overflow suppression off) when set.
        const OVER_RANGE = 0x0008;
        /// Keep data under threshold (underflow suppression off) when set.
        const LOW_THRESHOLD = 0x0010;
        /// Acquisition test mode
        const TEST_MODE = 0x0040;
        /// Sliding scale enabled
        const SLIDE_ENABLE = 0x0080;
        /// Common stop mode
        const COMMON_STOP = 0x0400;
        /// Advance the read pointer automatically
        const AUTO_INCR = 0x0800;
        /// Write header and trailer even for events with no accepted channels.
        const EMPTY_PROG = 0x1000;
        /// Sliding scale subtraction enabled
        const SLIDE_SUB_ENABLE = 0x2000;
        /// Increment the event counter on every trigger, not only accepted ones.
        const ALL_TRIGGER = 0x4000;
    }
}

/// Register masks for values read back from the module.
pub mod mask {
    /// Valid bits of bit set 1
    pub const BIT_SET1: u16 = 0x0098;
    /// Valid bits of the interrupt level
    pub const INT_LEVEL: u16 = 0x0007;
    /// Valid bits of the interrupt vector
    pub const INT_VECTOR: u16 = 0x00ff;
    /// Valid bits of status register 1
    pub const STATUS1: u16 = 0x01ff;
    /// Valid bits of control register 1
    pub const CONTROL1: u16 = 0x0074;
    /// Valid bits of status register 2
    pub const STATUS2: u16 = 0x00f6;
    /// Valid bits of bit set 2
    pub const BIT_SET2: u16 = 0x7fff;
    /// Valid bits of the event trigger
    pub const EVENT_TRIGGER: u16 = 0x001f;
    /// Valid bits of the high event counter word
    pub const EVENT_COUNT_HIGH: u16 = 0x00ff;
    /// Valid bits of the crate select register
    pub const CRATE_SELECT: u16 = 0x00ff;
    /// 24-bit hardware event counter.
    pub const EVENT_COUNT: u32 = 0x00ff_ffff;
}

/// Convert a full-scale range in ns to its register value.
///
/// The register is read as a signed 16-bit quantity, so ranges above
/// 1160 ns (which go below zero) still read back unchanged.
pub fn fsr_to_register(fsr_ns: u32) -> u16 {
    let ns = i32::try_from(fsr_ns).unwrap_or(i32::MAX);
    (290 - (ns >> 2)) as i16 as u16
}

/// Convert a full-scale range register value to ns.
pub fn register_to_fsr(reg: u16) -> u32 {
    (4 * (290 - i32::from(reg as i16))).max(0) as u32
}

/// Typed view of one module's register window.
///
/// Each method is a single bus cycle (or a fixed pair for pulses). Callers
/// hold the driver's bus guard around anything longer.
#[derive(Clone, Copy)]
pub(crate) struct Regs<'a> {
    window: &'a dyn RegisterWindow,
}

impl<'a> Regs<'a> {
    pub(crate) fn new(window: &'a dyn RegisterWindow) -> Self {
        Self { window }
    }

    pub(crate) fn read(&self, offset: usize) -> u16 {
        self.window.read16(offset)
    }

    pub(crate) fn write(&self, offset: usize, value: u16) {
        self.window.write16(offset, value)
    }

    pub(crate) fn status1(&self) -> Status1 {
        Status1::from_bits_truncate(self.read(offset::STATUS1) & mask::STATUS1)
    }

    pub(crate) fn status2(&self) -> Status2 {
        Status2::from_bits_truncate(self.read(offset::STATUS2) & mask::STATUS2)
    }

    pub(crate) fn bit_set1(&self) -> BitSet1 {
        BitSet1::from_bits_truncate(self.read(offset::BIT_SET1) & mask::BIT_SET1)
    }

    pub(crate) fn bit_set2(&self) -> BitSet2 {
        BitSet2::from_bits_truncate(self.read(offset::BIT_SET2) & mask::BIT_SET2)
    }

    pub(crate) fn control1(&self) -> Control1 {
        Control1::from_bits_truncate(self.read(offset::CONTROL1) & mask::CONTROL1)
    }

    pub(crate) fn set1(&self, bits: BitSet1) {
        self.write(offset::BIT_SET1, bits.bits())
    }

    pub(crate) fn clear1(&self, bits: BitSet1) {
        self.write(offset::BIT_CLEAR1, bits.bits())
    }

    pub(crate) fn set2(&self, bits: BitSet2) {
        self.write(offset::BIT_SET2, bits.bits())
    }

    pub(crate) fn clear2(&self, bits: BitSet2) {
        self.write(offset::BIT_CLEAR2, bits.bits())
    }

    pub(crate) fn event_trigger(&self) -> u16 {
        self.read(offset::EVENT_TRIGGER) & mask::EVENT_TRIGGER
    }

    /// Low half first, then high half. Only consistent under the bus guard.
    pub(crate) fn event_count(&self) -> u32 {
        let low = u32::from(self.read(offset::EVENT_COUNT_LOW));
        let high = u32::from(self.read(offset::EVENT_COUNT_HIGH) & mask::EVENT_COUNT_HIGH);
        (high << 16) | low
    }

    pub(crate) fn soft_reset(&self) {
        self.set1(BitSet1::SOFT_RESET);
        self.clear1(BitSet1::SOFT_RESET);
    }

    pub(crate) fn data_reset(&self) {
        self.set2(BitSet2::CLEAR_DATA);
        self.clear2(BitSet2::CLEAR_DATA);
    }

    pub(crate) fn board_id(&self) -> u32 {
        let id3 = u32::from(self.read(offset::ROM_ID3) & 0xff);
        let id2 = u32::from(self.read(offset::ROM_ID2) & 0xff);
        let id1 = u32::from(self.read(offset::ROM_ID1) & 0xff);
        (id3 << 16) | (id2 << 8) | id1
    }
}
