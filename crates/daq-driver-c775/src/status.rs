//! Module status snapshot.

use std::fmt;

use crate::bus::LocalAddress;
use crate::device::Tdc775;
use crate::error::Result;
use crate::registers::{
    mask, offset, register_to_fsr, BitSet1, BitSet2, Control1, Status1, Status2,
};

/// Register snapshot of one module, taken under the bus guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Module id
    pub id: usize,
    /// Bus address of the module
    pub bus_address: u32,
    /// Where the bus layer mapped it
    pub local_address: LocalAddress,
    /// Firmware revision, major in the high byte
    pub firmware_revision: u16,
    /// Programmed interrupt level, 0 when disabled
    pub interrupt_level: u8,
    /// Programmed interrupt vector
    pub interrupt_vector: u8,
    /// Events buffered before the module interrupts, 0 when disabled
    pub event_trigger: u16,
    /// Driver-wide interrupt count, not specific to this module.
    pub interrupt_count: u64,
    /// Status register 1
    pub status1: Status1,
    /// Status register 2
    pub status2: Status2,
    /// Bit set 1
    pub bit_set1: BitSet1,
    /// Bit set 2
    pub bit_set2: BitSet2,
    /// Control register 1
    pub control1: Control1,
    /// Full-scale range in ns
    pub full_scale_range_ns: u32,
    /// Hardware event counter; `0xffffff` means no event since reset.
    pub event_count: u32,
    /// Index of the last event the host read, `None` since reset
    pub last_event_read: Option<u32>,
}

impl StatusReport {
    /// True when the module has a level and a trigger programmed.
    pub fn interrupts_enabled(&self) -> bool {
        self.interrupt_level > 0 && self.event_trigger > 0
    }

    /// True when no event has been counted since reset.
    pub fn no_events_taken(&self) -> bool {
        self.event_count == mask::EVENT_COUNT
    }
}

fn flag(set: bool) -> u8 {
    u8::from(set)
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(80);
        writeln!(
            f,
            "STATUS for TDC id {} at VME (LOCAL) base address {:#x} ({})",
            self.id, self.bus_address, self.local_address
        )?;
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            " Firmware Revision = {}.{}",
            self.firmware_revision >> 8,
            self.firmware_revision & 0xff
        )?;
        if self.interrupts_enabled() {
            writeln!(f, " Interrupts Enabled - Every {} events", self.event_trigger)?;
            writeln!(
                f,
                " VME Interrupt Level: {}   Vector: {:#x}",
                self.interrupt_level, self.interrupt_vector
            )?;
            writeln!(f, " Interrupt Count    : {}", self.interrupt_count)?;
        } else {
            writeln!(f, " Interrupts Disabled")?;
            writeln!(f, " Last Interrupt Count    : {}", self.interrupt_count)?;
        }
        writeln!(f)?;

        let (s1, s2) = (self.status1, self.status2);
        writeln!(f, "             --1--                  --2--")?;
        writeln!(f, "  Status:    {:#06x}                 {:#06x}", s1.bits(), s2.bits())?;
        writeln!(
            f,
            "    Data Ready = {}      Buffer Empty = {}",
            flag(s1.contains(Status1::DATA_READY)),
            flag(s2.contains(Status2::BUFFER_EMPTY))
        )?;
        writeln!(
            f,
            "          Busy = {}       Buffer Full = {}",
            flag(s1.contains(Status1::BUSY)),
            flag(s2.contains(Status2::BUFFER_FULL))
        )?;
        writeln!(f, "       EvReady = {}", flag(s1.contains(Status1::EVENT_READY)))?;
        writeln!(f)?;

        let (b1, b2) = (self.bit_set1, self.bit_set2);
        writeln!(f, "  BitSet:    {:#06x}                 {:#06x}", b1.bits(), b2.bits())?;
        writeln!(
            f,
            "          BERR = {}        Over Range = {}",
            flag(b1.contains(BitSet1::BERR_FLAG)),
            flag(b2.contains(BitSet2::OVER_RANGE))
        )?;
        writeln!(
            f,
            "      Sel Addr = {}     Low Threshold = {}",
            flag(b1.contains(BitSet1::SELECT_ADDRESS)),
            flag(b2.contains(BitSet2::LOW_THRESHOLD))
        )?;
        writeln!(
            f,
            "    Soft Reset = {}       Common Stop = {}",
            flag(b1.contains(BitSet1::SOFT_RESET)),
            flag(b2.contains(BitSet2::COMMON_STOP))
        )?;
        for (name, bit) in [
            ("Slide Enable", BitSet2::SLIDE_ENABLE),
            ("Auto Incr", BitSet2::AUTO_INCR),
            ("Empty Prog", BitSet2::EMPTY_PROG),
            ("Slide Sub Enable", BitSet2::SLIDE_SUB_ENABLE),
            ("All Trg", BitSet2::ALL_TRIGGER),
        ] {
            writeln!(f, "{:>37} = {}", name, flag(b2.contains(bit)))?;
        }
        writeln!(f)?;

        let c1 = self.control1;
        writeln!(f, "  Control:   {:#06x}", c1.bits())?;
        writeln!(f, "       Blk End = {}", flag(c1.contains(Control1::BLOCK_END)))?;
        writeln!(f, "   BERR Enable = {}", flag(c1.contains(Control1::BERR_ENABLE)))?;
        writeln!(f, "      Align 64 = {}", flag(c1.contains(Control1::ALIGN64)))?;
        writeln!(f)?;

        writeln!(f, "  FSR     = {} nsec", self.full_scale_range_ns)?;
        if self.no_events_taken() {
            writeln!(f, "  Event Count     = (No Events Taken)")?;
            writeln!(f, "  Last Event Read = (No Events Read)")?;
        } else {
            writeln!(f, "  Event Count     = {}", self.event_count)?;
            match self.last_event_read {
                Some(index) => writeln!(f, "  Last Event Read = {index}")?,
                None => writeln!(f, "  Last Event Read = (No Events Read)")?,
            }
        }
        writeln!(f, "{rule}")
    }
}

impl Tdc775 {
    /// Snapshot the registers of module `id`.
    pub fn status(&self, id: usize) -> Result<StatusReport> {
        let mut state = self.lock();
        let interrupt_count = state.interrupt.count;
        let module = state.registry.get_mut(id)?;
        let regs = module.regs();

        let firmware_revision = regs.read(offset::FIRMWARE_REV);
        let status1 = regs.status1();
        let status2 = regs.status2();
        let bit_set1 = regs.bit_set1();
        let bit_set2 = regs.bit_set2();
        let control1 = regs.control1();
        let full_scale_range_ns = register_to_fsr(regs.read(offset::FSR));
        let event_count = regs.event_count();
        let interrupt_level = (regs.read(offset::INT_LEVEL) & mask::INT_LEVEL) as u8;
        let interrupt_vector = (regs.read(offset::INT_VECTOR) & mask::INT_VECTOR) as u8;
        let event_trigger = regs.event_trigger();

        module.counters.event_count = event_count;
        Ok(StatusReport {
            id,
            bus_address: module.bus_address,
            local_address: module.local,
            firmware_revision,
            interrupt_level,
            interrupt_vector,
            event_trigger,
            interrupt_count,
            status1,
            status2,
            bit_set1,
            bit_set2,
            control1,
            full_scale_range_ns,
            event_count,
            last_event_read: module.counters.last_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> StatusReport {
        StatusReport {
            id: 0,
            bus_address: 0x18_0000,
            local_address: LocalAddress(0x9018_0000),
            firmware_revision: 0x0903,
            interrupt_level: 0,
            interrupt_vector: 0,
            event_trigger: 0,
            interrupt_count: 0,
            status1: Status1::empty(),
            status2: Status2::BUFFER_EMPTY,
            bit_set1: BitSet1::empty(),
            bit_set2: BitSet2::OVER_RANGE | BitSet2::LOW_THRESHOLD,
            control1: Control1::empty(),
            full_scale_range_ns: 140,
            event_count: 0x00ff_ffff,
            last_event_read: None,
        }
    }

    #[test]
    fn test_display_after_reset() {
        let text = report().to_string();
        assert!(text.contains("Firmware Revision = 9.3"));
        assert!(text.contains("Interrupts Disabled"));
        assert!(text.contains("(No Events Taken)"));
        assert!(text.contains("FSR     = 140 nsec"));
    }

    #[test]
    fn test_display_with_interrupts_and_events() {
        let mut status = report();
        status.interrupt_level = 4;
        status.interrupt_vector = 0xaa;
        status.event_trigger = 5;
        status.event_count = 12;
        status.last_event_read = Some(10);
        let text = status.to_string();
        assert!(status.interrupts_enabled());
        assert!(text.contains("Every 5 events"));
        assert!(text.contains("Vector: 0xaa"));
        assert!(text.contains("Event Count     = 12"));
        assert!(text.contains("Last Event Read = 10"));
    }
}
