//! Per-module configuration and buffer control.
//!
//! Every operation validates the module id and runs its register sequence
//! with the bus guard held.

use tracing::debug;

use crate::device::Tdc775;
use crate::error::{C775Error, Result};
use crate::registers::{
    fsr_to_register, mask, offset, register_to_fsr, BitSet2, Control1, FIFO_EVENTS, MAX_CHANNELS,
    MAX_FSR_NS, MIN_FSR_NS,
};

impl Tdc775 {
    /// Program the full-scale range in ns (140-1200) and return the value
    /// read back. Zero only reads the current range.
    pub fn set_full_scale_range(&self, id: usize, fsr_ns: u32) -> Result<u32> {
        self.with_module(id, |module| {
            if fsr_ns != 0 && !(MIN_FSR_NS..=MAX_FSR_NS).contains(&fsr_ns) {
                return Err(C775Error::out_of_range(
                    "full scale range",
                    fsr_ns,
                    MIN_FSR_NS,
                    MAX_FSR_NS,
                ));
            }
            let regs = module.regs();
            if fsr_ns != 0 {
                regs.write(offset::FSR, fsr_to_register(fsr_ns));
            }
            let actual = register_to_fsr(regs.read(offset::FSR));
            debug!(id, requested = fsr_ns, actual, "Full scale range");
            Ok(actual)
        })
    }

    /// Switch overflow and under-threshold suppression on or off. Returns
    /// bit set 2.
    pub fn sparse(&self, id: usize, suppress_overflow: bool, suppress_underflow: bool) -> Result<BitSet2> {
        self.with_module(id, |module| {
            let regs = module.regs();
            if suppress_overflow {
                regs.clear2(BitSet2::OVER_RANGE);
            } else {
                regs.set2(BitSet2::OVER_RANGE);
            }
            if suppress_underflow {
                regs.clear2(BitSet2::LOW_THRESHOLD);
            } else {
                regs.set2(BitSet2::LOW_THRESHOLD);
            }
            Ok(regs.bit_set2())
        })
    }

    /// Assert `bits` in bit set 2 and return the register. Empty `bits` only reads.
    pub fn bit_set2(&self, id: usize, bits: BitSet2) -> Result<BitSet2> {
        self.with_module(id, |module| {
            let regs = module.regs();
            if !bits.is_empty() {
                regs.set2(bits);
            }
            Ok(regs.bit_set2())
        })
    }

    /// Deassert `bits` in bit set 2 and return the register. Empty `bits` only reads.
    pub fn bit_clear2(&self, id: usize, bits: BitSet2) -> Result<BitSet2> {
        self.with_module(id, |module| {
            let regs = module.regs();
            if !bits.is_empty() {
                regs.clear2(bits);
            }
            Ok(regs.bit_set2())
        })
    }

    /// Zero every channel threshold.
    pub fn clear_thresholds(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            let regs = module.regs();
            for channel in 0..MAX_CHANNELS {
                regs.write(offset::threshold(channel), 0);
            }
            Ok(())
        })
    }

    /// Write the threshold register of `channel`.
    pub fn set_threshold(&self, id: usize, channel: usize, value: u16) -> Result<()> {
        self.with_module(id, |module| {
            check_channel(channel)?;
            module.regs().write(offset::threshold(channel), value);
            Ok(())
        })
    }

    /// Read the threshold register of `channel`.
    pub fn threshold(&self, id: usize, channel: usize) -> Result<u16> {
        self.with_module(id, |module| {
            check_channel(channel)?;
            Ok(module.regs().read(offset::threshold(channel)))
        })
    }

    /// Program the crate number stamped into every event header (0-255).
    pub fn set_crate_id(&self, id: usize, crate_id: u16) -> Result<()> {
        self.with_module(id, |module| {
            if crate_id > mask::CRATE_SELECT {
                return Err(C775Error::out_of_range(
                    "crate id",
                    u32::from(crate_id),
                    0,
                    u32::from(mask::CRATE_SELECT),
                ));
            }
            module.regs().write(offset::CRATE_SELECT, crate_id);
            debug!(id, crate_id, "Crate select");
            Ok(())
        })
    }

    /// Crate number programmed in the module.
    pub fn crate_id(&self, id: usize) -> Result<u16> {
        self.with_module(id, |module| {
            Ok(module.regs().read(offset::CRATE_SELECT) & mask::CRATE_SELECT)
        })
    }

    /// Software gate: the module converts and buffers one event.
    pub fn gate(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().write(offset::SW_COMM, 1);
            Ok(())
        })
    }

    /// Terminate block transfers with a bus error at the end of the buffer.
    pub fn enable_berr(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module
                .regs()
                .write(offset::CONTROL1, Control1::BERR_ENABLE.bits());
            Ok(())
        })
    }

    /// Clear bus error and block end termination.
    pub fn disable_berr(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            let regs = module.regs();
            let control = regs.control1() - (Control1::BERR_ENABLE | Control1::BLOCK_END);
            regs.write(offset::CONTROL1, control.bits());
            Ok(())
        })
    }

    /// Skip the current event in the buffer and count it as read.
    pub fn increment_event(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().write(offset::INCR_EVENT, 1);
            module.counters.advance_read(1);
            Ok(())
        })
    }

    /// Skip one word of the current event.
    pub fn increment_word(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().write(offset::INCR_OFFSET, 1);
            Ok(())
        })
    }

    /// Count `events` (1-32) as read without touching the module. Used after
    /// a complete block transfer, which already removed them from the buffer.
    pub fn increment_event_block(&self, id: usize, events: u32) -> Result<()> {
        self.with_module(id, |module| {
            let max = FIFO_EVENTS as u32;
            if events == 0 || events > max {
                return Err(C775Error::out_of_range("block event count", events, 1, max));
            }
            module.counters.advance_read(events);
            Ok(())
        })
    }

    /// Put the module online.
    pub fn enable(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().clear2(BitSet2::OFFLINE);
            Ok(())
        })
    }

    /// Take the module offline; it ignores gates until re-enabled.
    pub fn disable(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().set2(BitSet2::OFFLINE);
            Ok(())
        })
    }

    /// Common stop acquisition mode.
    pub fn common_stop(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().set2(BitSet2::COMMON_STOP);
            Ok(())
        })
    }

    /// Common start acquisition mode.
    pub fn common_start(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().clear2(BitSet2::COMMON_STOP);
            Ok(())
        })
    }

    /// Clear the data buffer and the host counters.
    pub fn clear(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            module.regs().data_reset();
            module.counters.reset();
            debug!(id, "TDC data cleared");
            Ok(())
        })
    }

    /// Clear the data buffer, soft reset the module and clear the host counters.
    pub fn reset(&self, id: usize) -> Result<()> {
        self.with_module(id, |module| {
            let regs = module.regs();
            regs.data_reset();
            regs.soft_reset();
            module.counters.reset();
            debug!(id, "TDC reset");
            Ok(())
        })
    }

    /// Read the 24-bit hardware event counter.
    pub fn event_count(&self, id: usize) -> Result<u32> {
        self.with_module(id, |module| {
            let count = module.regs().event_count();
            module.counters.event_count = count;
            Ok(count)
        })
    }

    /// Index of the last event taken out of the buffer, `None` if nothing
    /// was read since the last clear.
    pub fn last_event_read(&self, id: usize) -> Result<Option<u32>> {
        self.with_module(id, |module| Ok(module.counters.last_read))
    }
}

fn check_channel(channel: usize) -> Result<()> {
    if channel >= MAX_CHANNELS {
        return Err(C775Error::out_of_range(
            "channel",
            channel as u32,
            0,
            MAX_CHANNELS as u32 - 1,
        ));
    }
    Ok(())
}
