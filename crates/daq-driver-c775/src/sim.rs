//! In-memory VME crate populated with simulated V775 modules.
//!
//! [`SimulatedCrate`] implements all three collaborator traits, so a single
//! `Arc<SimulatedCrate>` can back a [`crate::Tdc775`] through
//! [`crate::Platform::from_shared`]. Each slot holds a [`SimulatedTdc`]
//! whose registers follow the real module closely enough for the driver's
//! register sequences:
//!
//! - the event counter resets to `0xffffff` and counts accepted events
//! - a software gate or [`SimulatedTdc::inject_event`] frames one event
//!   (header, data, trailer) into a 32-event output buffer
//! - any 32-bit read of the data region pops one buffer word; an empty
//!   buffer answers with the not-valid word
//! - block transfers stop at the end of the buffer with a bus error when
//!   BERR is enabled
//!
//! Interrupts are not delivered by the register writes themselves. Call
//! [`SimulatedCrate::deliver_interrupts`] to run the handler of every module
//! whose trigger threshold is reached, the way the CPU would dispatch them.
//!
//! Faults for resilience tests are injected with [`DmaFault`],
//! [`SimulatedCrate::refuse_interrupt_connect`] and the per-board
//! presence/identity setters.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::bus::{
    AddressSpace, DataWidth, DmaCompletion, DmaEngine, InterruptController, InterruptHandler,
    LocalAddress, RegisterWindow, VmeBus, WordOrder,
};
use crate::event::{is_trailer, EventWord, TYPE_NOT_VALID};
use crate::registers::{
    fsr_to_register, mask, offset, BitSet1, BitSet2, Control1, Status1, Status2, BOARD_ID,
    FIFO_EVENTS, MAX_CHANNELS, MIN_FSR_NS,
};

/// Where bus addresses appear in the simulated local address space.
const LOCAL_OFFSET: usize = 0x1000_0000;
/// Address span decoded by one module.
const MODULE_SPAN: u32 = 0x1_0000;
const FIRMWARE_REVISION: u16 = 0x0903;
const NO_EVENTS: u32 = mask::EVENT_COUNT;

#[derive(Debug)]
struct TdcState {
    present: bool,
    board_id: u32,
    geo: u8,
    bit_set1: u16,
    bit_set2: u16,
    control1: u16,
    int_level: u16,
    int_vector: u16,
    event_trigger: u16,
    crate_select: u16,
    fsr: u16,
    thresholds: [u16; MAX_CHANNELS],
    event_counter: u32,
    fifo: VecDeque<u32>,
    gate_hits: Vec<(u8, u16)>,
}

impl TdcState {
    fn new(geo: u8) -> Self {
        Self {
            present: true,
            board_id: BOARD_ID,
            geo,
            bit_set1: 0,
            bit_set2: 0,
            control1: 0,
            int_level: 0,
            int_vector: 0,
            event_trigger: 0,
            crate_select: 0,
            fsr: fsr_to_register(MIN_FSR_NS),
            thresholds: [0; MAX_CHANNELS],
            event_counter: NO_EVENTS,
            fifo: VecDeque::new(),
            gate_hits: vec![(0, 0x0100)],
        }
    }

    fn soft_reset(&mut self) {
        let preserved = Self {
            present: self.present,
            board_id: self.board_id,
            gate_hits: std::mem::take(&mut self.gate_hits),
            ..Self::new(self.geo)
        };
        *self = preserved;
    }

    fn clear_data(&mut self) {
        self.fifo.clear();
        self.event_counter = NO_EVENTS;
    }

    fn has(&self, bits: BitSet2) -> bool {
        self.bit_set2 & bits.bits() != 0
    }

    fn control(&self, bits: Control1) -> bool {
        self.control1 & bits.bits() != 0
    }

    fn buffered_events(&self) -> usize {
        self.fifo.iter().filter(|&&word| is_trailer(word)).count()
    }

    fn status1(&self) -> u16 {
        if self.buffered_events() > 0 {
            (Status1::DATA_READY | Status1::GLOBAL_DATA_READY | Status1::EVENT_READY).bits()
        } else {
            0
        }
    }

    fn status2(&self) -> u16 {
        let mut status = Status2::empty();
        if self.fifo.is_empty() {
            status |= Status2::BUFFER_EMPTY;
        }
        if self.buffered_events() >= FIFO_EVENTS {
            status |= Status2::BUFFER_FULL;
        }
        status.bits()
    }

    /// Convert one trigger. Returns the event index, `None` if nothing was stored.
    fn convert(&mut self, hits: &[(u8, u16)]) -> Option<u32> {
        if self.has(BitSet2::OFFLINE) || self.buffered_events() >= FIFO_EVENTS {
            return None;
        }
        let keep_overflow = self.has(BitSet2::OVER_RANGE);
        let keep_underflow = self.has(BitSet2::LOW_THRESHOLD);

        let mut data = Vec::with_capacity(hits.len());
        for &(channel, value) in hits {
            let channel = channel & 0x1f;
            let overflow = value > 0x0fff;
            let underflow = value < self.thresholds[usize::from(channel)];
            if (overflow && !keep_overflow) || (underflow && !keep_underflow) {
                continue;
            }
            data.push(EventWord::datum_with_flags(
                self.geo, channel, value, overflow, underflow,
            ));
        }
        if data.is_empty() && !self.has(BitSet2::EMPTY_PROG) {
            return None;
        }

        self.event_counter = self.event_counter.wrapping_add(1) & mask::EVENT_COUNT;
        self.fifo.push_back(EventWord::header(
            self.geo,
            self.crate_select as u8,
            data.len() as u8,
        ));
        self.fifo.extend(data);
        self.fifo
            .push_back(EventWord::trailer(self.geo, self.event_counter));
        Some(self.event_counter)
    }

    fn pop_word(&mut self) -> u32 {
        self.fifo.pop_front().unwrap_or(TYPE_NOT_VALID)
    }

    fn skip_event(&mut self) {
        while let Some(word) = self.fifo.pop_front() {
            if is_trailer(word) {
                break;
            }
        }
    }

    fn interrupt_request(&self) -> Option<(u8, u8)> {
        let level = self.int_level & mask::INT_LEVEL;
        let trigger = self.event_trigger & mask::EVENT_TRIGGER;
        if level == 0 || trigger == 0 || self.buffered_events() < usize::from(trigger) {
            return None;
        }
        Some((level as u8, (self.int_vector & mask::INT_VECTOR) as u8))
    }

    fn read16(&self, off: usize) -> u16 {
        match off {
            offset::FIRMWARE_REV => FIRMWARE_REVISION,
            offset::GEO_ADDR => u16::from(self.geo),
            offset::BIT_SET1 | offset::BIT_CLEAR1 => self.bit_set1,
            offset::INT_LEVEL => self.int_level,
            offset::INT_VECTOR => self.int_vector,
            offset::STATUS1 => self.status1(),
            offset::CONTROL1 => self.control1,
            offset::EVENT_TRIGGER => self.event_trigger,
            offset::STATUS2 => self.status2(),
            offset::EVENT_COUNT_LOW => (self.event_counter & 0xffff) as u16,
            offset::EVENT_COUNT_HIGH => ((self.event_counter >> 16) & 0xff) as u16,
            offset::BIT_SET2 | offset::BIT_CLEAR2 => self.bit_set2,
            offset::CRATE_SELECT => self.crate_select,
            offset::FSR => self.fsr,
            offset::ROM_ID3 => ((self.board_id >> 16) & 0xff) as u16,
            offset::ROM_ID2 => ((self.board_id >> 8) & 0xff) as u16,
            offset::ROM_ID1 => (self.board_id & 0xff) as u16,
            off if (offset::THRESHOLDS..offset::threshold(MAX_CHANNELS)).contains(&off) => {
                self.thresholds[(off - offset::THRESHOLDS) / 2]
            }
            _ => 0,
        }
    }

    fn write16(&mut self, off: usize, value: u16) {
        match off {
            offset::BIT_SET1 => {
                self.bit_set1 |= value & mask::BIT_SET1;
                if value & BitSet1::SOFT_RESET.bits() != 0 {
                    self.soft_reset();
                    self.bit_set1 |= BitSet1::SOFT_RESET.bits();
                }
            }
            offset::BIT_CLEAR1 => self.bit_set1 &= !value,
            offset::INT_LEVEL => self.int_level = value & mask::INT_LEVEL,
            offset::INT_VECTOR => self.int_vector = value & mask::INT_VECTOR,
            offset::CONTROL1 => self.control1 = value & mask::CONTROL1,
            offset::EVENT_TRIGGER => self.event_trigger = value & mask::EVENT_TRIGGER,
            offset::INCR_EVENT => self.skip_event(),
            offset::INCR_OFFSET => {
                self.pop_word();
            }
            offset::BIT_SET2 => {
                self.bit_set2 |= value & mask::BIT_SET2;
                if value & BitSet2::CLEAR_DATA.bits() != 0 {
                    self.clear_data();
                }
            }
            offset::BIT_CLEAR2 => self.bit_set2 &= !value,
            offset::CRATE_SELECT => self.crate_select = value,
            offset::EVENT_COUNT_RESET => self.event_counter = NO_EVENTS,
            offset::FSR => self.fsr = value,
            offset::SW_COMM => {
                let hits = self.gate_hits.clone();
                self.convert(&hits);
            }
            off if (offset::THRESHOLDS..offset::threshold(MAX_CHANNELS)).contains(&off) => {
                self.thresholds[(off - offset::THRESHOLDS) / 2] = value;
            }
            _ => {}
        }
    }

    /// Move buffer words into `dest` as a block transfer would.
    fn block_read(&mut self, dest: &mut [u32], forced: Option<(usize, bool)>) -> DmaCompletion {
        if let Some((words, berr)) = forced {
            let words = words.min(dest.len());
            for slot in dest.iter_mut().take(words) {
                *slot = self.pop_word().to_be();
            }
            if berr {
                self.bit_set1 |= BitSet1::BERR_FLAG.bits();
            }
            return DmaCompletion::Stopped { bytes: words * 4 };
        }

        let block_end = self.control(Control1::BLOCK_END);
        let berr = self.control(Control1::BERR_ENABLE);
        let mut n = 0;
        while n < dest.len() && !self.fifo.is_empty() {
            let word = self.pop_word();
            dest[n] = word.to_be();
            n += 1;
            if block_end && is_trailer(word) {
                break;
            }
        }
        if n == dest.len() {
            return DmaCompletion::Done;
        }
        if berr || block_end {
            if self.control(Control1::ALIGN64) && n % 2 == 1 {
                dest[n] = TYPE_NOT_VALID.to_be();
                n += 1;
            }
            self.bit_set1 |= BitSet1::BERR_FLAG.bits();
            return DmaCompletion::Stopped { bytes: n * 4 };
        }
        for slot in &mut dest[n..] {
            *slot = TYPE_NOT_VALID.to_be();
        }
        DmaCompletion::Done
    }
}

/// One simulated V775 module.
pub struct SimulatedTdc {
    state: Mutex<TdcState>,
}

impl SimulatedTdc {
    fn new(geo: u8) -> Self {
        Self {
            state: Mutex::new(TdcState::new(geo)),
        }
    }

    /// Digitize one trigger with the given `(channel, value)` hits. Values
    /// above 0xfff are over range. Returns the event index stored, or `None`
    /// if the module is offline, full, or suppressed every hit.
    pub fn inject_event(&self, hits: &[(u8, u16)]) -> Option<u32> {
        self.state.lock().convert(hits)
    }

    /// Hits produced by every software gate.
    pub fn set_gate_hits(&self, hits: Vec<(u8, u16)>) {
        self.state.lock().gate_hits = hits;
    }

    /// Force the hardware event counter to `value` (24 bits).
    pub fn preset_event_counter(&self, value: u32) {
        self.state.lock().event_counter = value & mask::EVENT_COUNT;
    }

    /// Current hardware event counter.
    pub fn event_counter(&self) -> u32 {
        self.state.lock().event_counter
    }

    /// Make the slot empty (`false`) or populated again.
    pub fn set_present(&self, present: bool) {
        self.state.lock().present = present;
    }

    /// Change the identity the ROM reports.
    pub fn set_board_id(&self, board_id: u32) {
        self.state.lock().board_id = board_id;
    }

    /// Complete events in the output buffer.
    pub fn buffered_events(&self) -> usize {
        self.state.lock().buffered_events()
    }

    /// Words in the output buffer.
    pub fn buffered_words(&self) -> usize {
        self.state.lock().fifo.len()
    }

    /// Push a raw word into the output buffer, bypassing the framing.
    pub fn push_raw_word(&self, word: u32) {
        self.state.lock().fifo.push_back(word);
    }

    /// Peek a 16-bit register without side effects.
    pub fn register(&self, off: usize) -> u16 {
        self.state.lock().read16(off)
    }

    /// Level and vector the module asserts right now, if any.
    pub fn interrupt_request(&self) -> Option<(u8, u8)> {
        self.state.lock().interrupt_request()
    }
}

impl RegisterWindow for SimulatedTdc {
    fn read16(&self, off: usize) -> u16 {
        let state = self.state.lock();
        if !state.present {
            return 0xffff;
        }
        state.read16(off)
    }

    fn write16(&self, off: usize, value: u16) {
        let mut state = self.state.lock();
        if state.present {
            trace!(geo = state.geo, offset = off, value, "write16");
            state.write16(off, value);
        }
    }

    fn read32(&self, off: usize) -> u32 {
        let mut state = self.state.lock();
        if !state.present {
            return u32::MAX;
        }
        if off < offset::DATA_LEN {
            state.pop_word()
        } else {
            u32::from(state.read16(off))
        }
    }
}

impl fmt::Debug for SimulatedTdc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SimulatedTdc")
            .field("geo", &state.geo)
            .field("present", &state.present)
            .field("event_counter", &state.event_counter)
            .field("buffered_words", &state.fifo.len())
            .finish()
    }
}

/// Window onto an address nothing decodes.
struct FloatingBus;

impl RegisterWindow for FloatingBus {
    fn read16(&self, _offset: usize) -> u16 {
        0xffff
    }

    fn write16(&self, _offset: usize, _value: u16) {}

    fn read32(&self, _offset: usize) -> u32 {
        u32::MAX
    }
}

/// Fault applied to the next block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaFault {
    /// `start` fails with `status`.
    RefuseStart { status: i32 },
    /// `wait` reports an engine failure with `status`.
    Fail { status: i32 },
    /// The transfer stops after `words` words; `berr` decides whether the
    /// module flags the bus error.
    StopAfter { words: usize, berr: bool },
}

#[derive(Debug, Default)]
struct DmaState {
    job: Option<(usize, usize)>,
    fault: Option<DmaFault>,
}

#[derive(Default)]
struct IrqTable {
    handlers: HashMap<u8, (u8, InterruptHandler)>,
    enabled: u8,
    refuse_connect: Option<i32>,
}

/// A VME crate of simulated V775 modules.
pub struct SimulatedCrate {
    base_address: u32,
    increment: u32,
    boards: Vec<Arc<SimulatedTdc>>,
    dma: Mutex<DmaState>,
    irq: Mutex<IrqTable>,
}

impl SimulatedCrate {
    /// `slots` modules starting at bus address `base_address`, spaced by
    /// `increment`. The geographic address of each module is its slot.
    pub fn new(base_address: u32, increment: u32, slots: usize) -> Self {
        Self {
            base_address,
            increment,
            boards: (0..slots).map(|slot| Arc::new(SimulatedTdc::new(slot as u8))).collect(),
            dma: Mutex::new(DmaState::default()),
            irq: Mutex::new(IrqTable::default()),
        }
    }

    /// Module in `slot`.
    ///
    /// # Panics
    ///
    /// If `slot` is not below the slot count given to [`SimulatedCrate::new`].
    pub fn board(&self, slot: usize) -> &Arc<SimulatedTdc> {
        &self.boards[slot]
    }

    /// Number of slots.
    pub fn slots(&self) -> usize {
        self.boards.len()
    }

    fn slot_for_bus(&self, bus_address: u32) -> Option<(usize, u32)> {
        let rel = bus_address.checked_sub(self.base_address)?;
        let slot = if self.increment == 0 {
            0
        } else {
            (rel / self.increment) as usize
        };
        let within = rel - slot as u32 * self.increment;
        (slot < self.boards.len() && within < MODULE_SPAN).then_some((slot, within))
    }

    fn slot_for_local(&self, local: LocalAddress) -> Option<(usize, u32)> {
        let bus = local.0.checked_sub(LOCAL_OFFSET)?;
        self.slot_for_bus(u32::try_from(bus).ok()?)
    }

    /// Apply `fault` to the next block transfer.
    pub fn inject_dma_fault(&self, fault: DmaFault) {
        self.dma.lock().fault = Some(fault);
    }

    /// Make the next `connect` call fail with `status`.
    pub fn refuse_interrupt_connect(&self, status: i32) {
        self.irq.lock().refuse_connect = Some(status);
    }

    /// Vector connected on `level`.
    pub fn connected_vector(&self, level: u8) -> Option<u8> {
        self.irq.lock().handlers.get(&level).map(|(vector, _)| *vector)
    }

    /// True if `level` is unmasked at the simulated CPU.
    pub fn level_enabled(&self, level: u8) -> bool {
        level < 8 && self.irq.lock().enabled & (1 << level) != 0
    }

    /// Dispatch an interrupt on `level` with `vector` whatever the modules
    /// assert. Returns false if the level is masked or nothing is connected
    /// for that vector.
    pub fn raise_interrupt(&self, level: u8, vector: u8) -> bool {
        let handler = {
            let irq = self.irq.lock();
            if level >= 8 || irq.enabled & (1 << level) == 0 {
                return false;
            }
            irq.handlers
                .get(&level)
                .filter(|(connected, _)| *connected == vector)
                .map(|(_, handler)| handler.clone())
        };
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    /// Run the handler of every module asserting an interrupt on an enabled
    /// level with a matching vector. Returns the number of handlers run.
    ///
    /// No simulator lock is held while a handler runs, so the handler may
    /// use the driver freely.
    pub fn deliver_interrupts(&self) -> usize {
        self.boards
            .iter()
            .filter_map(|board| board.interrupt_request())
            .filter(|&(level, vector)| self.raise_interrupt(level, vector))
            .count()
    }
}

impl fmt::Debug for SimulatedCrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedCrate")
            .field("base_address", &format_args!("{:#x}", self.base_address))
            .field("increment", &format_args!("{:#x}", self.increment))
            .field("boards", &self.boards)
            .finish()
    }
}

impl VmeBus for SimulatedCrate {
    fn translate(&self, space: AddressSpace, bus_address: u32) -> Option<LocalAddress> {
        if space != AddressSpace::for_address(self.base_address) {
            return None;
        }
        self.slot_for_bus(bus_address)?;
        Some(LocalAddress(LOCAL_OFFSET + bus_address as usize))
    }

    fn probe(&self, local: LocalAddress, _width: DataWidth) -> bool {
        self.slot_for_local(local)
            .map(|(slot, _)| self.boards[slot].state.lock().present)
            .unwrap_or(false)
    }

    fn window(&self, local: LocalAddress, _width: DataWidth) -> Arc<dyn RegisterWindow> {
        match self.slot_for_local(local) {
            Some((slot, 0)) => self.boards[slot].clone() as Arc<dyn RegisterWindow>,
            _ => Arc::new(FloatingBus),
        }
    }
}

impl DmaEngine for SimulatedCrate {
    fn start(&self, source: u32, byte_count: usize) -> Result<(), i32> {
        let mut dma = self.dma.lock();
        if let Some(DmaFault::RefuseStart { status }) = dma.fault {
            dma.fault = None;
            return Err(status);
        }
        let (slot, within) = self.slot_for_bus(source).ok_or(-1)?;
        if within as usize >= offset::DATA_LEN {
            return Err(-1);
        }
        dma.job = Some((slot, byte_count / 4));
        Ok(())
    }

    fn wait(&self, dest: &mut [u32]) -> DmaCompletion {
        let (job, fault) = {
            let mut dma = self.dma.lock();
            (dma.job.take(), dma.fault.take())
        };
        let Some((slot, words)) = job else {
            return DmaCompletion::Failed { status: -1 };
        };
        let words = words.min(dest.len());
        let forced = match fault {
            Some(DmaFault::Fail { status }) => return DmaCompletion::Failed { status },
            Some(DmaFault::StopAfter { words, berr }) => Some((words, berr)),
            _ => None,
        };
        self.boards[slot]
            .state
            .lock()
            .block_read(&mut dest[..words], forced)
    }

    fn word_order(&self) -> WordOrder {
        WordOrder::Bus
    }
}

impl InterruptController for SimulatedCrate {
    fn connect(&self, vector: u8, level: u8, handler: InterruptHandler) -> Result<(), i32> {
        let mut irq = self.irq.lock();
        if let Some(status) = irq.refuse_connect.take() {
            return Err(status);
        }
        irq.handlers.insert(level, (vector, handler));
        Ok(())
    }

    fn disconnect(&self, level: u8) -> Result<(), i32> {
        self.irq.lock().handlers.remove(&level);
        Ok(())
    }

    fn enable_level(&self, level: u8) {
        if level < 8 {
            self.irq.lock().enabled |= 1 << level;
        }
    }

    fn disable_level(&self, level: u8) {
        if level < 8 {
            self.irq.lock().enabled &= !(1 << level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{header_word_count, is_header, trailer_event_count};

    fn board() -> SimulatedTdc {
        let tdc = SimulatedTdc::new(3);
        tdc.write16(offset::BIT_SET2, (BitSet2::OVER_RANGE | BitSet2::LOW_THRESHOLD).bits());
        tdc
    }

    #[test]
    fn test_counter_starts_at_no_events() {
        let tdc = board();
        assert_eq!(tdc.event_counter(), NO_EVENTS);
        assert_eq!(tdc.read16(offset::EVENT_COUNT_LOW), 0xffff);
        assert_eq!(tdc.read16(offset::EVENT_COUNT_HIGH), 0x00ff);
        assert_ne!(tdc.read16(offset::STATUS2) & Status2::BUFFER_EMPTY.bits(), 0);
    }

    #[test]
    fn test_gate_frames_event() {
        let tdc = board();
        tdc.set_gate_hits(vec![(1, 10), (2, 20)]);
        tdc.write16(offset::SW_COMM, 1);
        assert_eq!(tdc.event_counter(), 0);
        assert_ne!(tdc.read16(offset::STATUS1) & Status1::DATA_READY.bits(), 0);

        let header = tdc.read32(0);
        assert!(is_header(header));
        assert_eq!(header_word_count(header), 2);
        tdc.read32(4);
        tdc.read32(8);
        let trailer = tdc.read32(12);
        assert_eq!(trailer_event_count(trailer), 0);
        assert_eq!(tdc.read32(16), TYPE_NOT_VALID);
    }

    #[test]
    fn test_overflow_suppressed_unless_kept() {
        let tdc = SimulatedTdc::new(0);
        assert_eq!(tdc.inject_event(&[(0, 0x1fff)]), None);
        tdc.write16(offset::BIT_SET2, BitSet2::OVER_RANGE.bits());
        assert_eq!(tdc.inject_event(&[(0, 0x1fff)]), Some(0));
    }

    #[test]
    fn test_offline_ignores_gates() {
        let tdc = board();
        tdc.write16(offset::BIT_SET2, BitSet2::OFFLINE.bits());
        tdc.write16(offset::SW_COMM, 1);
        assert_eq!(tdc.buffered_events(), 0);
    }

    #[test]
    fn test_buffer_full_after_32_events() {
        let tdc = board();
        for _ in 0..40 {
            tdc.inject_event(&[(0, 1)]);
        }
        assert_eq!(tdc.buffered_events(), FIFO_EVENTS);
        assert_ne!(tdc.read16(offset::STATUS2) & Status2::BUFFER_FULL.bits(), 0);
        assert_eq!(tdc.event_counter(), FIFO_EVENTS as u32 - 1);
    }

    #[test]
    fn test_clear_data_resets_counter() {
        let tdc = board();
        tdc.inject_event(&[(0, 1)]);
        tdc.write16(offset::BIT_SET2, BitSet2::CLEAR_DATA.bits());
        tdc.write16(offset::BIT_CLEAR2, BitSet2::CLEAR_DATA.bits());
        assert_eq!(tdc.buffered_words(), 0);
        assert_eq!(tdc.event_counter(), NO_EVENTS);
    }

    #[test]
    fn test_absent_board_floats() {
        let tdc = board();
        tdc.set_present(false);
        assert_eq!(tdc.read16(offset::FIRMWARE_REV), 0xffff);
    }

    #[test]
    fn test_translation_window() {
        let sim = SimulatedCrate::new(0x18_0000, 0x1_0000, 2);
        assert!(sim.translate(AddressSpace::A24, 0x18_0000).is_some());
        assert!(sim.translate(AddressSpace::A24, 0x1a_0000).is_none());
        assert!(sim.translate(AddressSpace::A32, 0x18_0000).is_none());
        let local = sim.translate(AddressSpace::A24, 0x19_0000).unwrap();
        assert!(sim.probe(local.offset(offset::FIRMWARE_REV), DataWidth::D16));
    }
}
