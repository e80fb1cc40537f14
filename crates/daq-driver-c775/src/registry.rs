//! Module registry and crate discovery.
//!
//! The registry is a fixed table of [`MAX_MODULES`] slots indexed by the
//! caller-assigned module id. Slots are filled only by discovery and are
//! never reallocated afterwards; an absent module is an empty slot.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bus::{AddressSpace, DataWidth, LocalAddress, RegisterWindow, VmeBus};
use crate::error::{C775Error, DiscoveryFailure, Result};
use crate::registers::{mask, offset, Regs, BOARD_ID};

/// Maximum number of modules in one crate.
pub const MAX_MODULES: usize = 20;

/// Placement of the modules in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrateLayout {
    /// Bus address of module 0
    pub base_address: u32,
    /// Distance between consecutive modules
    #[serde(default)]
    pub address_increment: u32,
    /// Number of modules to look for
    #[serde(default = "default_modules")]
    pub modules: usize,
    /// Value programmed into every crate select register
    #[serde(default)]
    pub crate_id: u16,
}

fn default_modules() -> usize {
    1
}

impl CrateLayout {
    /// Create a layout.
    pub fn new(base_address: u32, address_increment: u32, modules: usize, crate_id: u16) -> Self {
        Self {
            base_address,
            address_increment,
            modules,
            crate_id,
        }
    }

    /// Number of slots discovery will actually visit.
    pub fn effective_modules(&self) -> usize {
        if self.address_increment == 0 || self.modules == 0 {
            1
        } else {
            self.modules
        }
    }

    /// Bus address of slot `slot`.
    pub fn module_address(&self, slot: usize) -> u32 {
        self.base_address
            .wrapping_add((slot as u32).wrapping_mul(self.address_increment))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_address == 0 {
            return Err(C775Error::out_of_range("base address", 0, 1, u32::MAX));
        }
        if self.modules > MAX_MODULES {
            return Err(C775Error::out_of_range(
                "module count",
                self.modules as u32,
                1,
                MAX_MODULES as u32,
            ));
        }
        Ok(())
    }
}

/// Host-side event bookkeeping for one module.
///
/// Both values live in the 24-bit space of the hardware counter. "Nothing
/// read yet" behaves as index `0xffffff`, one before event 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Counters {
    pub(crate) event_count: u32,
    pub(crate) last_read: Option<u32>,
}

impl Counters {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    fn last_read_raw(&self) -> u32 {
        self.last_read.unwrap_or(mask::EVENT_COUNT)
    }

    pub(crate) fn set_last_read(&mut self, index: u32) {
        self.last_read = Some(index & mask::EVENT_COUNT);
    }

    pub(crate) fn advance_read(&mut self, events: u32) {
        let next = self.last_read_raw().wrapping_add(events) & mask::EVENT_COUNT;
        self.last_read = Some(next);
    }

    /// Signed distance between the hardware counter and the last event read.
    pub(crate) fn pending(&self) -> i32 {
        let diff = self.event_count.wrapping_sub(self.last_read_raw()) & mask::EVENT_COUNT;
        if diff & 0x0080_0000 != 0 {
            diff as i32 - 0x0100_0000
        } else {
            diff as i32
        }
    }
}

/// One discovered module.
pub(crate) struct Module {
    pub(crate) bus_address: u32,
    pub(crate) local: LocalAddress,
    regs: Arc<dyn RegisterWindow>,
    data: Arc<dyn RegisterWindow>,
    pub(crate) counters: Counters,
}

impl Module {
    pub(crate) fn regs(&self) -> Regs<'_> {
        Regs::new(self.regs.as_ref())
    }

    /// 32-bit word at `index` of the output buffer region.
    pub(crate) fn read_data(&self, index: usize) -> u32 {
        self.data.read32(offset::DATA + 4 * index)
    }
}

/// Fixed table of module slots.
pub(crate) struct ModuleRegistry {
    slots: Vec<Option<Module>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..MAX_MODULES).map(|_| None).collect(),
        }
    }

    pub(crate) fn get(&self, id: usize) -> Result<&Module> {
        self.slots
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(C775Error::NotInitialized { id })
    }

    pub(crate) fn get_mut(&mut self, id: usize) -> Result<&mut Module> {
        self.slots
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(C775Error::NotInitialized { id })
    }

    pub(crate) fn contains(&self, id: usize) -> bool {
        self.get(id).is_ok()
    }

    pub(crate) fn count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub(crate) fn modules_mut(&mut self) -> impl Iterator<Item = (usize, &mut Module)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_mut().map(|module| (id, module)))
    }

    /// Probe the crate and fill slots `0..n` until the first failure.
    ///
    /// A translation failure leaves the registry empty and is returned as an
    /// error. Probe or identity failures are returned alongside the modules
    /// found before them.
    pub(crate) fn discover(
        bus: &dyn VmeBus,
        layout: &CrateLayout,
    ) -> Result<(Self, Option<DiscoveryFailure>)> {
        layout.validate()?;

        let space = AddressSpace::for_address(layout.base_address);
        let base_local = bus.translate(space, layout.base_address).ok_or(
            C775Error::AddressTranslation {
                address: layout.base_address,
            },
        )?;
        debug!(
            base = layout.base_address,
            local = %base_local,
            am = space.address_modifier(),
            "Translated crate base address"
        );

        let mut registry = Self::new();
        let mut failure = None;

        for slot in 0..layout.effective_modules() {
            let step = slot * layout.address_increment as usize;
            let local = base_local.offset(step);
            let bus_address = layout.module_address(slot);

            if !bus.probe(local.offset(offset::FIRMWARE_REV), DataWidth::D16) {
                warn!(slot, address = bus_address, "No addressable board");
                failure = Some(DiscoveryFailure::NoBoard {
                    slot,
                    address: bus_address,
                });
                break;
            }

            let regs = bus.window(local, DataWidth::D16);
            let found = Regs::new(regs.as_ref()).board_id();
            if found != BOARD_ID {
                warn!(slot, found, expected = BOARD_ID, "Board ID does not match");
                failure = Some(DiscoveryFailure::IdentityMismatch { slot, found });
                break;
            }

            let data = bus.window(local, DataWidth::D32);
            info!(
                id = slot,
                address = bus_address,
                local = %local,
                "Initialized TDC"
            );
            registry.slots[slot] = Some(Module {
                bus_address,
                local,
                regs,
                data,
                counters: Counters::default(),
            });
        }

        Ok((registry, failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_module_count() {
        assert_eq!(CrateLayout::new(0x18_0000, 0, 5, 0).effective_modules(), 1);
        assert_eq!(CrateLayout::new(0x18_0000, 0x1_0000, 0, 0).effective_modules(), 1);
        assert_eq!(CrateLayout::new(0x18_0000, 0x1_0000, 3, 0).effective_modules(), 3);
        assert_eq!(
            CrateLayout::new(0x18_0000, 0x1_0000, 3, 0).module_address(2),
            0x1a_0000
        );
    }

    #[test]
    fn test_layout_validation() {
        assert!(CrateLayout::new(0, 0x1_0000, 1, 0).validate().is_err());
        assert!(CrateLayout::new(0x18_0000, 0x1_0000, 21, 0)
            .validate()
            .is_err());
        assert!(CrateLayout::new(0x18_0000, 0x1_0000, 20, 0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_pending_from_reset() {
        let mut counters = Counters::default();
        counters.event_count = 0x00ff_ffff;
        assert_eq!(counters.pending(), 0);

        counters.event_count = 0;
        assert_eq!(counters.pending(), 1);

        counters.set_last_read(0);
        assert_eq!(counters.pending(), 0);
    }

    #[test]
    fn test_pending_across_counter_wrap() {
        let mut counters = Counters::default();
        counters.set_last_read(0x00ff_fffe);
        counters.event_count = 0x0000_0001;
        assert_eq!(counters.pending(), 3);

        counters.set_last_read(0x0000_0005);
        assert_eq!(counters.pending(), -4);
    }

    #[test]
    fn test_advance_read_from_none() {
        let mut counters = Counters::default();
        counters.advance_read(1);
        assert_eq!(counters.last_read, Some(0));
        counters.advance_read(15);
        assert_eq!(counters.last_read, Some(15));
    }

    #[test]
    fn test_empty_registry_rejects_ids() {
        let registry = ModuleRegistry::new();
        assert_eq!(registry.count(), 0);
        assert!(matches!(
            registry.get(3),
            Err(C775Error::NotInitialized { id: 3 })
        ));
        assert!(registry.get(MAX_MODULES + 1).is_err());
    }
}
