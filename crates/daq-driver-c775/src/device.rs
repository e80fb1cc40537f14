//! Driver handle for a crate of V775 modules.
//!
//! [`Tdc775`] owns the module registry and the interrupt context. Both sit
//! behind a single bus guard: every register sequence that has to look
//! atomic from the bus side (a configuration write, a full event read, the
//! two halves of the event counter, a block transfer and its postamble) runs
//! with the guard held.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::bus::Platform;
use crate::error::{C775Error, Result};
use crate::interrupt::InterruptContext;
use crate::registers::{BitSet2, MIN_FSR_NS};
use crate::registers::{fsr_to_register, offset};
use crate::registry::{CrateLayout, Module, ModuleRegistry};

/// Everything protected by the bus guard.
pub(crate) struct DriverState {
    pub(crate) registry: ModuleRegistry,
    pub(crate) interrupt: InterruptContext,
}

pub(crate) struct DriverInner {
    pub(crate) platform: Platform,
    state: Mutex<DriverState>,
    /// Signalled when interrupts are suspended with `disable(false)`.
    pub(crate) suspended: Notify,
}

/// Handle to the V775 driver.
///
/// Cloning is cheap and shares the registry, the interrupt context and the
/// bus guard. The interrupt service routine holds only a weak reference, so
/// dropping every handle tears the driver down even while a vector is still
/// connected.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use daq_driver_c775::{sim::SimulatedCrate, Platform, Tdc775};
///
/// # fn example() -> daq_driver_c775::Result<()> {
/// let sim = Arc::new(SimulatedCrate::new(0x18_0000, 0x1_0000, 2));
/// let tdc = Tdc775::new(Platform::from_shared(sim.clone()));
///
/// let found = tdc.initialize(0x18_0000, 0x1_0000, 2, 0)?;
/// assert_eq!(found, 2);
///
/// sim.board(0).inject_event(&[(0, 100), (7, 2000)]);
/// let mut words = Vec::new();
/// assert_eq!(tdc.read_event(0, &mut words)?, 4);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Tdc775 {
    pub(crate) inner: Arc<DriverInner>,
}

impl Tdc775 {
    /// Create a driver bound to `platform`. No module is usable before
    /// [`Tdc775::initialize`].
    pub fn new(platform: Platform) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                platform,
                state: Mutex::new(DriverState {
                    registry: ModuleRegistry::new(),
                    interrupt: InterruptContext::default(),
                }),
                suspended: Notify::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<DriverInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<DriverInner> {
        Arc::downgrade(&self.inner)
    }

    /// Take the bus guard.
    pub(crate) fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.inner.state.lock()
    }

    /// Run `f` on module `id` with the bus guard held.
    pub(crate) fn with_module<F, R>(&self, id: usize, f: F) -> Result<R>
    where
        F: FnOnce(&mut Module) -> Result<R>,
    {
        let mut state = self.lock();
        let module = state.registry.get_mut(id)?;
        f(module)
    }

    /// Discover the crate and bring every module found into a known state.
    ///
    /// Looks for `count` modules starting at bus address `base`, spaced by
    /// `increment`. A zero `increment` or `count` looks for one module.
    /// Returns the number of modules initialized.
    ///
    /// # Errors
    ///
    /// - [`C775Error::OutOfRange`] for a zero base address or more than 20 modules
    /// - [`C775Error::AddressTranslation`] if the bus layer cannot map `base`
    /// - [`C775Error::Discovery`] if a slot fails its probe or identity check;
    ///   the modules before it are initialized and stay usable
    pub fn initialize(&self, base: u32, increment: u32, count: usize, crate_id: u16) -> Result<usize> {
        self.initialize_layout(&CrateLayout::new(base, increment, count, crate_id))
    }

    /// [`Tdc775::initialize`] taking a [`CrateLayout`].
    pub fn initialize_layout(&self, layout: &CrateLayout) -> Result<usize> {
        let mut state = self.lock();
        let (mut registry, failure) =
            match ModuleRegistry::discover(self.inner.platform.bus.as_ref(), layout) {
                Ok(found) => found,
                Err(err @ C775Error::AddressTranslation { .. }) => {
                    state.registry = ModuleRegistry::new();
                    self.disarm(&mut state.interrupt);
                    return Err(err);
                }
                Err(err) => return Err(err),
            };

        for (_, module) in registry.modules_mut() {
            reset_module(module, layout.crate_id);
        }
        let initialized = registry.count();
        state.registry = registry;
        self.disarm(&mut state.interrupt);
        drop(state);

        match failure {
            Some(reason) => {
                warn!(initialized, %reason, "Unable to initialize all TDC modules");
                Err(C775Error::Discovery {
                    initialized,
                    reason,
                })
            }
            None => {
                info!(initialized, crate_id = layout.crate_id, "TDC crate initialized");
                Ok(initialized)
            }
        }
    }

    /// Forget the interrupt source and mask its CPU level. The registry the
    /// context pointed into is being replaced.
    fn disarm(&self, ctx: &mut InterruptContext) {
        if ctx.level != 0 {
            self.inner.platform.interrupts.disable_level(ctx.level);
        }
        *ctx = InterruptContext::default();
    }

    /// Number of initialized modules.
    pub fn module_count(&self) -> usize {
        self.lock().registry.count()
    }

    /// True if `id` refers to an initialized module.
    pub fn is_initialized(&self, id: usize) -> bool {
        self.lock().registry.contains(id)
    }

    /// Bus address of module `id`.
    pub fn bus_address(&self, id: usize) -> Result<u32> {
        self.with_module(id, |module| Ok(module.bus_address))
    }
}

impl std::fmt::Debug for Tdc775 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tdc775")
            .field("modules", &self.module_count())
            .finish()
    }
}

/// Standard reset sequence applied to every module after discovery.
fn reset_module(module: &mut Module, crate_id: u16) {
    let regs = module.regs();
    regs.soft_reset();
    regs.data_reset();
    regs.write(offset::INT_LEVEL, 0);
    regs.write(offset::EVENT_TRIGGER, 0);
    regs.write(offset::CRATE_SELECT, crate_id);
    regs.clear2(BitSet2::ALL_TRIGGER);
    regs.clear2(BitSet2::EMPTY_PROG);
    regs.write(offset::FSR, fsr_to_register(MIN_FSR_NS));
    // Overflow and underflow suppression off.
    regs.set2(BitSet2::OVER_RANGE | BitSet2::LOW_THRESHOLD);
    module.counters.reset();
}
