//! Interrupt-driven acquisition.
//!
//! One module at a time can be the interrupt source. The module raises its
//! VME interrupt once the number of buffered events reaches the trigger
//! threshold; the service routine either hands control to a user routine
//! or drains that many events from the buffer.
//!
//! ```text
//! Unarmed --connect--> Connected --enable--> Armed --disable(true)--> Unarmed
//!                                            Armed --disable(false)--> Suspended
//!                                        Suspended --resume--> Armed
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bus::InterruptHandler;
use crate::device::Tdc775;
use crate::error::{C775Error, Result};
use crate::registers::{offset, DEFAULT_INT_LEVEL, DEFAULT_INT_VECTOR};

/// Largest interrupt threshold the trigger register accepts.
pub const MAX_TRIGGER_EVENTS: u16 = 31;
/// Lowest vector usable for the module (below are CPU exceptions).
pub const MIN_VECTOR: u16 = 32;
/// Highest VME interrupt level.
pub const MAX_LEVEL: u16 = 7;

/// Position in the arming state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptState {
    /// No service routine installed.
    #[default]
    Unarmed,
    /// Service routine installed, no module programmed.
    Connected,
    /// Source module programmed and the CPU level enabled.
    Armed,
    /// Trigger zeroed by `disable(false)`; `resume` re-arms.
    Suspended,
}

impl InterruptState {
    /// True for `Armed` and `Suspended`.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Armed | Self::Suspended)
    }
}

/// What the service routine does when the module interrupts.
#[derive(Clone, Default)]
pub enum IsrRoutine {
    /// Drain the triggered events and throw them away.
    #[default]
    Default,
    /// Run a caller-supplied routine instead of the drain.
    User(Arc<dyn Fn() + Send + Sync>),
}

impl IsrRoutine {
    /// Wrap a closure as a user routine.
    pub fn user<F>(routine: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::User(Arc::new(routine))
    }
}

impl fmt::Debug for IsrRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::User(_) => f.write_str("User(..)"),
        }
    }
}

/// Driver-wide interrupt bookkeeping, kept under the bus guard.
#[derive(Debug, Default)]
pub(crate) struct InterruptContext {
    pub(crate) state: InterruptState,
    pub(crate) source: Option<usize>,
    pub(crate) threshold: u16,
    pub(crate) level: u8,
    pub(crate) vector: u8,
    pub(crate) routine: IsrRoutine,
    pub(crate) count: u64,
}

impl InterruptContext {
    fn snapshot(&self) -> InterruptStatus {
        InterruptStatus {
            state: self.state,
            source: self.source,
            level: self.level,
            vector: self.vector,
            threshold: self.threshold,
            count: self.count,
        }
    }
}

/// Snapshot of the interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptStatus {
    /// Arming state
    pub state: InterruptState,
    /// Module armed as the interrupt source
    pub source: Option<usize>,
    /// Connected VME level
    pub level: u8,
    /// Connected vector
    pub vector: u8,
    /// Events per interrupt
    pub threshold: u16,
    /// Interrupts serviced since the last `enable`.
    pub count: u64,
}

fn resolve_level(level: u16) -> Result<u8> {
    match level {
        0 => Ok(DEFAULT_INT_LEVEL),
        1..=MAX_LEVEL => Ok(level as u8),
        _ => Err(C775Error::out_of_range(
            "interrupt level",
            u32::from(level),
            1,
            u32::from(MAX_LEVEL),
        )),
    }
}

fn resolve_vector(vector: u16) -> Result<u8> {
    match vector {
        0 => Ok(DEFAULT_INT_VECTOR),
        MIN_VECTOR..=255 => Ok(vector as u8),
        _ => Err(C775Error::out_of_range(
            "interrupt vector",
            u32::from(vector),
            u32::from(MIN_VECTOR),
            255,
        )),
    }
}

impl Tdc775 {
    /// Install the service routine on `vector` at `level`.
    ///
    /// A zero level or vector selects the defaults (level 4, vector 0xaa).
    /// Arguments are checked before anything is touched.
    ///
    /// # Errors
    ///
    /// - [`C775Error::AlreadyArmed`] while a source is armed or suspended
    /// - [`C775Error::OutOfRange`] for a level above 7 or a vector outside 32-255
    /// - [`C775Error::InterruptRegistration`] if the host refuses the vector
    pub fn connect(&self, routine: IsrRoutine, level: u16, vector: u16) -> Result<()> {
        {
            let state = self.lock();
            if state.interrupt.state.is_running() {
                return Err(C775Error::AlreadyArmed {
                    source_id: state.interrupt.source,
                });
            }
        }
        let level = resolve_level(level)?;
        let vector = resolve_vector(vector)?;

        let interrupts = &self.inner.platform.interrupts;
        let registration = |status| C775Error::InterruptRegistration {
            vector,
            level,
            status,
        };
        interrupts.disconnect(level).map_err(registration)?;

        let weak = self.downgrade();
        let handler: InterruptHandler = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Tdc775::from_inner(inner).service_interrupt();
            }
        });
        interrupts.connect(vector, level, handler).map_err(registration)?;

        let mut state = self.lock();
        let ctx = &mut state.interrupt;
        // A source may have been armed while the guard was released.
        if ctx.state.is_running() {
            return Err(C775Error::AlreadyArmed {
                source_id: ctx.source,
            });
        }
        ctx.routine = routine;
        ctx.level = level;
        ctx.vector = vector;
        ctx.state = InterruptState::Connected;
        info!(level, vector, routine = ?ctx.routine, "Interrupt service routine connected");
        Ok(())
    }

    /// Arm module `id` to interrupt every `threshold` events (1-31).
    pub fn enable_interrupts(&self, id: usize, threshold: u16) -> Result<()> {
        let mut state = self.lock();
        if state.interrupt.state.is_running() {
            return Err(C775Error::AlreadyArmed {
                source_id: state.interrupt.source,
            });
        }
        state.registry.get(id)?;
        if threshold == 0 || threshold > MAX_TRIGGER_EVENTS {
            return Err(C775Error::out_of_range(
                "event trigger",
                u32::from(threshold),
                1,
                u32::from(MAX_TRIGGER_EVENTS),
            ));
        }

        let (level, vector) = (state.interrupt.level, state.interrupt.vector);
        if level != 0 {
            self.inner.platform.interrupts.enable_level(level);
        }

        let ctx = &mut state.interrupt;
        ctx.threshold = threshold;
        ctx.count = 0;
        ctx.source = Some(id);
        ctx.state = InterruptState::Armed;

        let regs = state.registry.get(id)?.regs();
        regs.write(offset::INT_VECTOR, u16::from(vector));
        regs.write(offset::INT_LEVEL, u16::from(level));
        regs.write(offset::EVENT_TRIGGER, threshold);
        info!(id, threshold, level, vector, "TDC interrupts enabled");
        Ok(())
    }

    /// Stop interrupts from the armed module.
    ///
    /// `full` disarms completely and clears the module's level and vector.
    /// Otherwise only the trigger is zeroed, the context moves to
    /// `Suspended` and a task waiting in [`Tdc775::wait_suspended`] wakes.
    pub fn disable_interrupts(&self, full: bool) -> Result<()> {
        {
            let mut state = self.lock();
            let Some(id) = state.interrupt.source else {
                return Err(C775Error::NotArmed);
            };
            let level = state.interrupt.level;
            if level != 0 {
                self.inner.platform.interrupts.disable_level(level);
            }

            let regs = state.registry.get(id)?.regs();
            regs.write(offset::EVENT_TRIGGER, 0);
            if full {
                regs.write(offset::INT_LEVEL, 0);
                regs.write(offset::INT_VECTOR, 0);
                state.interrupt.state = InterruptState::Unarmed;
                state.interrupt.source = None;
                info!(id, "TDC interrupts disabled");
                return Ok(());
            }
            state.interrupt.state = InterruptState::Suspended;
            debug!(id, "TDC interrupts suspended");
        }
        self.inner.suspended.notify_one();
        Ok(())
    }

    /// Re-arm a suspended source with its saved threshold.
    ///
    /// # Errors
    ///
    /// - [`C775Error::NotArmed`] if no source was enabled
    /// - [`C775Error::AlreadyTriggering`] if the trigger register is non-zero
    pub fn resume_interrupts(&self) -> Result<()> {
        let mut state = self.lock();
        let Some(id) = state.interrupt.source else {
            return Err(C775Error::NotArmed);
        };
        if !state.interrupt.state.is_running() {
            return Err(C775Error::NotArmed);
        }
        let regs = state.registry.get(id)?.regs();
        if regs.event_trigger() != 0 {
            warn!(id, "Interrupts already enabled");
            return Err(C775Error::AlreadyTriggering);
        }

        let level = state.interrupt.level;
        if level != 0 {
            self.inner.platform.interrupts.enable_level(level);
        }
        regs.write(offset::EVENT_TRIGGER, state.interrupt.threshold);
        state.interrupt.state = InterruptState::Armed;
        debug!(id, threshold = state.interrupt.threshold, "TDC interrupts resumed");
        Ok(())
    }

    /// Wait until interrupts are suspended with `disable_interrupts(false)`.
    ///
    /// A suspension that happened with nobody waiting is remembered, so the
    /// next call returns immediately.
    pub async fn wait_suspended(&self) {
        self.inner.suspended.notified().await;
    }

    /// Current interrupt context.
    pub fn interrupt_status(&self) -> InterruptStatus {
        self.lock().interrupt.snapshot()
    }

    /// Service routine called by the interrupt collaborator.
    pub(crate) fn service_interrupt(&self) {
        let (level, source, routine) = {
            let mut state = self.lock();
            let ctx = &mut state.interrupt;
            ctx.count += 1;
            (ctx.level, ctx.source, ctx.routine.clone())
        };
        let interrupts = &self.inner.platform.interrupts;
        interrupts.disable_level(level);

        match routine {
            IsrRoutine::User(routine) => routine(),
            IsrRoutine::Default => match source {
                Some(id) => {
                    if let Err(err) = self.drain_triggered(id) {
                        error!(id, error = %err, "Interrupt drain failed");
                    }
                }
                None => error!("Interrupt with no source module"),
            },
        }

        interrupts.enable_level(level);
    }

    /// Throw away up to one trigger threshold worth of events.
    fn drain_triggered(&self, id: usize) -> Result<usize> {
        let expected = self.with_module(id, |module| Ok(module.regs().event_trigger()))?;
        let mut drained = 0;
        while drained < expected && self.data_ready(id)? > 0 {
            self.increment_event(id)?;
            drained += 1;
        }
        if drained < expected {
            warn!(id, drained, expected, "Events dumped != events triggered");
        }
        debug!(id, events = expected, "Processed interrupt");
        Ok(usize::from(drained))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_defaults_and_bounds() {
        assert_eq!(resolve_level(0).unwrap(), DEFAULT_INT_LEVEL);
        assert_eq!(resolve_level(7).unwrap(), 7);
        assert!(resolve_level(8).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_vector_defaults_and_bounds() {
        assert_eq!(resolve_vector(0).unwrap(), DEFAULT_INT_VECTOR);
        assert_eq!(resolve_vector(32).unwrap(), 32);
        assert_eq!(resolve_vector(255).unwrap(), 255);
        assert!(resolve_vector(31).is_err());
        assert!(resolve_vector(256).is_err());
    }

    #[test]
    fn test_running_states() {
        assert!(!InterruptState::Unarmed.is_running());
        assert!(!InterruptState::Connected.is_running());
        assert!(InterruptState::Armed.is_running());
        assert!(InterruptState::Suspended.is_running());
    }

    #[test]
    fn test_routine_debug_hides_closure() {
        let routine = IsrRoutine::user(|| {});
        assert_eq!(format!("{:?}", routine), "User(..)");
        assert_eq!(format!("{:?}", IsrRoutine::default()), "Default");
    }
}
