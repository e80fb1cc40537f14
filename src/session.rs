//! Acquisition session against a simulated crate.
//!
//! A [`Session`] sizes a [`SimulatedCrate`] from the configuration, binds a
//! driver to it, initializes the modules and applies the acquisition
//! settings. The readout helpers gate the simulated modules and take the
//! events back out through the driver, the same way a run would against
//! real hardware.

use std::sync::Arc;
use std::time::Duration;

use daq_driver_c775::event::{header_word_count, is_header};
use daq_driver_c775::registers::{MAX_CHANNELS, MAX_WORDS_PER_EVENT};
use daq_driver_c775::sim::SimulatedCrate;
use daq_driver_c775::{
    BlockTransfer, C775Error, InterruptStatus, IsrRoutine, Platform, StatusReport, Tdc775,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, warn};

use crate::config::TdcConfig;
use crate::error::{AppError, AppResult};

/// Maximum wait for the suspension notice after an interrupt run.
const SUSPEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Driver bound to a simulated crate, initialized and configured.
pub struct Session {
    config: TdcConfig,
    sim: Arc<SimulatedCrate>,
    tdc: Tdc775,
    rng: StdRng,
}

impl Session {
    /// Build the crate, discover the modules and configure them.
    ///
    /// A partial discovery is accepted as long as one module came up.
    pub fn open(config: TdcConfig) -> AppResult<Self> {
        let layout = config.layout;
        let sim = Arc::new(SimulatedCrate::new(
            layout.base_address,
            layout.address_increment,
            layout.effective_modules(),
        ));
        let tdc = Tdc775::new(Platform::from_shared(sim.clone()));

        match tdc.initialize_layout(&layout) {
            Ok(found) => info!(found, "Crate ready"),
            Err(err @ C775Error::Discovery { .. }) if tdc.module_count() > 0 => {
                warn!(error = %err, "Continuing with a partial crate");
            }
            Err(err) => return Err(err.into()),
        }

        let rng = StdRng::seed_from_u64(config.simulation.seed);
        let session = Self {
            config,
            sim,
            tdc,
            rng,
        };
        session.configure()?;
        Ok(session)
    }

    fn configure(&self) -> AppResult<()> {
        let acq = &self.config.acquisition;
        for id in self.module_ids() {
            self.tdc.set_full_scale_range(id, acq.full_scale_range_ns)?;
            self.tdc.sparse(id, !acq.keep_overflow, !acq.keep_underflow)?;
            if acq.berr_enable {
                self.tdc.enable_berr(id)?;
            } else {
                self.tdc.disable_berr(id)?;
            }
            if acq.common_stop {
                self.tdc.common_stop(id)?;
            } else {
                self.tdc.common_start(id)?;
            }
        }
        debug!(modules = self.tdc.module_count(), "Acquisition settings applied");
        Ok(())
    }

    /// Driver handle.
    pub fn driver(&self) -> &Tdc775 {
        &self.tdc
    }

    /// Simulated crate behind the driver.
    pub fn simulated_crate(&self) -> &Arc<SimulatedCrate> {
        &self.sim
    }

    /// Ids of the initialized modules.
    pub fn module_ids(&self) -> Vec<usize> {
        (0..self.sim.slots())
            .filter(|&id| self.tdc.is_initialized(id))
            .collect()
    }

    /// Status of module `id`, or of every module.
    pub fn status(&self, id: Option<usize>) -> AppResult<Vec<StatusReport>> {
        let ids = match id {
            Some(id) => vec![id],
            None => self.module_ids(),
        };
        ids.into_iter()
            .map(|id| self.tdc.status(id).map_err(AppError::from))
            .collect()
    }

    /// Program the hits the next gates of module `id` produce.
    fn arm_hits(&mut self, id: usize) -> AppResult<()> {
        if !self.tdc.is_initialized(id) {
            return Err(C775Error::NotInitialized { id }.into());
        }
        let mut channels: Vec<u8> = (0..MAX_CHANNELS as u8).collect();
        channels.shuffle(&mut self.rng);
        let mut hits: Vec<(u8, u16)> = channels
            .into_iter()
            .take(self.config.simulation.hits_per_event)
            .map(|channel| (channel, self.rng.gen_range(0..0x1000)))
            .collect();
        hits.sort_unstable();
        self.sim.board(id).set_gate_hits(hits);
        Ok(())
    }

    /// Gate module `id` and read each event back one at a time.
    #[instrument(skip(self))]
    pub fn poll(&mut self, id: usize, events: usize) -> AppResult<Vec<Vec<u32>>> {
        let mut out = Vec::with_capacity(events);
        for _ in 0..events {
            self.arm_hits(id)?;
            self.tdc.gate(id)?;
            if self.tdc.data_ready(id)? == 0 {
                warn!(id, "Gate produced no event");
                continue;
            }
            let mut words = Vec::with_capacity(MAX_WORDS_PER_EVENT);
            self.tdc.read_event(id, &mut words)?;
            out.push(words);
        }
        info!(id, events = out.len(), "Polled readout finished");
        Ok(out)
    }

    /// Gate module `id` `events` times (at most 32) and move everything
    /// with one block transfer. Returns the words in host order.
    #[instrument(skip(self))]
    pub fn block(&mut self, id: usize, events: usize) -> AppResult<Vec<u32>> {
        let events = events.clamp(1, 32);
        for _ in 0..events {
            self.arm_hits(id)?;
            self.tdc.gate(id)?;
        }

        let mut buffer = vec![0u32; events * MAX_WORDS_PER_EVENT];
        let max_words = buffer.len();
        let words = match self.tdc.read_block(id, &mut buffer, max_words)? {
            BlockTransfer::TerminatedByDevice { words } => words,
            BlockTransfer::Complete => {
                self.tdc.increment_event_block(id, events as u32)?;
                max_words
            }
        };
        let order = self.tdc.dma_word_order();
        buffer.truncate(words);
        info!(id, words, "Block readout finished");
        Ok(buffer.into_iter().map(|w| order.to_native(w)).collect())
    }

    /// Interrupt-driven run on the configured source module: arm it,
    /// gate `triggers` times letting the default routine drain the events,
    /// then suspend and disarm. Returns the interrupt context as it stood
    /// at suspension.
    pub async fn interrupt_run(&mut self, threshold: u16, triggers: usize) -> AppResult<InterruptStatus> {
        let irq = self.config.interrupt.clone();
        let id = irq.source;
        self.tdc.connect(IsrRoutine::Default, irq.level, irq.vector)?;
        self.tdc.enable_interrupts(id, threshold)?;

        let waiter = tokio::spawn({
            let tdc = self.tdc.clone();
            async move { tdc.wait_suspended().await }
        });

        for _ in 0..triggers {
            self.arm_hits(id)?;
            self.tdc.gate(id)?;
            let serviced = self.sim.deliver_interrupts();
            if serviced > 0 {
                debug!(id, serviced, "Interrupts serviced");
            }
        }

        self.tdc.disable_interrupts(false)?;
        if tokio::time::timeout(SUSPEND_TIMEOUT, waiter).await.is_err() {
            warn!(id, "No suspension notice received");
        }
        let status = self.tdc.interrupt_status();
        self.tdc.disable_interrupts(true)?;
        info!(id, interrupts = status.count, "Interrupt run finished");
        Ok(status)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tdc", &self.tdc)
            .field("sim", &self.sim)
            .finish()
    }
}

/// Split a block of buffer words into framed events. Words outside a
/// header..trailer frame (alignment filler, not-valid words) are dropped.
pub fn split_events(words: &[u32]) -> Vec<&[u32]> {
    let mut events = Vec::new();
    let mut rest = words;
    while let Some(&first) = rest.first() {
        if !is_header(first) {
            rest = &rest[1..];
            continue;
        }
        let len = (header_word_count(first) + 2).min(rest.len());
        let (event, tail) = rest.split_at(len);
        events.push(event);
        rest = tail;
    }
    events
}

/// Parse a hex word as given on the command line (`0x` prefix optional).
pub fn parse_word(text: &str) -> AppResult<u32> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u32::from_str_radix(digits, 16).map_err(|_| AppError::InvalidWord(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_events_skips_filler() {
        let words = [
            0x0200_0100,
            0x0000_0011,
            0x0400_0000,
            0x0600_0000,
            0x0200_0000,
            0x0400_0001,
        ];
        let events = split_events(&words);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], &words[..3]);
        assert_eq!(events[1], &words[4..]);
    }

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("0x02000300").unwrap(), 0x0200_0300);
        assert_eq!(parse_word("4000007").unwrap(), 0x0400_0007);
        assert!(matches!(parse_word("0xZZ"), Err(AppError::InvalidWord(_))));
        assert!(parse_word("0x1_0000_0000").is_err());
    }
}
