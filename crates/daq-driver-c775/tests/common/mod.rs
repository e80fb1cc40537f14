//! Shared fixtures for the V775 integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use daq_driver_c775::sim::SimulatedCrate;
use daq_driver_c775::{Platform, Tdc775};

/// Bus address of slot 0 in every fixture crate.
pub const BASE: u32 = 0x18_0000;
/// Distance between slots.
pub const STEP: u32 = 0x1_0000;

/// Simulated crate with `slots` modules and a driver bound to it, not yet initialized.
pub fn simulated(slots: usize) -> (Arc<SimulatedCrate>, Tdc775) {
    let sim = Arc::new(SimulatedCrate::new(BASE, STEP, slots));
    let tdc = Tdc775::new(Platform::from_shared(sim.clone()));
    (sim, tdc)
}

/// Simulated crate with every module initialized.
pub fn initialized(slots: usize) -> (Arc<SimulatedCrate>, Tdc775) {
    let (sim, tdc) = simulated(slots);
    let found = tdc.initialize(BASE, STEP, slots, 0).expect("initialize");
    assert_eq!(found, slots);
    (sim, tdc)
}
