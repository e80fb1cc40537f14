//! The 24-bit event counter is read in two halves. Under the bus guard no
//! reader may see a torn value, even while the low half rolls over.
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_counter_never_torn` | Gate, poll and interrupt paths across a 16-bit rollover |
//! | `test_counter_wraps_at_24_bits` | Host counters follow the hardware wrap |

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use common::initialized;
use daq_driver_c775::IsrRoutine;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COUNTER_MASK: u32 = 0x00ff_ffff;

/// Distance of `value` from `start` in the wrapped 24-bit space.
fn advanced(start: u32, value: u32) -> u32 {
    value.wrapping_sub(start) & COUNTER_MASK
}

fn assert_monotonic(start: u32, gates: u32, seen: &[u32]) {
    let mut previous = 0;
    for &value in seen {
        let step = advanced(start, value);
        assert!(
            step <= gates,
            "counter {value:#08x} outside {start:#08x}..={:#08x}",
            (start + gates) & COUNTER_MASK
        );
        assert!(step >= previous, "counter went back to {value:#08x}");
        previous = step;
    }
}

#[test]
fn test_counter_never_torn() {
    let mut rng = StdRng::seed_from_u64(0xd775);
    for _ in 0..4 {
        let (sim, tdc) = initialized(1);
        let start = 0x00_fff0 + rng.gen_range(0..8u32);
        let gates: u32 = rng.gen_range(64..=256);
        sim.board(0).preset_event_counter(start);

        let from_interrupt = Arc::new(Mutex::new(Vec::new()));
        let routine = {
            let tdc = tdc.clone();
            let seen = from_interrupt.clone();
            move || {
                if let Ok(count) = tdc.event_count(0) {
                    seen.lock().push(count);
                }
            }
        };
        tdc.connect(IsrRoutine::user(routine), 0, 0).unwrap();
        tdc.enable_interrupts(0, 1).unwrap();

        let done = AtomicBool::new(false);
        let polled = thread::scope(|scope| {
            scope.spawn(|| {
                for _ in 0..gates {
                    tdc.gate(0).unwrap();
                    tdc.increment_event(0).unwrap();
                }
                done.store(true, Ordering::SeqCst);
            });
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    sim.raise_interrupt(4, 0xaa);
                }
            });
            let poller = scope.spawn(|| {
                let mut seen = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    seen.push(tdc.event_count(0).unwrap());
                }
                seen
            });
            poller.join().unwrap()
        });

        assert_monotonic(start, gates, &polled);
        assert_monotonic(start, gates, &from_interrupt.lock());

        let expected = (start + gates) & COUNTER_MASK;
        assert_eq!(tdc.event_count(0).unwrap(), expected);
        assert_eq!(sim.board(0).event_counter(), expected);
        tdc.disable_interrupts(true).unwrap();
    }
}

#[test]
fn test_counter_wraps_at_24_bits() {
    let (sim, tdc) = initialized(1);
    sim.board(0).preset_event_counter(0x00ff_fffd);

    let mut trailers = Vec::new();
    for _ in 0..4 {
        tdc.gate(0).unwrap();
        let mut words = Vec::new();
        tdc.read_event(0, &mut words).unwrap();
        trailers.push(tdc.last_event_read(0).unwrap());
    }
    assert_eq!(
        trailers,
        vec![Some(0x00ff_fffe), Some(0x00ff_ffff), Some(0), Some(1)]
    );
    assert_eq!(tdc.event_count(0).unwrap(), 1);
    assert_eq!(tdc.data_ready(0).unwrap(), 0);
}
