//! Guarded configuration operations.
//!
//! | Test | Description |
//! |------|-------------|
//! | `test_full_scale_range_round_trip` | Every multiple of 4 in 140-1200 ns reads back |
//! | `test_full_scale_range_rejects` | Out of range leaves the register alone |
//! | `test_bit_set2_and_clear2` | Set/clear pair semantics |
//! | `test_crate_id_stamped_in_header` | Crate select register and event headers |
//! | `test_thresholds` | Per-channel thresholds and underflow suppression |
//! | `test_berr_enable_disable` | Control register bus error bits |
//! | `test_status_report` | Snapshot after a few events |

mod common;

use common::{initialized, BASE};
use daq_driver_c775::registers::{offset, MAX_FSR_NS, MIN_FSR_NS};
use daq_driver_c775::{BitSet2, C775Error, Control1, EventWord, RegisterWindow};

#[test]
fn test_full_scale_range_round_trip() {
    let (_sim, tdc) = initialized(1);
    assert_eq!(tdc.set_full_scale_range(0, 0).unwrap(), MIN_FSR_NS);
    for ns in (MIN_FSR_NS..=MAX_FSR_NS).step_by(4) {
        assert_eq!(tdc.set_full_scale_range(0, ns).unwrap(), ns);
        assert_eq!(tdc.set_full_scale_range(0, 0).unwrap(), ns);
    }
}

#[test]
fn test_full_scale_range_rejects() {
    let (sim, tdc) = initialized(1);
    tdc.set_full_scale_range(0, 400).unwrap();
    let before = sim.board(0).register(offset::FSR);

    for ns in [1, 139, 1201, 5000] {
        match tdc.set_full_scale_range(0, ns) {
            Err(C775Error::OutOfRange { value, min, max, .. }) => {
                assert_eq!(value, ns);
                assert_eq!((min, max), (MIN_FSR_NS, MAX_FSR_NS));
            }
            other => panic!("expected out of range for {ns}, got {:?}", other),
        }
    }
    assert_eq!(sim.board(0).register(offset::FSR), before);
    assert!(tdc.set_full_scale_range(4, 0).unwrap_err().is_not_initialized());
    assert!(tdc.set_full_scale_range(4, 5000).unwrap_err().is_not_initialized());
}

#[test]
fn test_bit_set2_and_clear2() {
    let (_sim, tdc) = initialized(1);
    let initial = tdc.bit_set2(0, BitSet2::empty()).unwrap();

    let set = tdc.bit_set2(0, BitSet2::AUTO_INCR | BitSet2::EMPTY_PROG).unwrap();
    assert_eq!(set, initial | BitSet2::AUTO_INCR | BitSet2::EMPTY_PROG);

    let cleared = tdc.bit_clear2(0, BitSet2::EMPTY_PROG).unwrap();
    assert_eq!(cleared, initial | BitSet2::AUTO_INCR);
    assert_eq!(tdc.bit_clear2(0, BitSet2::empty()).unwrap(), cleared);
}

#[test]
fn test_common_stop_and_start() {
    let (_sim, tdc) = initialized(1);
    tdc.common_stop(0).unwrap();
    assert!(tdc.bit_set2(0, BitSet2::empty()).unwrap().contains(BitSet2::COMMON_STOP));
    tdc.common_start(0).unwrap();
    assert!(!tdc.bit_set2(0, BitSet2::empty()).unwrap().contains(BitSet2::COMMON_STOP));
}

#[test]
fn test_crate_id_stamped_in_header() {
    let (sim, tdc) = initialized(2);
    assert_eq!(tdc.crate_id(1).unwrap(), 0);

    tdc.set_crate_id(1, 0x5a).unwrap();
    assert_eq!(tdc.crate_id(1).unwrap(), 0x5a);
    assert_eq!(tdc.crate_id(0).unwrap(), 0);
    assert!(tdc.set_crate_id(1, 256).unwrap_err().is_out_of_range());
    assert_eq!(sim.board(1).register(offset::CRATE_SELECT), 0x5a);

    tdc.gate(1).unwrap();
    let mut words = Vec::new();
    tdc.read_event(1, &mut words).unwrap();
    match EventWord::decode(words[0]) {
        EventWord::Header { crate_id, .. } => assert_eq!(crate_id, 0x5a),
        other => panic!("expected header, got {other:?}"),
    }
    assert!(tdc.set_crate_id(7, 1).unwrap_err().is_not_initialized());
}

#[test]
fn test_empty_events_with_empty_prog() {
    let (sim, tdc) = initialized(1);
    tdc.set_threshold(0, 0, 0x200).unwrap();
    tdc.sparse(0, false, true).unwrap();

    assert_eq!(sim.board(0).inject_event(&[(0, 0x10)]), None);
    tdc.bit_set2(0, BitSet2::EMPTY_PROG).unwrap();
    assert_eq!(sim.board(0).inject_event(&[(0, 0x10)]), Some(0));
    assert_eq!(tdc.read_event(0, &mut Vec::new()).unwrap(), 2);
}

#[test]
fn test_thresholds() {
    let (sim, tdc) = initialized(1);
    tdc.set_threshold(0, 3, 0x40).unwrap();
    tdc.set_threshold(0, 31, 0x7f).unwrap();
    assert_eq!(tdc.threshold(0, 3).unwrap(), 0x40);
    assert_eq!(sim.board(0).register(offset::threshold(31)), 0x7f);
    assert!(tdc.set_threshold(0, 32, 1).unwrap_err().is_out_of_range());
    assert!(tdc.threshold(9, 40).unwrap_err().is_not_initialized());

    // Underflow suppression drops the hit below threshold.
    tdc.sparse(0, false, true).unwrap();
    sim.board(0).inject_event(&[(3, 0x20), (4, 0x20)]);
    assert_eq!(tdc.read_event(0, &mut Vec::new()).unwrap(), 3);

    tdc.clear_thresholds(0).unwrap();
    assert!((0..32).all(|ch| tdc.threshold(0, ch).unwrap() == 0));
}

#[test]
fn test_berr_enable_disable() {
    let (sim, tdc) = initialized(1);
    sim.board(0)
        .write16(offset::CONTROL1, (Control1::BLOCK_END | Control1::ALIGN64).bits());

    tdc.enable_berr(0).unwrap();
    assert_eq!(
        sim.board(0).register(offset::CONTROL1),
        Control1::BERR_ENABLE.bits()
    );

    sim.board(0).write16(
        offset::CONTROL1,
        (Control1::BERR_ENABLE | Control1::BLOCK_END | Control1::ALIGN64).bits(),
    );
    tdc.disable_berr(0).unwrap();
    assert_eq!(
        sim.board(0).register(offset::CONTROL1),
        Control1::ALIGN64.bits()
    );
}

#[test]
fn test_increment_event_block_bounds() {
    let (_sim, tdc) = initialized(1);
    assert!(tdc.increment_event_block(0, 0).unwrap_err().is_out_of_range());
    assert!(tdc.increment_event_block(0, 33).unwrap_err().is_out_of_range());
    assert_eq!(tdc.last_event_read(0).unwrap(), None);

    tdc.increment_event_block(0, 32).unwrap();
    assert_eq!(tdc.last_event_read(0).unwrap(), Some(31));
}

#[test]
fn test_increment_word() {
    let (sim, tdc) = initialized(1);
    sim.board(0).inject_event(&[(0, 1), (1, 2)]);
    tdc.increment_word(0).unwrap();
    assert_eq!(sim.board(0).buffered_words(), 3);
}

#[test]
fn test_reset_restores_defaults() {
    let (sim, tdc) = initialized(1);
    tdc.set_full_scale_range(0, 800).unwrap();
    tdc.disable(0).unwrap();
    sim.board(0).inject_event(&[(0, 1)]);

    tdc.reset(0).unwrap();
    assert_eq!(sim.board(0).buffered_words(), 0);
    assert_eq!(tdc.set_full_scale_range(0, 0).unwrap(), MIN_FSR_NS);
    assert!(!tdc.bit_set2(0, BitSet2::empty()).unwrap().contains(BitSet2::OFFLINE));
    assert_eq!(tdc.last_event_read(0).unwrap(), None);
    assert_eq!(tdc.event_count(0).unwrap(), 0x00ff_ffff);
}

#[test]
fn test_status_report() {
    let (sim, tdc) = initialized(2);
    sim.board(1).inject_event(&[(0, 1)]);
    sim.board(1).inject_event(&[(0, 2)]);
    tdc.read_event(1, &mut Vec::new()).unwrap();

    let status = tdc.status(1).unwrap();
    assert_eq!(status.id, 1);
    assert_eq!(status.bus_address, BASE + 0x1_0000);
    assert_eq!(status.firmware_revision, 0x0903);
    assert_eq!(status.event_count, 1);
    assert_eq!(status.last_event_read, Some(0));
    assert!(!status.interrupts_enabled());

    let text = status.to_string();
    assert!(text.contains("STATUS for TDC id 1"));
    assert!(text.contains("Data Ready = 1"));
    assert!(text.contains("Event Count     = 1"));
    assert!(text.contains("Last Event Read = 0"));

    assert!(tdc.status(2).unwrap_err().is_not_initialized());
}
