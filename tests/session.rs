//! Session readout against the simulated crate.

use daq_driver_c775::event::{is_header, is_trailer, trailer_event_count};
use daq_driver_c775::{decode_event, C775Error, EventWord, InterruptState};
use tdc_daq::session::split_events;
use tdc_daq::{AppError, Session, TdcConfig};
use tracing_test::traced_test;

fn config(modules: usize) -> TdcConfig {
    TdcConfig::from_toml_str(&format!(
        r#"
        [application]
        name = "session-test"
        log_level = "warn"

        [crate]
        base_address = 0x180000
        address_increment = 0x10000
        modules = {modules}

        [simulation]
        seed = 42
        hits_per_event = 6
        "#
    ))
    .unwrap()
}

#[test]
fn test_open_configures_every_module() {
    let session = Session::open(config(3)).unwrap();
    assert_eq!(session.module_ids(), vec![0, 1, 2]);

    let reports = session.status(None).unwrap();
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.full_scale_range_ns, 140);
        assert!(report.no_events_taken());
        assert!(!report.interrupts_enabled());
    }
    assert_eq!(session.status(Some(1)).unwrap()[0].id, 1);
}

#[test]
fn test_poll_reads_one_event_per_gate() {
    let mut session = Session::open(config(1)).unwrap();
    let events = session.poll(0, 3).unwrap();
    assert_eq!(events.len(), 3);

    for (index, words) in events.iter().enumerate() {
        assert_eq!(words.len(), 6 + 2);
        assert!(is_header(words[0]));
        let trailer = *words.last().unwrap();
        assert!(is_trailer(trailer));
        assert_eq!(trailer_event_count(trailer), index as u32);

        let channels: Vec<u8> = decode_event(words)
            .into_iter()
            .filter_map(|w| match w {
                EventWord::Datum { channel, .. } => Some(channel),
                _ => None,
            })
            .collect();
        assert!(
            channels.windows(2).all(|pair| pair[0] < pair[1]),
            "channels not distinct and ascending: {channels:?}"
        );
    }
    assert_eq!(session.driver().last_event_read(0).unwrap(), Some(2));
    assert_eq!(session.driver().data_ready(0).unwrap(), 0);
}

#[test]
#[traced_test]
fn test_poll_offline_module_reads_nothing() {
    let mut session = Session::open(config(1)).unwrap();
    session.driver().disable(0).unwrap();

    let events = session.poll(0, 2).unwrap();
    assert!(events.is_empty());
    assert!(logs_contain("Gate produced no event"));
    assert_eq!(session.driver().last_event_read(0).unwrap(), None);
}

#[test]
fn test_readout_of_unknown_module_is_an_error() {
    let mut session = Session::open(config(2)).unwrap();

    for result in [session.poll(5, 1).map(|_| ()), session.block(7, 2).map(|_| ())] {
        assert!(matches!(
            result,
            Err(AppError::Driver(C775Error::NotInitialized { .. }))
        ));
    }
    assert!(session.status(Some(2)).is_err());
    // The crate is still usable afterwards.
    assert_eq!(session.poll(1, 1).unwrap().len(), 1);
}

#[test]
fn test_same_seed_same_hits() {
    let mut first = Session::open(config(1)).unwrap();
    let mut second = Session::open(config(1)).unwrap();
    assert_eq!(first.poll(0, 2).unwrap(), second.poll(0, 2).unwrap());
}

#[test]
fn test_block_moves_all_gated_events() {
    let mut session = Session::open(config(2)).unwrap();
    let words = session.block(1, 4).unwrap();

    let events = split_events(&words);
    assert_eq!(events.len(), 4);
    for (index, event) in events.iter().enumerate() {
        assert_eq!(event.len(), 8);
        assert_eq!(trailer_event_count(event[7]), index as u32);
    }
    assert_eq!(session.driver().last_event_read(1).unwrap(), Some(3));
    // Module 0 was never gated.
    assert!(session.status(Some(0)).unwrap()[0].no_events_taken());
}

#[tokio::test]
async fn test_interrupt_run_drains_every_event() {
    let mut session = Session::open(config(1)).unwrap();
    let status = session.interrupt_run(1, 5).await.unwrap();

    assert_eq!(status.count, 5);
    assert_eq!(status.source, Some(0));
    assert_eq!(status.state, InterruptState::Suspended);
    assert_eq!(status.level, 4);
    assert_eq!(status.vector, 0xaa);
    assert_eq!(status.threshold, 1);

    let tdc = session.driver();
    assert_eq!(tdc.last_event_read(0).unwrap(), Some(4));
    assert_eq!(tdc.interrupt_status().state, InterruptState::Unarmed);
    assert!(!session.status(Some(0)).unwrap()[0].interrupts_enabled());
}

#[tokio::test]
async fn test_interrupt_run_leaves_partial_batch_buffered() {
    let mut session = Session::open(config(1)).unwrap();
    let status = session.interrupt_run(2, 5).await.unwrap();

    assert_eq!(status.count, 2);
    assert_eq!(session.driver().last_event_read(0).unwrap(), Some(3));
    assert_eq!(session.driver().data_ready(0).unwrap(), 1);
}
