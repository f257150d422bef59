mod common;

use canmux::config::{FrameTransmissionConfig, RxFifo};
use canmux::hal::{ErrorStateIndicator, FrameFormat, TxEventControl};
use canmux::{
    BringUpError, Bus, BusConfig, BusState, EndpointConfig, Owner, RegistryError, register,
};
use common::*;
use std::sync::atomic::Ordering;

#[test]
fn missing_bus_or_config_is_rejected_before_bring_up() {
    let bus = classic_bus();

    let err = register::<MockHal, MockClock, 16>(None, Some(EndpointConfig::new("a", 1, 2)));
    assert_eq!(err.err(), Some(RegistryError::InvalidConfig));

    let err = register(Some(&bus), None);
    assert_eq!(err.err(), Some(RegistryError::InvalidConfig));

    assert!(bus.hal().calls().is_empty());
    assert_eq!(bus.state(), BusState::NotStarted);
}

#[test]
fn first_registration_brings_the_bus_up_once() {
    let bus = classic_bus();
    for i in 0..5u32 {
        let config = EndpointConfig::new("module", 0x100 + i, 0x180 + i);
        register(Some(&bus), Some(config)).unwrap();
    }

    assert_eq!(bus.state(), BusState::Ready);
    assert_eq!(bus.len(), 5);
    assert_eq!(bus.hal().count(|c| *c == Call::Start), 1);
    assert_eq!(bus.hal().count(|c| matches!(c, Call::Filter(_))), 1);
}

#[test]
fn registering_past_capacity_leaves_the_set_untouched() {
    let bus: Bus<MockHal, MockClock, 2> =
        Bus::new(MockHal::classic(), MockClock::new(1_000), BusConfig::default());
    bus.register(EndpointConfig::new("first", 0x10, 0x11)).unwrap();
    bus.register(EndpointConfig::new("second", 0x20, 0x21)).unwrap();

    let err = bus.register(EndpointConfig::new("third", 0x30, 0x31));
    assert_eq!(err.err(), Some(RegistryError::RegistryFull));

    let topics: Vec<_> = bus.endpoints().iter().map(|e| e.topic()).collect();
    assert_eq!(topics, ["first", "second"]);
    assert_eq!(bus.capacity(), 2);
}

#[test]
fn endpoints_keep_registration_order() {
    let bus = classic_bus();
    let a = bus.register(EndpointConfig::new("a", 0x1, 0x2)).unwrap();
    let b = bus.register(EndpointConfig::new("b", 0x3, 0x4)).unwrap();

    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);
    assert_eq!(bus.endpoints()[1].topic(), "b");
    assert_eq!(b.rx_id(), sid(0x4));
}

#[test]
fn transmit_template_is_a_classic_data_frame() {
    let bus = classic_bus();
    let handle = bus
        .register(EndpointConfig::new("test", 0x200, 0x1FF))
        .unwrap();

    let header = handle.tx_header();
    assert_eq!(header.id, sid(0x200));
    assert_eq!(header.len, 8);
    assert_eq!(header.frame_format, FrameFormat::Classic);
    assert_eq!(header.error_state, ErrorStateIndicator::ErrorActive);
    assert!(!header.bit_rate_switching);
    assert_eq!(header.event_control, TxEventControl::DontStoreTxEvents);
    assert_eq!(header.message_marker, 0);
    assert_eq!(handle.rx_fifo(), RxFifo::Fifo0);
}

#[test]
fn ids_must_fit_the_bus_width() {
    let bus = classic_bus();
    let err = bus.register(EndpointConfig::new("wide", 0x800, 0x10));
    assert_eq!(err.err(), Some(RegistryError::InvalidConfig));
    let err = bus.register(EndpointConfig::new("wide", 0x10, 0x800));
    assert_eq!(err.err(), Some(RegistryError::InvalidConfig));
    assert!(bus.is_empty());

    let fd = bus_with(
        MockHal::new(FrameTransmissionConfig::AllowFdCan, [8, 0]),
        BusConfig::default(),
    );
    let handle = fd
        .register(EndpointConfig::new("extended", 0x1234567, 0x1FFF_FFFF))
        .unwrap();
    assert_eq!(handle.tx_id(), eid(0x1234567));
    assert_eq!(handle.rx_id(), eid(0x1FFF_FFFF));
}

#[test]
fn failed_bring_up_reports_its_cause_once() {
    let bus = bus_with(
        MockHal::new(FrameTransmissionConfig::ClassicCanOnly, [0, 0]),
        BusConfig::default(),
    );

    let err = bus.register(EndpointConfig::new("a", 1, 2));
    assert_eq!(err.err(), Some(RegistryError::NoFifoAvailable));
    assert_eq!(
        bus.state(),
        BusState::Failed(BringUpError::NoFifoAvailable)
    );

    let err = bus.register(EndpointConfig::new("b", 3, 4));
    assert_eq!(err.err(), Some(RegistryError::BusUnavailable));
    assert!(bus.hal().calls().is_empty());
    assert!(bus.is_empty());
}

#[test]
fn filter_failure_surfaces_through_register() {
    let hal = MockHal::classic();
    hal.fail.filter.store(u32::MAX, Ordering::Relaxed);
    let bus = bus_with(hal, BusConfig::default());

    let err = register(Some(&bus), Some(EndpointConfig::new("a", 1, 2)));
    assert_eq!(err.err(), Some(RegistryError::FilterConfigError));
    assert_eq!(bus.hal().count(|c| matches!(c, Call::Filter(_))), 3);
    assert_eq!(bus.hal().count(|c| *c == Call::Start), 0);

    let err = register(Some(&bus), Some(EndpointConfig::new("b", 3, 4)));
    assert_eq!(err.err(), Some(RegistryError::BusUnavailable));
}

#[test]
fn start_failure_surfaces_through_register() {
    let hal = MockHal::classic();
    hal.fail.start.store(u32::MAX, Ordering::Relaxed);
    let bus = bus_with(hal, BusConfig::default());

    let err = bus.register(EndpointConfig::new("a", 1, 2));
    assert_eq!(err.err(), Some(RegistryError::BusStartError));
    assert_eq!(bus.state(), BusState::Failed(BringUpError::BusStartError));

    let err = bus.register(EndpointConfig::new("b", 3, 4));
    assert_eq!(err.err(), Some(RegistryError::BusUnavailable));
    assert!(bus.is_empty());
}

#[test]
fn concurrent_registration_is_rejected() {
    let bus = classic_bus();
    bus.hal().hold_start.store(true, Ordering::SeqCst);

    std::thread::scope(|s| {
        let first = s.spawn(|| bus.register(EndpointConfig::new("first", 1, 2)).map(|h| h.index()));

        while !bus.hal().in_start.load(Ordering::SeqCst) {
            std::thread::yield_now();
        }
        let err = bus.register(EndpointConfig::new("second", 3, 4));
        assert_eq!(err.err(), Some(RegistryError::RegistrationInProgress));
        assert_eq!(bus.bring_up(), Err(BringUpError::BusUnavailable));

        bus.hal().hold_start.store(false, Ordering::SeqCst);
        assert_eq!(first.join().unwrap(), Ok(0));
    });

    assert_eq!(bus.len(), 1);
    bus.register(EndpointConfig::new("second", 3, 4)).unwrap();
    assert_eq!(bus.len(), 2);
}

static MODULE: u32 = 7;

#[test]
fn owner_is_handed_back_unchanged() {
    let bus = classic_bus();
    let owner = Owner::new(&MODULE);
    let handle = bus
        .register(EndpointConfig::new("owned", 1, 2).set_owner(owner))
        .unwrap();

    assert_eq!(handle.owner(), Some(owner));
    assert_eq!(
        handle.owner().unwrap().as_ptr().cast_const(),
        std::ptr::from_ref(&MODULE).cast::<()>()
    );
    assert_eq!(Owner::from_ptr(std::ptr::null_mut::<u32>()), None);
}
