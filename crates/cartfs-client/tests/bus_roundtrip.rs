//! Bus client integration tests against the simulated controller.

use cartfs_client::{BusClient, BusError};
use cartfs_harness::SimController;
use cartfs_proto::{FRAME_SIZE, MAX_CARTRIDGES, Opcode};

#[test]
fn connect_is_lazy_and_exchanges_flow() {
    let controller = SimController::spawn().expect("controller should spawn");
    let mut bus = BusClient::new(controller.addr());
    assert!(!bus.is_connected());

    bus.init().expect("init should succeed");
    assert!(bus.is_connected());
    bus.load(3).expect("load should succeed");
    assert_eq!(controller.loaded_cart(), Some(3));

    let payload = [0xA5u8; FRAME_SIZE];
    bus.write_frame(17, &payload).expect("write should succeed");
    assert_eq!(controller.frame(3, 17).as_ref(), Some(&payload));

    let mut readback = [0u8; FRAME_SIZE];
    bus.read_frame(17, &mut readback).expect("read should succeed");
    assert_eq!(readback, payload);

    assert_eq!(controller.exchanges(Opcode::Init), 1);
    assert_eq!(controller.exchanges(Opcode::Load), 1);
    assert_eq!(controller.exchanges(Opcode::Write), 1);
    assert_eq!(controller.exchanges(Opcode::Read), 1);
}

#[test]
fn zero_clears_only_the_loaded_cartridge() {
    let controller = SimController::spawn().expect("controller should spawn");
    let mut bus = BusClient::new(controller.addr());

    bus.load(0).expect("load should succeed");
    bus.write_frame(0, &[1u8; FRAME_SIZE]).expect("write should succeed");
    bus.load(1).expect("load should succeed");
    bus.write_frame(0, &[2u8; FRAME_SIZE]).expect("write should succeed");

    bus.zero().expect("zero should succeed");
    assert!(controller.frame(1, 0).is_none(), "loaded cartridge should be zeroed");
    assert_eq!(controller.frame(0, 0), Some([1u8; FRAME_SIZE]));
}

#[test]
fn controller_rejection_surfaces_as_error() {
    let controller = SimController::spawn().expect("controller should spawn");
    let mut bus = BusClient::new(controller.addr());

    let err = bus.load(MAX_CARTRIDGES).expect_err("out-of-range load must fail");
    assert!(matches!(
        err,
        BusError::Controller { opcode: Opcode::Load, cart, .. } if cart == MAX_CARTRIDGES
    ));

    // The connection survives a rejection.
    bus.load(0).expect("in-range load should succeed");
}

#[test]
fn read_before_load_is_rejected_but_keeps_stream_in_sync() {
    let controller = SimController::spawn().expect("controller should spawn");
    let mut bus = BusClient::new(controller.addr());

    let mut buf = [0u8; FRAME_SIZE];
    let err = bus.read_frame(0, &mut buf).expect_err("read with no cartridge loaded must fail");
    assert!(matches!(err, BusError::Controller { opcode: Opcode::Read, .. }));

    // The rejected READ's payload was consumed; the next exchange still
    // lines up on a word boundary.
    bus.load(2).expect("load should succeed");
    bus.read_frame(0, &mut buf).expect("read should succeed");
    assert_eq!(buf, [0u8; FRAME_SIZE]);
}

#[test]
fn poweroff_closes_and_next_exchange_reconnects() {
    let controller = SimController::spawn().expect("controller should spawn");
    let mut bus = BusClient::new(controller.addr());

    bus.init().expect("init should succeed");
    bus.poweroff().expect("poweroff should succeed");
    assert!(!bus.is_connected());

    bus.init().expect("init should reconnect");
    assert!(bus.is_connected());
    assert_eq!(controller.exchanges(Opcode::Init), 2);
}
