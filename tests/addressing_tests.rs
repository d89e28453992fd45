mod common;

use common::*;
use multidrop_proto::{command, crc16, Error, Event, MessageOptions, MAX_ADDRESS_CORRECTIONS};

const POSTAMBLE: [u8; 8] = [0xFF, 0xFF, 0x00, 0x00, 0xFF, 0x00, 0xD4, 0x41];

#[test]
fn addressing_ends_on_timeout() {
    let (serial_sim, mut master) = new_master();
    master.start_addressing(0).unwrap();
    let log = record(&mut master);
    serial_sim.borrow_mut().take_tx();

    master.receive_data(&[1]).unwrap();
    master.receive_data(&[2]).unwrap();
    assert_eq!(serial_sim.borrow_mut().take_tx(), vec![1, 2]);
    expire(&mut master);

    assert!(master.is_idle());
    assert_eq!(master.node_count(), 2);
    assert_eq!(
        *log.borrow(),
        vec![
            Record::Next(Event::Addressed { node: 1 }),
            Record::Next(Event::Addressed { node: 2 }),
            Record::Complete,
        ]
    );

    let covered = [0x03, 0x00, command::ADDRESS, 0x00, 0x02, 0x00, 0x01, 0x02];
    let mut expected = crc16(&covered).to_be_bytes().to_vec();
    expected.extend_from_slice(&POSTAMBLE);
    assert_eq!(serial_sim.borrow_mut().take_tx(), expected);
    assert_eq!(
        serial_sim.borrow().control_line,
        vec![false, true, false]
    );
}

#[test]
fn mismatch_sends_correction() {
    let (serial_sim, mut master) = new_master();
    let errors = listen_errors(&mut master);
    master.start_addressing(0).unwrap();
    let log = record(&mut master);
    serial_sim.borrow_mut().take_tx();

    master.receive_data(&[5]).unwrap();
    assert_eq!(serial_sim.borrow_mut().take_tx(), vec![0x00, 0x00]);
    master.receive_data(&[1]).unwrap();
    assert_eq!(serial_sim.borrow_mut().take_tx(), vec![1]);
    assert_eq!(master.node_count(), 1);

    assert_eq!(
        *log.borrow(),
        vec![
            Record::Next(Event::AddressRejected {
                expected: 1,
                received: 5,
                corrections: 1
            }),
            Record::Next(Event::Addressed { node: 1 }),
        ]
    );
    assert_eq!(
        *errors.borrow(),
        vec!["Address mismatch: expected 1, received 5".to_string()]
    );
}

#[test]
fn too_many_corrections_abort_addressing() {
    let (serial_sim, mut master) = new_master();
    let errors = listen_errors(&mut master);
    master.start_addressing(0).unwrap();
    let log = record(&mut master);
    serial_sim.borrow_mut().take_tx();

    for _ in 0..MAX_ADDRESS_CORRECTIONS {
        master.receive_data(&[9]).unwrap();
    }
    assert!(!master.is_idle());
    assert_eq!(
        serial_sim.borrow_mut().take_tx(),
        [0x00, 0x00].repeat(usize::from(MAX_ADDRESS_CORRECTIONS))
    );

    master.receive_data(&[9]).unwrap();
    assert!(master.is_idle());
    assert_eq!(master.node_count(), 0);
    assert_eq!(
        log.borrow().last(),
        Some(&Record::Error("max address corrections (10)".into()))
    );
    assert_eq!(errors.borrow().len(), 12);

    let tx = serial_sim.borrow_mut().take_tx();
    assert_eq!(tx.len(), 2 + POSTAMBLE.len());
    assert_eq!(&tx[2..], &POSTAMBLE);
}

#[test]
fn accepted_address_resets_corrections() {
    let (_serial_sim, mut master) = new_master();
    master.start_addressing(0).unwrap();
    for _ in 0..MAX_ADDRESS_CORRECTIONS {
        master.receive_data(&[9]).unwrap();
    }
    master.receive_data(&[1]).unwrap();
    for _ in 0..MAX_ADDRESS_CORRECTIONS {
        master.receive_data(&[9]).unwrap();
    }
    assert!(!master.is_idle());
    master.receive_data(&[2]).unwrap();
    expire(&mut master);
    assert_eq!(master.node_count(), 2);
}

#[test]
fn addressing_session_rejects_data() {
    let (_serial_sim, mut master) = new_master();
    master.start_addressing(0).unwrap();
    assert!(matches!(
        master.send_data(&[1]),
        Err(Error::SessionBusy {
            command: command::ADDRESS
        })
    ));
    assert!(matches!(
        master.start_message(0x10, 1, MessageOptions::new()),
        Err(Error::SessionBusy { .. })
    ));

    let log = record(&mut master);
    master.receive_data(&[1]).unwrap();
    master.end_message(None).unwrap();
    assert!(master.is_idle());
    assert_eq!(master.node_count(), 1);
    assert_eq!(log.borrow().last(), Some(&Record::Complete));
}

#[test]
fn resumed_addressing_keeps_existing_nodes() {
    let (serial_sim, mut master) = new_master();
    address_nodes(&mut master, 3);
    serial_sim.borrow_mut().take_tx();

    master.start_addressing(master.node_count()).unwrap();
    assert_eq!(
        serial_sim.borrow_mut().take_tx(),
        vec![0xFF, 0xFF, 0x03, 0x00, command::ADDRESS, 0x03, 0x02, 0x03]
    );
    master.receive_data(&[4]).unwrap();
    expire(&mut master);
    assert_eq!(master.node_count(), 4);
}

#[test]
fn restarting_from_zero_resets_the_bus() {
    let (serial_sim, mut master) = new_master();
    address_nodes(&mut master, 3);
    serial_sim.borrow_mut().take_tx();

    master.start_addressing(0).unwrap();
    let tx = serial_sim.borrow_mut().take_tx();
    // RESET is still framed for the previous node count
    assert_eq!(
        &tx[..7],
        &[0xFF, 0xFF, 0x00, 0x00, command::RESET, 0x03, 0x00]
    );
    assert_eq!(master.node_count(), 0);
    expire(&mut master);
    assert_eq!(master.node_count(), 0);
}

#[test]
fn failed_start_keeps_node_count() {
    let (serial_sim, mut master) = new_master();
    address_nodes(&mut master, 2);

    let transport = master.detach_transport().unwrap();
    assert!(matches!(
        master.start_addressing(7),
        Err(Error::NoTransport)
    ));
    assert_eq!(master.node_count(), 2);

    master.attach_transport(transport);
    serial_sim.borrow_mut().trigger_write_error();
    assert!(matches!(
        master.start_addressing(5),
        Err(Error::Io { .. })
    ));
    assert_eq!(master.node_count(), 2);
    assert!(master.is_idle());
}
