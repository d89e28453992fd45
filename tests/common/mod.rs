#![allow(dead_code)]

pub mod sync;

use std::cell::RefCell;
use std::io::{Error, ErrorKind};
use std::rc::Rc;

use multidrop_proto::{Event, Master, Transport};

/// Records everything the master does to the bus.
#[derive(Default)]
pub struct SerialInterface {
    pub tx: Vec<u8>,
    pub control_line: Vec<bool>,
    pub drains: usize,
    do_write_error: bool,
    do_drain_error: bool,
}

pub struct SerialIOPlane(Rc<RefCell<SerialInterface>>);

impl SerialIOPlane {
    pub fn new(serial_if: &Rc<RefCell<SerialInterface>>) -> SerialIOPlane {
        SerialIOPlane(serial_if.clone())
    }
}

impl SerialInterface {
    pub fn new() -> Rc<RefCell<SerialInterface>> {
        Rc::new(RefCell::new(SerialInterface::default()))
    }

    pub fn take_tx(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tx)
    }

    pub fn trigger_write_error(&mut self) {
        self.do_write_error = true;
    }

    pub fn trigger_drain_error(&mut self) {
        self.do_drain_error = true;
    }
}

impl Transport for SerialIOPlane {
    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        let mut inner = self.0.borrow_mut();
        if inner.do_write_error {
            inner.do_write_error = false;
            Err(Error::new(ErrorKind::PermissionDenied, "IO write error"))
        } else {
            inner.tx.extend_from_slice(data);
            Ok(())
        }
    }

    fn drain(&mut self) -> std::io::Result<()> {
        let mut inner = self.0.borrow_mut();
        if inner.do_drain_error {
            inner.do_drain_error = false;
            Err(Error::new(ErrorKind::TimedOut, "IO drain timeout"))
        } else {
            inner.drains += 1;
            Ok(())
        }
    }

    fn set_control_line(&mut self, enabled: bool) -> std::io::Result<()> {
        self.0.borrow_mut().control_line.push(enabled);
        Ok(())
    }
}

pub type TestMaster = Master<SerialIOPlane>;

pub fn new_master() -> (Rc<RefCell<SerialInterface>>, TestMaster) {
    let _ = env_logger::builder().is_test(true).try_init();
    let serial_sim = SerialInterface::new();
    let master = Master::new(SerialIOPlane::new(&serial_sim));
    (serial_sim, master)
}

/// Fire the armed timer.
pub fn expire(master: &mut TestMaster) {
    let token = master.timer().expect("no timer armed").token;
    master.timeout_expired(token).expect("timeout handling failed");
}

/// Address `nodes` nodes from scratch, each echoing the expected address.
pub fn address_nodes(master: &mut TestMaster, nodes: u8) {
    master.start_addressing(0).unwrap();
    for node in 1..=nodes {
        master.receive_data(&[node]).unwrap();
    }
    expire(master);
    assert_eq!(master.node_count(), nodes);
    assert!(master.is_idle());
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Next(Event),
    Error(String),
    Complete,
}

pub type EventLog = Rc<RefCell<Vec<Record>>>;

/// Subscribe to the open message, recording everything it emits.
pub fn record(master: &mut TestMaster) -> EventLog {
    let log = EventLog::default();
    let (next, error, complete) = (log.clone(), log.clone(), log.clone());
    master
        .subscribe(
            move |e| next.borrow_mut().push(Record::Next(e.clone())),
            move |e| error.borrow_mut().push(Record::Error(e.to_string())),
            move || complete.borrow_mut().push(Record::Complete),
        )
        .unwrap();
    log
}

/// Collect every error passed to the bus-wide listeners.
pub fn listen_errors(master: &mut TestMaster) -> Rc<RefCell<Vec<String>>> {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = errors.clone();
    master.add_error_listener(move |e| sink.borrow_mut().push(e.to_string()));
    errors
}
