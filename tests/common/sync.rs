use std::collections::VecDeque;
use std::io::{Error, ErrorKind, Read, Write};
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;

use multidrop_proto::io::ControlLine;

type BusT = Arc<Mutex<VecDeque<u8>>>;

/// Shared RS-485 style wire. Master writes reach every node, node writes
/// reach the master.
#[derive(Default)]
pub struct RS485Bus {
    masters: Mutex<Vec<Weak<BusInterfaceLink>>>,
    nodes: Mutex<Vec<Weak<BusInterfaceLink>>>,
    master_data_available: Arc<Condvar>,
    node_data_available: Arc<Condvar>,
    control_line: AtomicBool,
    eof: AtomicBool,
}

impl RS485Bus {
    pub fn new() -> Arc<RS485Bus> {
        Default::default()
    }

    pub fn disconnect(&self) {
        self.eof.store(true, SeqCst);
        self.node_data_available.notify_all();
        self.master_data_available.notify_all();
    }

    pub fn control_line(&self) -> bool {
        self.control_line.load(SeqCst)
    }

    pub fn new_master_interface(self: &Arc<Self>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_master: true,
            rx: Default::default(),
            rx_condvar: Arc::clone(&self.master_data_available),
        });
        self.masters.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    pub fn new_node_interface(self: &Arc<RS485Bus>) -> BusInterface {
        let link = Arc::new(BusInterfaceLink {
            is_master: false,
            rx: Default::default(),
            rx_condvar: Arc::clone(&self.node_data_available),
        });
        self.nodes.lock().unwrap().push(Arc::downgrade(&link));
        BusInterface::new(Arc::clone(self), link)
    }

    fn send(links: &Mutex<Vec<Weak<BusInterfaceLink>>>, condvar: &Condvar, data: &[u8]) {
        let links = links.lock().unwrap();
        for weak in links.iter() {
            if let Some(link) = weak.upgrade() {
                link.rx.lock().unwrap().extend(data.iter().copied());
            }
        }
        condvar.notify_all();
    }
}

/// One end of the bus. Clones share the same receive queue.
#[derive(Clone)]
pub struct BusInterface {
    bus: Arc<RS485Bus>,
    link: Arc<BusInterfaceLink>,
    pub timeout: Duration,
}

struct BusInterfaceLink {
    is_master: bool,
    rx: BusT,
    rx_condvar: Arc<Condvar>,
}

impl BusInterface {
    fn new(bus: Arc<RS485Bus>, link: Arc<BusInterfaceLink>) -> BusInterface {
        BusInterface {
            bus,
            link,
            timeout: Duration::from_millis(5),
        }
    }

    /// Read exactly `n` bytes, panicking if the bus goes quiet.
    pub fn read_n(&mut self, n: usize) -> Vec<u8> {
        let mut data = vec![0; n];
        self.read_exact(&mut data).expect("bus went quiet");
        data
    }

    /// Skip to the next sync pair and return the header after it.
    pub fn read_header(&mut self) -> [u8; 5] {
        let mut last = 0;
        loop {
            let byte = self.read_n(1)[0];
            if last == 0xFF && byte == 0xFF {
                break;
            }
            last = byte;
        }
        let mut header = [0; 5];
        header.copy_from_slice(&self.read_n(5));
        header
    }
}

impl Read for BusInterface {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            panic!("Testsuite called read with zero length buffer.")
        }

        let rx = self.link.rx.lock().expect("Read mutex is poisoned");
        let eof = &self.bus.eof;
        let mut rx = self
            .link
            .rx_condvar
            .wait_timeout_while(rx, self.timeout, |rx| rx.is_empty() && !eof.load(SeqCst))
            .expect("Mutex lock failed")
            .0;

        let len = buf.len().min(rx.len());
        if len > 0 {
            for (dst, src) in buf.iter_mut().zip(rx.drain(..len)) {
                *dst = src;
            }
            Ok(len)
        } else if self.bus.eof.load(SeqCst) {
            Ok(0)
        } else {
            Err(Error::new(ErrorKind::TimedOut, "IO read timeout"))
        }
    }
}

impl Write for BusInterface {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.link.is_master {
            RS485Bus::send(&self.bus.nodes, &self.bus.node_data_available, buf);
        } else {
            RS485Bus::send(&self.bus.masters, &self.bus.master_data_available, buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ControlLine for BusInterface {
    fn set_control_line(&mut self, enabled: bool) -> std::io::Result<()> {
        self.bus.control_line.store(enabled, SeqCst);
        Ok(())
    }
}
