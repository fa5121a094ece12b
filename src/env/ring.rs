//! A software poll-mode port, in the spirit of a ring PMD.
//!
//! Every port transmits into the receive rings of its peer (itself unless
//! `connect`ed elsewhere). Receive rings copy each packet into a buffer from
//! their own pool, the way a NIC DMAs into posted descriptors. Each port also
//! gets an anonymous mapping standing in for its BAR 0.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use memmap::MmapMut;
use spin::Mutex;

use crate::nic::buffer_pool::{Mbuf, Mempool};
use crate::nic::device_limits;
use crate::nic::regs::RegisterWindow;
use crate::pci::{PciAddress, PciId};

use super::environment::{DeviceInfo, Environment, Errno, PortConf, PortId, QueueId, RxConf, RxMqMode, TxConf};

pub const REGISTER_WINDOW_SIZE: usize = 128 * 1024;

// Only the start of a packet feeds the software RSS hash
const RSS_HASH_BYTES: usize = 64;

#[derive(Clone, Debug)]
pub struct RingPortSpec {
    pub driver_name: String,
    pub mac: [u8; 6],
    pub pci_address: PciAddress,
    pub pci_id: PciId,
    pub numa_node: i32,
    pub reta_size: u16,
    pub max_rx_queues: u16,
    pub max_tx_queues: u16,
    /// Most packets a single tx_burst call accepts
    pub max_burst: usize,
}

impl Default for RingPortSpec {
    fn default() -> RingPortSpec {
        RingPortSpec {
            driver_name: "net_ring".to_owned(),
            mac: [0x02, 0, 0, 0, 0, 0],
            pci_address: PciAddress::default(),
            pci_id: PciId::default(),
            numa_node: -1,
            reta_size: 128,
            max_rx_queues: 16,
            max_tx_queues: 16,
            max_burst: 32,
        }
    }
}

/// Where an injected failure fires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    Info,
    Configure,
    TxQueue(QueueId),
    RxQueue(QueueId),
    Start,
}

/// Framework calls a port has seen, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Info,
    Configure { rx_queues: u16, tx_queues: u16 },
    TxQueueSetup { queue: QueueId, descs: u16 },
    RxQueueSetup { queue: QueueId, descs: u16 },
    Start,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub bursts: u64,
    pub packets: u64,
    pub dropped: u64,
}

struct RxRing {
    descs: u16,
    conf: RxConf,
    pool: Arc<Mempool>,
    packets: VecDeque<Mbuf>,
    stats: QueueStats,
}

struct TxRing {
    descs: u16,
    conf: TxConf,
    stats: QueueStats,
}

struct PortState {
    peer: PortId,
    conf: Option<PortConf>,
    rx: Vec<Option<RxRing>>,
    tx: Vec<Option<TxRing>>,
    started: bool,
    failures: Vec<(Stage, Errno)>,
    calls: Vec<Call>,
}

impl PortState {
    fn take_failure(&mut self, stage: Stage) -> Result<(), Errno> {
        match self.failures.iter().position(|(s, _)| *s == stage) {
            Some(n) => Err(self.failures.remove(n).1),
            None => Ok(()),
        }
    }
}

struct RingPort {
    spec: RingPortSpec,
    registers: RegisterWindow,
    state: Mutex<PortState>,
}

enum Delivery {
    Queued,
    Dropped,
    Full,
}

pub struct RingEnvironment {
    ports: Vec<RingPort>,
}

impl RingEnvironment {
    pub fn new(specs: Vec<RingPortSpec>) -> io::Result<RingEnvironment> {
        let mut ports = Vec::with_capacity(specs.len());
        for (n, spec) in specs.into_iter().enumerate() {
            if n >= device_limits::MAX_PORTS {
                return Err(io::Error::new(io::ErrorKind::InvalidInput, "too many ports"));
            }
            // Leaked on purpose: register windows live as long as the process
            let map: &'static mut MmapMut = Box::leak(Box::new(MmapMut::map_anon(REGISTER_WINDOW_SIZE)?));
            ports.push(RingPort {
                spec,
                registers: RegisterWindow::from_static(&mut map[..]),
                state: Mutex::new(PortState {
                    peer: n as PortId,
                    conf: None,
                    rx: Vec::new(),
                    tx: Vec::new(),
                    started: false,
                    failures: Vec::new(),
                    calls: Vec::new(),
                }),
            });
        }
        Ok(RingEnvironment { ports })
    }

    /// Two default ports wired to each other.
    pub fn pair() -> io::Result<RingEnvironment> {
        let mut a = RingPortSpec::default();
        a.pci_address.function = 0;
        let mut b = RingPortSpec::default();
        b.mac[5] = 1;
        b.pci_address.function = 1;
        let env = RingEnvironment::new(vec![a, b])?;
        env.connect(0, 1);
        Ok(env)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Wires `a` and `b` to transmit into each other.
    pub fn connect(&self, a: PortId, b: PortId) {
        self.port(a).state.lock().peer = b;
        self.port(b).state.lock().peer = a;
    }

    /// Makes the next call at `stage` on `port` fail with `errno`.
    pub fn inject_failure(&self, port: PortId, stage: Stage, errno: Errno) {
        self.port(port).state.lock().failures.push((stage, errno));
    }

    pub fn calls(&self, port: PortId) -> Vec<Call> {
        self.port(port).state.lock().calls.clone()
    }

    pub fn is_started(&self, port: PortId) -> bool {
        self.port(port).state.lock().started
    }

    pub fn port_conf(&self, port: PortId) -> Option<PortConf> {
        self.port(port).state.lock().conf.clone()
    }

    /// Ring depth and configuration of a receive queue, once set up.
    pub fn rx_queue(&self, port: PortId, queue: QueueId) -> Option<(u16, RxConf)> {
        let state = self.port(port).state.lock();
        state.rx.get(queue as usize)?.as_ref().map(|r| (r.descs, r.conf))
    }

    pub fn tx_queue(&self, port: PortId, queue: QueueId) -> Option<(u16, TxConf)> {
        let state = self.port(port).state.lock();
        state.tx.get(queue as usize)?.as_ref().map(|r| (r.descs, r.conf))
    }

    pub fn rx_stats(&self, port: PortId, queue: QueueId) -> QueueStats {
        let state = self.port(port).state.lock();
        state.rx.get(queue as usize).and_then(|r| r.as_ref()).map(|r| r.stats).unwrap_or_default()
    }

    pub fn tx_stats(&self, port: PortId, queue: QueueId) -> QueueStats {
        let state = self.port(port).state.lock();
        state.tx.get(queue as usize).and_then(|r| r.as_ref()).map(|r| r.stats).unwrap_or_default()
    }

    fn port(&self, port: PortId) -> &RingPort {
        match self.ports.get(port as usize) {
            Some(p) => p,
            None => panic!("No ring port {}", port),
        }
    }

    fn lookup(&self, port: PortId) -> Result<&RingPort, Errno> {
        self.ports.get(port as usize).ok_or(Errno(-libc::ENODEV))
    }

    fn deliver(&self, port: PortId, packet: &Mbuf) -> Delivery {
        let mut state = self.port(port).state.lock();
        if !state.started || state.rx.is_empty() {
            // Nobody listening on the other end of the wire
            return Delivery::Dropped;
        }

        let queue = match state.conf.as_ref().map(|c| c.rx_mode.mq_mode) {
            Some(RxMqMode::Rss) => rss_hash(packet.data()) as usize % state.rx.len(),
            _ => 0,
        };
        let ring = match state.rx[queue].as_mut() {
            Some(r) => r,
            None => return Delivery::Dropped,
        };

        if ring.packets.len() >= ring.descs as usize {
            if ring.conf.drop_enable {
                ring.stats.dropped += 1;
                return Delivery::Dropped;
            }
            // Without drop enable a full ring pushes back on the sender, like pause frames
            return Delivery::Full;
        }

        let mut copy = match ring.pool.alloc() {
            Some(m) => m,
            None => {
                ring.stats.dropped += 1;
                return Delivery::Dropped;
            }
        };
        if packet.pkt_len() as usize > copy.buffer_size() {
            ring.stats.dropped += 1;
            return Delivery::Dropped;
        }
        copy.set_pkt_len(packet.pkt_len());
        copy.data_mut().copy_from_slice(packet.data());
        ring.packets.push_back(copy);
        Delivery::Queued
    }
}

fn rss_hash(data: &[u8]) -> u32 {
    // FNV-1a
    let mut hash: u32 = 0x811C_9DC5;
    for &b in data.iter().take(RSS_HASH_BYTES) {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

impl Environment for RingEnvironment {
    fn dev_info(&self, port: PortId) -> Result<DeviceInfo, Errno> {
        let p = self.lookup(port)?;
        let mut state = p.state.lock();
        state.calls.push(Call::Info);
        state.take_failure(Stage::Info)?;
        Ok(DeviceInfo {
            driver_name: p.spec.driver_name.clone(),
            pci_address: p.spec.pci_address,
            pci_id: p.spec.pci_id,
            numa_node: p.spec.numa_node,
            reta_size: p.spec.reta_size,
            max_rx_queues: p.spec.max_rx_queues,
            max_tx_queues: p.spec.max_tx_queues,
            registers: Some(p.registers),
        })
    }

    fn mac_addr(&self, port: PortId) -> Result<[u8; 6], Errno> {
        Ok(self.lookup(port)?.spec.mac)
    }

    fn dev_configure(&self, port: PortId, rx_queues: u16, tx_queues: u16, conf: &PortConf) -> Result<(), Errno> {
        let p = self.lookup(port)?;
        let mut state = p.state.lock();
        state.calls.push(Call::Configure { rx_queues, tx_queues });
        state.take_failure(Stage::Configure)?;
        if state.started {
            return Err(Errno(-libc::EBUSY));
        }
        if rx_queues > p.spec.max_rx_queues || tx_queues > p.spec.max_tx_queues || (rx_queues == 0 && tx_queues == 0) {
            return Err(Errno::invalid());
        }

        state.conf = Some(conf.clone());
        state.rx = (0..rx_queues).map(|_| None).collect();
        state.tx = (0..tx_queues).map(|_| None).collect();
        Ok(())
    }

    fn tx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, _socket_id: i32, conf: &TxConf) -> Result<(), Errno> {
        let p = self.lookup(port)?;
        let mut state = p.state.lock();
        state.calls.push(Call::TxQueueSetup { queue, descs });
        state.take_failure(Stage::TxQueue(queue))?;
        if state.started {
            return Err(Errno(-libc::EBUSY));
        }
        if queue as usize >= state.tx.len() || descs == 0 || descs > device_limits::MAX_RING_DESCRIPTORS {
            return Err(Errno::invalid());
        }

        state.tx[queue as usize] = Some(TxRing { descs, conf: *conf, stats: QueueStats::default() });
        Ok(())
    }

    fn rx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, _socket_id: i32, conf: &RxConf, pool: &Arc<Mempool>) -> Result<(), Errno> {
        let p = self.lookup(port)?;
        let mut state = p.state.lock();
        state.calls.push(Call::RxQueueSetup { queue, descs });
        state.take_failure(Stage::RxQueue(queue))?;
        if state.started {
            return Err(Errno(-libc::EBUSY));
        }
        if queue as usize >= state.rx.len() || descs == 0 || descs > device_limits::MAX_RING_DESCRIPTORS {
            return Err(Errno::invalid());
        }

        state.rx[queue as usize] = Some(RxRing {
            descs,
            conf: *conf,
            pool: Arc::clone(pool),
            packets: VecDeque::with_capacity(descs as usize),
            stats: QueueStats::default(),
        });
        Ok(())
    }

    fn dev_start(&self, port: PortId) -> Result<(), Errno> {
        let p = self.lookup(port)?;
        let mut state = p.state.lock();
        state.calls.push(Call::Start);
        state.take_failure(Stage::Start)?;
        let complete = state.conf.is_some() && state.rx.iter().all(|r| r.is_some()) && state.tx.iter().all(|t| t.is_some());
        if !complete {
            return Err(Errno::invalid());
        }

        state.started = true;
        Ok(())
    }

    fn rx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
        let mut state = self.port(port).state.lock();
        if !state.started {
            return 0;
        }
        let ring = match state.rx.get_mut(queue as usize).and_then(|r| r.as_mut()) {
            Some(r) => r,
            None => return 0,
        };

        let mut rx_count = 0;
        while rx_count < pkts.len() {
            match ring.packets.pop_front() {
                Some(m) => pkts[rx_count] = Some(m),
                None => break,
            }
            rx_count += 1;
        }
        ring.stats.bursts += 1;
        ring.stats.packets += rx_count as u64;
        rx_count
    }

    fn tx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize {
        let p = self.port(port);
        let (peer, limit) = {
            let state = p.state.lock();
            if !state.started {
                return 0;
            }
            match state.tx.get(queue as usize).and_then(|t| t.as_ref()) {
                Some(ring) => (state.peer, p.spec.max_burst.min(ring.descs as usize)),
                None => return 0,
            }
        };

        // One lock at a time, the peer may well be this very port
        let mut tx_count = 0;
        while tx_count < pkts.len().min(limit) {
            let delivery = match pkts[tx_count].as_ref() {
                Some(m) => self.deliver(peer, m),
                None => break,
            };
            if let Delivery::Full = delivery {
                break;
            }
            // The wire has the packet now, its buffer goes back to the sender's pool
            drop(pkts[tx_count].take());
            tx_count += 1;
        }

        let mut state = p.state.lock();
        if let Some(ring) = state.tx.get_mut(queue as usize).and_then(|t| t.as_mut()) {
            ring.stats.bursts += 1;
            ring.stats.packets += tx_count as u64;
        }
        tx_count
    }
}
