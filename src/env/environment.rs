use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::nic::buffer_pool::{Mbuf, Mempool};
use crate::nic::fdir::FdirConf;
use crate::nic::regs::RegisterWindow;
use crate::pci::{PciAddress, PciId};

pub type PortId = u16;
pub type QueueId = u16;

pub const SOCKET_ID_ANY: i32 = -1;

/// Negative status code reported by the packet-I/O framework.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Errno(pub i32);

impl Errno {
    pub fn status(self) -> i32 {
        self.0
    }

    pub fn invalid() -> Errno {
        Errno(-libc::EINVAL)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}", self.0)
    }
}

impl std::error::Error for Errno {}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RxMqMode {
    None,
    Rss,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxMqMode {
    None,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkSpeed {
    Autoneg,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RxMode {
    pub mq_mode: RxMqMode,
    pub header_split: bool,
    pub hw_ip_checksum: bool,
    pub hw_vlan_filter: bool,
    pub hw_vlan_strip: bool,
    pub hw_strip_crc: bool,
    pub jumbo_frame: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RssConf {
    /// None lets the driver pick its default key
    pub key: Option<Vec<u8>>,
    pub hash_functions: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortConf {
    pub rx_mode: RxMode,
    pub tx_mq_mode: TxMqMode,
    pub link_speeds: LinkSpeed,
    pub rss: RssConf,
    pub fdir: FdirConf,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Thresholds {
    pub prefetch: u8,
    pub host: u8,
    pub write_back: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxConf {
    pub thresholds: Thresholds,
    pub no_multi_segs: bool,
    pub no_offloads: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RxConf {
    pub thresholds: Thresholds,
    pub drop_enable: bool,
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub driver_name: String,
    pub pci_address: PciAddress,
    pub pci_id: PciId,
    /// -1 if unknown
    pub numa_node: i32,
    pub reta_size: u16,
    pub max_rx_queues: u16,
    pub max_tx_queues: u16,
    /// BAR 0, if the device has one mapped
    pub registers: Option<RegisterWindow>,
}

/// The poll-mode packet-I/O framework underneath this crate.
///
/// Burst calls follow the framework's ownership rules: `rx_burst` fills a prefix of `pkts`
/// and returns its length, `tx_burst` takes the first N packets out of `pkts` and returns N.
pub trait Environment {
    fn dev_info(&self, port: PortId) -> Result<DeviceInfo, Errno>;
    fn mac_addr(&self, port: PortId) -> Result<[u8; 6], Errno>;

    fn dev_configure(&self, port: PortId, rx_queues: u16, tx_queues: u16, conf: &PortConf) -> Result<(), Errno>;
    fn tx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, socket_id: i32, conf: &TxConf) -> Result<(), Errno>;
    fn rx_queue_setup(&self, port: PortId, queue: QueueId, descs: u16, socket_id: i32, conf: &RxConf, pool: &Arc<Mempool>) -> Result<(), Errno>;
    fn dev_start(&self, port: PortId) -> Result<(), Errno>;

    fn rx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize;
    fn tx_burst(&self, port: PortId, queue: QueueId, pkts: &mut [Option<Mbuf>]) -> usize;
}

pub trait Clock {
    fn ticks(&self) -> u64;
    fn hz(&self) -> u64;

    /// Busy-waits, never yields the core.
    fn delay(&self, duration: Duration) {
        let wait = (duration.as_nanos() * self.hz() as u128 / 1_000_000_000) as u64;
        let start = self.ticks();
        while self.ticks().wrapping_sub(start) < wait {
            std::hint::spin_loop();
        }
    }
}
