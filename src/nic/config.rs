use std::sync::Arc;

use crate::env::Thresholds;

use super::buffer_pool::Mempool;
use super::driver_constants;
use super::fdir::FLEX_PAYLOAD_LEN;

// RSS hash fields, bit positions as the packet-I/O framework defines them
pub mod rss {
    pub const IPV4: u64 = 1 << 2;
    pub const FRAG_IPV4: u64 = 1 << 3;
    pub const NONFRAG_IPV4_TCP: u64 = 1 << 4;
    pub const NONFRAG_IPV4_UDP: u64 = 1 << 5;
    pub const NONFRAG_IPV4_SCTP: u64 = 1 << 6;
    pub const NONFRAG_IPV4_OTHER: u64 = 1 << 7;
    pub const IPV6: u64 = 1 << 8;
    pub const FRAG_IPV6: u64 = 1 << 9;
    pub const NONFRAG_IPV6_TCP: u64 = 1 << 10;
    pub const NONFRAG_IPV6_UDP: u64 = 1 << 11;
    pub const NONFRAG_IPV6_SCTP: u64 = 1 << 12;
    pub const NONFRAG_IPV6_OTHER: u64 = 1 << 13;
    pub const L2_PAYLOAD: u64 = 1 << 14;

    pub const DEFAULT: u64 = IPV4 | NONFRAG_IPV4_TCP | NONFRAG_IPV4_UDP | IPV6 | NONFRAG_IPV6_TCP | NONFRAG_IPV6_UDP;
}

/// Constants that were only ever tuned for one 10 GbE NIC class.
/// They default to those values but can be overridden per port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tuning {
    pub default_rx_descs: u16,
    pub default_tx_descs: u16,
    pub rx_thresh: Thresholds,
    pub tx_thresh: Thresholds,
    pub flex_offset: u16,
    pub flex_mask: [u8; FLEX_PAYLOAD_LEN],
    pub fdir_drop_queue: u8,
}

impl Default for Tuning {
    fn default() -> Tuning {
        let mut flex_mask = [0u8; FLEX_PAYLOAD_LEN];
        flex_mask[0] = 0xFF;
        flex_mask[1] = 0xFF;
        Tuning {
            default_rx_descs: driver_constants::DEFAULT_RX_DESCS,
            default_tx_descs: driver_constants::DEFAULT_TX_DESCS,
            rx_thresh: Thresholds {
                prefetch: driver_constants::RX_PTHRESH,
                host: driver_constants::RX_HTHRESH,
                write_back: driver_constants::RX_WTHRESH,
            },
            tx_thresh: Thresholds {
                prefetch: driver_constants::TX_PTHRESH,
                host: driver_constants::TX_HTHRESH,
                write_back: driver_constants::TX_WTHRESH,
            },
            flex_offset: driver_constants::FDIR_FLEX_OFFSET,
            flex_mask,
            fdir_drop_queue: driver_constants::FDIR_DROP_QUEUE,
        }
    }
}

/// What a port should look like once `configure` is done with it.
#[derive(Clone, Debug)]
pub struct DeviceConfig {
    pub rx_queues: u16,
    pub tx_queues: u16,
    /// 0 means the default depth, never an empty ring
    pub rx_descs: u16,
    pub tx_descs: u16,
    /// One per receive queue, in queue order
    pub pools: Vec<Arc<Mempool>>,
    pub drop_enable: bool,
    pub enable_rss: bool,
    pub disable_offloads: bool,
    pub strip_vlan: bool,
    pub rss_mask: u64,
    pub tuning: Tuning,
}

impl Default for DeviceConfig {
    fn default() -> DeviceConfig {
        DeviceConfig {
            rx_queues: 1,
            tx_queues: 1,
            rx_descs: 0,
            tx_descs: 0,
            pools: Vec::new(),
            drop_enable: false,
            enable_rss: false,
            disable_offloads: false,
            strip_vlan: false,
            rss_mask: rss::DEFAULT,
            tuning: Tuning::default(),
        }
    }
}

impl DeviceConfig {
    pub fn new() -> DeviceConfig {
        DeviceConfig::default()
    }

    pub fn rx_queues(mut self, count: u16) -> DeviceConfig {
        self.rx_queues = count;
        self
    }

    pub fn tx_queues(mut self, count: u16) -> DeviceConfig {
        self.tx_queues = count;
        self
    }

    pub fn rx_descs(mut self, count: u16) -> DeviceConfig {
        self.rx_descs = count;
        self
    }

    pub fn tx_descs(mut self, count: u16) -> DeviceConfig {
        self.tx_descs = count;
        self
    }

    /// Appends the pool for the next receive queue.
    pub fn pool(mut self, pool: Arc<Mempool>) -> DeviceConfig {
        self.pools.push(pool);
        self
    }

    pub fn drop_enable(mut self, enable: bool) -> DeviceConfig {
        self.drop_enable = enable;
        self
    }

    pub fn rss(mut self, enable: bool) -> DeviceConfig {
        self.enable_rss = enable;
        self
    }

    pub fn disable_offloads(mut self, disable: bool) -> DeviceConfig {
        self.disable_offloads = disable;
        self
    }

    pub fn strip_vlan(mut self, strip: bool) -> DeviceConfig {
        self.strip_vlan = strip;
        self
    }

    pub fn rss_mask(mut self, mask: u64) -> DeviceConfig {
        self.rss_mask = mask;
        self
    }

    pub fn tuning(mut self, tuning: Tuning) -> DeviceConfig {
        self.tuning = tuning;
        self
    }

    pub fn effective_rx_descs(&self) -> u16 {
        resolve_descs(self.rx_descs, self.tuning.default_rx_descs, driver_constants::DEFAULT_RX_DESCS)
    }

    pub fn effective_tx_descs(&self) -> u16 {
        resolve_descs(self.tx_descs, self.tuning.default_tx_descs, driver_constants::DEFAULT_TX_DESCS)
    }
}

// A zero tuned default falls back to the built-in one, so a ring is never empty
fn resolve_descs(requested: u16, tuned: u16, builtin: u16) -> u16 {
    match (requested, tuned) {
        (0, 0) => builtin,
        (0, tuned) => tuned,
        (requested, _) => requested,
    }
}
