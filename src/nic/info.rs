//! Read-only per-port metadata, passed straight through from the framework.

use std::fmt;

use crate::env::{Environment, Errno, PortId};
use crate::pci::PciId;

use super::device_limits;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// First byte in the lowest bits, the way it sits in memory on little-endian hosts.
    pub fn to_u64(&self) -> u64 {
        self.0.iter().rev().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(f, "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}", b[0], b[1], b[2], b[3], b[4], b[5])
    }
}

pub fn mac_address<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<MacAddress, Errno> {
    env.mac_addr(port).map(MacAddress)
}

pub fn driver_name<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<String, Errno> {
    Ok(env.dev_info(port)?.driver_name)
}

pub fn pci_id<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<PciId, Errno> {
    Ok(env.dev_info(port)?.pci_id)
}

pub fn pci_function<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<u8, Errno> {
    Ok(env.dev_info(port)?.pci_address.function)
}

/// Unknown NUMA nodes are reported as socket 0.
pub fn numa_socket<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<u8, Errno> {
    let node = env.dev_info(port)?.numa_node;
    Ok(if node < 0 { 0 } else { node as u8 })
}

pub fn reta_size<E: Environment + ?Sized>(env: &E, port: PortId) -> Result<u16, Errno> {
    Ok(env.dev_info(port)?.reta_size)
}

pub const fn max_ports() -> usize {
    device_limits::MAX_PORTS
}

pub const fn queue_stat_counters() -> usize {
    device_limits::QUEUE_STAT_COUNTERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::ring::RingPortSpec;
    use crate::env::RingEnvironment;
    use crate::pci::PciAddress;

    #[test]
    fn mac_is_packed_low_byte_first() {
        let mac = MacAddress([0x90, 0xE2, 0xBA, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_u64(), 0x0302_01BA_E290);
        assert_eq!(mac.to_string(), "90:E2:BA:01:02:03");
    }

    #[test]
    fn accessors_pass_through() {
        let spec = RingPortSpec {
            driver_name: "net_ixgbe".to_owned(),
            mac: [0xA0, 0x36, 0x9F, 0x00, 0x00, 0x01],
            pci_address: PciAddress { bus: 3, device: 0, function: 1 },
            pci_id: PciId { vendor: 0x8086, device: 0x10FB },
            numa_node: 1,
            reta_size: 128,
            ..RingPortSpec::default()
        };
        let env = RingEnvironment::new(vec![spec, RingPortSpec::default()]).unwrap();

        assert_eq!(mac_address(&env, 0).unwrap().to_string(), "A0:36:9F:00:00:01");
        assert_eq!(driver_name(&env, 0).unwrap(), "net_ixgbe");
        assert_eq!(pci_id(&env, 0).unwrap().packed(), 0x8086_10FB);
        assert_eq!(pci_function(&env, 0).unwrap(), 1);
        assert_eq!(numa_socket(&env, 0).unwrap(), 1);
        assert_eq!(reta_size(&env, 0).unwrap(), 128);

        // Default ring ports have no NUMA affinity
        assert_eq!(numa_socket(&env, 1).unwrap(), 0);
        assert!(driver_name(&env, 7).is_err());
    }

    #[test]
    fn static_limits() {
        assert_eq!(max_ports(), 32);
        assert_eq!(queue_stat_counters(), 16);
    }
}
