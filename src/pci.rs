use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

#[derive(Debug, PartialEq, Eq)]
pub struct BadPciAddress;

impl fmt::Display for BadPciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("bad PCI address, expected bus:device.function")
    }
}

impl std::error::Error for BadPciAddress {}

impl FromStr for PciAddress {
    type Err = BadPciAddress;

    // Accepts "bb:dd.f", with or without a leading "dddd:" domain
    fn from_str(s: &str) -> Result<PciAddress, BadPciAddress> {
        let s = match s.matches(':').count() {
            2 => s.split_once(':').map(|(_, rest)| rest).ok_or(BadPciAddress)?,
            1 => s,
            _ => return Err(BadPciAddress),
        };
        let parts: Vec<&str> = s.split(&[':', '.'][..]).collect(); // technically too lax but that's fine
        if parts.len() != 3 {
            return Err(BadPciAddress);
        }
        let field = |p: &str| u8::from_str_radix(p, 16).map_err(|_| BadPciAddress);
        Ok(PciAddress {
            bus: field(parts[0])?,
            device: field(parts[1])?,
            function: field(parts[2])?,
        })
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0000:{:02x}:{:02x}.{:x}", self.bus, self.device, self.function)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PciId {
    pub vendor: u16,
    pub device: u16,
}

impl PciId {
    /// Vendor in the upper half, device in the lower half.
    pub fn packed(&self) -> u32 {
        ((self.vendor as u32) << 16) | self.device as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_full_forms() {
        let expected = PciAddress { bus: 0x83, device: 0x00, function: 1 };
        assert_eq!("83:00.1".parse::<PciAddress>(), Ok(expected));
        assert_eq!("0000:83:00.1".parse::<PciAddress>(), Ok(expected));
        assert_eq!(expected.to_string(), "0000:83:00.1");
    }

    #[test]
    fn rejects_garbage() {
        assert!("83-00-1".parse::<PciAddress>().is_err());
        assert!("zz:00.0".parse::<PciAddress>().is_err());
        assert!("1:2:3:4.5".parse::<PciAddress>().is_err());
    }

    #[test]
    fn packs_vendor_high() {
        let id = PciId { vendor: 0x8086, device: 0x10FB };
        assert_eq!(id.packed(), 0x8086_10FB);
    }
}
